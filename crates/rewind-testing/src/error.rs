// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the test harness.

use rewind_core::{EngineError, StoreError};
use thiserror::Error;

/// Errors that can occur while driving a workflow locally.
#[derive(Debug, Error)]
pub enum TestError {
    /// An invocation could not complete.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Reading the operation log failed.
    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),

    /// `run_until_complete` gave up.
    #[error("execution did not reach a terminal status within {limit} invocations")]
    InvocationLimitExceeded { limit: u32 },
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, TestError>;
