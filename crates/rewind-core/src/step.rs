// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step configuration and the context passed to step bodies.

use std::fmt;
use std::sync::Arc;

use crate::logger::DurableLogger;
use crate::retry::{NoRetry, RetryStrategy};

/// How many times a step body may run per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepSemantics {
    /// A `STARTED` marker is recorded before the body runs. Finding the marker
    /// on a later invocation surfaces
    /// [`DurableError::StepInterrupted`](crate::DurableError::StepInterrupted)
    /// instead of running the body again.
    #[default]
    AtMostOncePerRetry,
    /// Only the outcome is recorded. An attempt cut short by a crash runs again.
    AtLeastOncePerRetry,
}

/// Per-step configuration.
#[derive(Clone)]
pub struct StepConfig {
    pub retry_strategy: Arc<dyn RetryStrategy>,
    pub semantics: StepSemantics,
}

impl StepConfig {
    /// No retries, at-most-once per attempt.
    pub fn new() -> Self {
        Self {
            retry_strategy: Arc::new(NoRetry),
            semantics: StepSemantics::default(),
        }
    }

    pub fn with_retry_strategy(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.retry_strategy = Arc::new(strategy);
        self
    }

    /// Use an already shared strategy, e.g. one of the
    /// [`RetryPresets`](crate::RetryPresets).
    pub fn with_shared_retry_strategy(mut self, strategy: Arc<dyn RetryStrategy>) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn with_semantics(mut self, semantics: StepSemantics) -> Self {
        self.semantics = semantics;
        self
    }
}

impl Default for StepConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepConfig")
            .field("semantics", &self.semantics)
            .finish_non_exhaustive()
    }
}

/// What a step body knows about the attempt it is running.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub execution_id: String,
    pub operation_id: String,
    pub name: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Logger with this operation's correlation fields attached.
    pub logger: DurableLogger,
}
