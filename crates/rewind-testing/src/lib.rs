// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rewind Testing - local harness for durable workflows
//!
//! Runs a workflow against an in-memory operation log and a
//! [`VirtualClock`](rewind_core::VirtualClock), so retries and timers that
//! would take minutes in production resolve instantly and deterministically.
//!
//! # Time policies
//!
//! | Policy | Behavior |
//! |--------|----------|
//! | skip-time (`with_skip_time(true)`) | `run_until_complete` jumps the clock to the next pending ready time and re-invokes until terminal |
//! | manual (default) | The clock only moves on `advance_time()`; `run_until_complete` stops at the first future ready time |
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use rewind_testing::LocalTestRunner;
//!
//! let runner = LocalTestRunner::create(|_: (), ctx| async move {
//!     let one: String = ctx.step("step-1", |_| Ok("step1-done".to_string())).await?;
//!     ctx.wait("pause", Duration::from_secs(300)).await?;
//!     let two: String = ctx.step("step-2", |_| Ok("step2-done".to_string())).await?;
//!     Ok(format!("{one}+{two}"))
//! })
//! .with_skip_time(true);
//!
//! let result = runner.run_until_complete(()).await?;
//! assert_eq!(result.result.as_deref(), Some("step1-done+step2-done"));
//! ```

mod error;
mod runner;
mod sink;

pub use error::{Result, TestError};
pub use runner::LocalTestRunner;
pub use sink::{LogRecord, RecordingSink};
