// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rewind Core - Durable-Execution Replay Engine
//!
//! A workflow is ordinary sequential async code that declares durable
//! operations through a [`DurableContext`]: steps (side-effecting closures)
//! and timers (durable waits). Every operation outcome is recorded in a
//! [`CheckpointStore`]. When the host process dies and the workflow is invoked
//! again, recorded operations are replayed from the log instead of being
//! executed, and the workflow resumes where it stopped.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   one invocation   ┌──────────────────────┐
//! │  Host / LocalTest-   │ ─────────────────▶ │   ExecutionManager   │
//! │  Runner (re-invokes) │ ◀───────────────── │                      │
//! └──────────────────────┘  DurableExecution- └──────────┬───────────┘
//!                           Result                       │ builds
//!                                                        ▼
//!                     ┌──────────────────────────────────────────────┐
//!                     │ DurableContext  step() / wait()              │
//!                     │   OperationLog ── CheckpointStore            │
//!                     │   Clock, RetryStrategy, DurableLogger        │
//!                     └──────────────────────────────────────────────┘
//! ```
//!
//! # Invocation model
//!
//! An invocation is a single pass through the workflow function. There is no
//! in-process waiting: a step whose retry is scheduled in the future, or a
//! timer that has not elapsed, ends the invocation with status `PENDING` and
//! [`DurableExecutionResult::next_ready_at`] tells the host when to invoke
//! again.
//!
//! | Execution status | Meaning |
//! |------------------|---------|
//! | `SUCCEEDED` | Workflow returned `Ok` |
//! | `FAILED` | Workflow returned `Err`, or replay diverged from the log |
//! | `PENDING` | Suspended until `next_ready_at` |
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rewind_core::{ExecutionManager, InMemoryStore, SystemClock};
//!
//! let manager = ExecutionManager::new(Arc::new(InMemoryStore::new()), Arc::new(SystemClock));
//! let result = manager
//!     .run("order-42", 42u32, |order_id, ctx| async move {
//!         let reserved: String = ctx.step("reserve", |_| Ok(format!("reserved-{order_id}"))).await?;
//!         ctx.wait("cool-down", Duration::from_secs(300)).await?;
//!         ctx.step("ship", |_| Ok(format!("{reserved}+shipped"))).await
//!     })
//!     .await?;
//! ```
//!
//! # Configuration
//!
//! | Variable | Default | Purpose |
//! |----------|---------|---------|
//! | `REWIND_DATABASE_URL` | unset (in-memory) | SQLite URL or path of the checkpoint store |
//! | `REWIND_SUPPRESS_REPLAY_LOGS` | `true` | Drop [`DurableLogger`] calls during replay |
//! | `REWIND_MAX_INVOCATIONS` | `1000` | Invocation cycles a driver performs before giving up |

mod clock;
mod config;
mod context;
mod error;
mod execution;
mod logger;
mod operation;
mod operation_log;
mod retry;
mod step;
pub mod store;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::{ConfigError, DEFAULT_MAX_INVOCATIONS, EngineConfig};
pub use context::DurableContext;
pub use error::{DurableError, EngineError, ErrorObject, StoreError, error_types};
pub use execution::{DurableExecutionResult, ExecutionManager};
pub use logger::{
    DurableLogger, LogContext, LogLevel, LogSink, OperationLogContext, OperationScope, TracingSink,
};
pub use operation::{
    ExecutionStatus, Operation, OperationKind, OperationStatus, OperationUpdate, operation_id,
};
pub use operation_log::{OperationLog, next_ready_time};
pub use retry::{
    ExponentialBackoff, FixedDelay, JitterStrategy, MIN_BACKOFF_DELAY, NoRetry, RetryPresets,
    RetryStrategy,
};
pub use step::{StepConfig, StepContext, StepSemantics};
pub use store::{CheckpointStore, InMemoryStore, SqliteStore};
