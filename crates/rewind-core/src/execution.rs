// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Invocation orchestration.
//!
//! [`ExecutionManager::run`] performs exactly one pass through a workflow:
//! load the log, build a [`DurableContext`], call the workflow once and map
//! what happened to an [`ExecutionStatus`]:
//!
//! | Outcome | Status |
//! |---------|--------|
//! | an operation suspended the invocation | `PENDING` (whatever the workflow returned) |
//! | replay mismatch or another fatal error | `FAILED` |
//! | workflow returned `Ok` | `SUCCEEDED` |
//! | workflow returned `Err` | `FAILED` |
//! | checkpoint store failure | `Err(EngineError)` |

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::context::{DurableContext, Halt};
use crate::error::{DurableError, EngineError, ErrorObject};
use crate::logger::{DurableLogger, LogSink, TracingSink};
use crate::operation::{ExecutionStatus, Operation, OperationStatus};
use crate::operation_log::OperationLog;
use crate::store::{CheckpointStore, open_store};

/// Result of one invocation cycle.
#[derive(Debug, Clone)]
pub struct DurableExecutionResult<O> {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// Present only when `SUCCEEDED`.
    pub result: Option<O>,
    /// Present only when `FAILED`.
    pub error: Option<ErrorObject>,
    /// Every recorded operation, in declaration order.
    pub operations: Vec<Operation>,
    /// Earliest ready time among non-terminal operations; when to invoke again.
    pub next_ready_at: Option<DateTime<Utc>>,
}

impl<O> DurableExecutionResult<O> {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeeded_operations(&self) -> Vec<&Operation> {
        self.operations
            .iter()
            .filter(|op| op.status == OperationStatus::Succeeded)
            .collect()
    }

    pub fn get_operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }
}

/// Runs invocation cycles against a checkpoint store.
///
/// Holds no per-execution state; one manager can drive any number of
/// executions, concurrently if the store allows it.
#[derive(Clone)]
pub struct ExecutionManager {
    store: Arc<dyn CheckpointStore>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn LogSink>,
    config: EngineConfig,
}

impl ExecutionManager {
    pub fn new(store: Arc<dyn CheckpointStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            sink: Arc::new(TracingSink),
            config: EngineConfig::default(),
        }
    }

    /// Build a manager from `REWIND_*` environment variables.
    pub async fn from_env(clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        Self::from_config(EngineConfig::from_env()?, clock).await
    }

    /// Build a manager over the store selected by `config`.
    pub async fn from_config(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let store = open_store(&config).await?;
        Ok(Self::new(store, clock).with_config(config))
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Destination for [`DurableLogger`] output. Defaults to [`TracingSink`].
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one invocation of `workflow` for `execution_id`.
    #[instrument(skip_all, fields(execution_id = %execution_id))]
    pub async fn run<I, O, F, Fut>(
        &self,
        execution_id: &str,
        input: I,
        workflow: F,
    ) -> Result<DurableExecutionResult<O>, EngineError>
    where
        F: FnOnce(I, DurableContext) -> Fut,
        Fut: Future<Output = Result<O, DurableError>>,
    {
        let log = OperationLog::load(execution_id, Arc::clone(&self.store)).await?;
        let recorded = log.len();

        let replaying = Arc::new(AtomicBool::new(false));
        let logger = DurableLogger::new(execution_id, Arc::clone(&self.sink), Arc::clone(&replaying))
            .with_replay_suppression(self.config.suppress_replay_logs);
        let context = DurableContext::new(log, Arc::clone(&self.clock), replaying, logger);

        info!(recorded_operations = recorded, "Invocation started");

        let outcome = workflow(input, context.clone()).await;
        let snapshot = context.take_state().await;

        let mut result = DurableExecutionResult {
            execution_id: execution_id.to_string(),
            status: ExecutionStatus::Running,
            result: None,
            error: None,
            operations: snapshot.operations,
            next_ready_at: snapshot.next_ready_at,
        };

        match (snapshot.halt, outcome) {
            (Some(Halt::Store(error)), _) => {
                warn!(error = %error, "Invocation aborted, checkpoint store failed");
                return Err(EngineError::Store(error));
            }
            (Some(Halt::Fatal(error)), _) => {
                warn!(error_type = error.error_type(), error = %error, "Execution failed");
                result.status = ExecutionStatus::Failed;
                result.error = Some(error.to_error_object());
            }
            (Some(Halt::Suspended(until)), _) => {
                result.status = ExecutionStatus::Pending;
                result.next_ready_at = result.next_ready_at.or(Some(until));
            }
            (None, Ok(output)) => {
                result.status = ExecutionStatus::Succeeded;
                result.result = Some(output);
            }
            (None, Err(error)) => {
                warn!(error_type = error.error_type(), error = %error, "Workflow returned an error");
                result.status = ExecutionStatus::Failed;
                result.error = Some(error.to_error_object());
            }
        }

        info!(
            status = %result.status,
            operations = result.operations.len(),
            next_ready_at = ?result.next_ready_at,
            "Invocation finished"
        );

        Ok(result)
    }
}
