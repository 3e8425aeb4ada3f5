// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local test runner.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use rewind_core::{
    CheckpointStore, Clock, DurableContext, DurableError, DurableExecutionResult, EngineConfig,
    ExecutionManager, InMemoryStore, LogSink, Operation, OperationLog, TracingSink, VirtualClock,
    next_ready_time,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, TestError};

type WorkflowFuture<O> = Pin<Box<dyn Future<Output = std::result::Result<O, DurableError>> + Send>>;

type SharedWorkflow<I, O> = Arc<dyn Fn(I, DurableContext) -> WorkflowFuture<O> + Send + Sync>;

/// Drives a workflow against an in-memory log and a virtual clock.
///
/// With skip-time enabled, [`run_until_complete`](Self::run_until_complete)
/// jumps the clock to the next pending ready time and invokes again until the
/// execution is terminal. Without it, the clock only moves when the caller
/// invokes [`advance_time`](Self::advance_time).
///
/// Invocations on one runner never overlap: a second `run` waits until the
/// first has finished its cycle.
pub struct LocalTestRunner<I, O> {
    workflow: SharedWorkflow<I, O>,
    store: Arc<InMemoryStore>,
    clock: Arc<VirtualClock>,
    sink: Arc<dyn LogSink>,
    config: EngineConfig,
    skip_time: bool,
    execution_id: String,
    invocations: AtomicU32,
    cycle: Mutex<()>,
}

impl<I, O> LocalTestRunner<I, O>
where
    I: Clone,
{
    /// Create a runner for `workflow`. Skip-time is off by default.
    pub fn create<F, Fut>(workflow: F) -> Self
    where
        F: Fn(I, DurableContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, DurableError>> + Send + 'static,
    {
        let workflow: SharedWorkflow<I, O> =
            Arc::new(move |input: I, ctx: DurableContext| -> WorkflowFuture<O> {
                Box::pin(workflow(input, ctx))
            });

        Self {
            workflow,
            store: Arc::new(InMemoryStore::new()),
            clock: Arc::new(VirtualClock::starting_now()),
            sink: Arc::new(TracingSink),
            config: EngineConfig::default(),
            skip_time: false,
            execution_id: format!("local-{}", uuid::Uuid::new_v4()),
            invocations: AtomicU32::new(0),
            cycle: Mutex::new(()),
        }
    }

    pub fn with_skip_time(mut self, skip_time: bool) -> Self {
        self.skip_time = skip_time;
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Limit for a single `run_until_complete` call.
    pub fn with_max_invocations(mut self, max_invocations: u32) -> Self {
        self.config.max_invocations = max_invocations;
        self
    }

    /// Start the virtual clock at `start` instead of the current time.
    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.clock = Arc::new(VirtualClock::new(start));
        self
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    /// Perform exactly one invocation cycle.
    pub async fn run(&self, input: I) -> Result<DurableExecutionResult<O>> {
        let _cycle = self.cycle.lock().await;
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(execution_id = %self.execution_id, invocation, "Invoking workflow");

        let workflow = Arc::clone(&self.workflow);
        let result = self
            .manager()
            .run(&self.execution_id, input, move |input, ctx| workflow(input, ctx))
            .await?;
        Ok(result)
    }

    /// Invoke until the execution is terminal or can make no progress without
    /// moving the clock.
    ///
    /// Under skip-time the clock jumps to the earliest pending ready time
    /// between invocations, so this always ends in a terminal status.
    pub async fn run_until_complete(&self, input: I) -> Result<DurableExecutionResult<O>> {
        let limit = self.config.max_invocations;

        for _ in 0..limit {
            let result = self.run(input.clone()).await?;
            if result.is_terminal() {
                return Ok(result);
            }

            match result.next_ready_at {
                Some(ready_at) if ready_at <= self.clock.now() => continue,
                Some(ready_at) if self.skip_time => {
                    info!(
                        execution_id = %self.execution_id,
                        skip_to = %ready_at,
                        "Skipping virtual time"
                    );
                    self.clock.advance_to(ready_at);
                }
                _ => return Ok(result),
            }
        }

        Err(TestError::InvocationLimitExceeded { limit })
    }
}

impl<I, O> LocalTestRunner<I, O> {
    /// Jump the clock to the earliest ready time among pending operations.
    ///
    /// Returns the new clock reading, or `None` when nothing is pending.
    pub async fn advance_time(&self) -> Result<Option<DateTime<Utc>>> {
        let operations = self.store.load(&self.execution_id).await?;
        let Some(ready_at) = next_ready_time(&operations) else {
            debug!(execution_id = %self.execution_id, "No pending operation to advance to");
            return Ok(None);
        };
        Ok(Some(self.clock.advance_to(ready_at)))
    }

    /// Latest recorded state of the operation named `name`.
    pub async fn get_operation(&self, name: &str) -> Result<Option<Operation>> {
        let log = OperationLog::load(self.execution_id.as_str(), self.store.clone()).await?;
        Ok(log.find_by_name(name).cloned())
    }

    /// Latest state of every recorded operation, in declaration order.
    pub async fn operations(&self) -> Result<Vec<Operation>> {
        let mut operations = self.store.load(&self.execution_id).await?;
        operations.sort_by_key(|op| op.ordinal);
        Ok(operations)
    }

    /// Every record appended to the log, in append order.
    pub async fn history(&self) -> Result<Vec<Operation>> {
        Ok(self.store.history(&self.execution_id).await?)
    }

    /// Forget all recorded operations so the next run starts fresh.
    pub async fn reset(&self) {
        let _cycle = self.cycle.lock().await;
        self.store.clear(&self.execution_id).await;
        self.invocations.store(0, Ordering::SeqCst);
    }

    pub fn clock(&self) -> &Arc<VirtualClock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn skip_time(&self) -> bool {
        self.skip_time
    }

    /// Invocation cycles performed so far.
    pub fn invocation_count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    fn manager(&self) -> ExecutionManager {
        ExecutionManager::new(self.store.clone(), self.clock.clone())
            .with_config(self.config.clone())
            .with_log_sink(Arc::clone(&self.sink))
    }
}
