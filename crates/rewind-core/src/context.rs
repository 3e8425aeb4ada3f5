// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The workflow-facing API.
//!
//! Every `step`/`wait` call consumes the next declaration ordinal and is
//! matched against the operation log:
//!
//! | Recorded state | Step | Timer |
//! |----------------|------|-------|
//! | none | run attempt 1 | record, suspend (or elapse if zero) |
//! | `SUCCEEDED` | return memoized result | continue |
//! | `FAILED` | [`DurableError::StepFailed`] | invalid state |
//! | `PENDING`, not ready | suspend | suspend |
//! | `PENDING`, ready | run attempt + 1 | mark elapsed |
//! | `STARTED` | [`DurableError::StepInterrupted`] (at-most-once) | invalid state |
//!
//! Once an invocation is suspended or hits a fatal error, every later call
//! returns that same error without touching the log.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn};

use crate::clock::{Clock, add_duration};
use crate::error::{DurableError, ErrorObject, StoreError, error_types};
use crate::logger::{DurableLogger, OperationLogContext};
use crate::operation::{Operation, OperationKind, OperationStatus, OperationUpdate};
use crate::operation_log::OperationLog;
use crate::step::{StepConfig, StepContext, StepSemantics};

/// Why an invocation stopped making progress.
#[derive(Debug, Clone)]
pub(crate) enum Halt {
    Suspended(DateTime<Utc>),
    Fatal(DurableError),
    Store(StoreError),
}

impl Halt {
    fn to_error(&self) -> DurableError {
        match self {
            Halt::Suspended(until) => DurableError::Suspended { until: *until },
            Halt::Fatal(error) => error.clone(),
            Halt::Store(error) => DurableError::Checkpoint(error.clone()),
        }
    }
}

/// Mutable state of one invocation.
pub(crate) struct ExecutionState {
    pub(crate) log: OperationLog,
    pub(crate) halt: Option<Halt>,
    next_ordinal: u32,
    names: HashMap<String, u32>,
}

impl ExecutionState {
    fn new(log: OperationLog) -> Self {
        Self {
            log,
            halt: None,
            next_ordinal: 0,
            names: HashMap::new(),
        }
    }

    /// Take the next ordinal for `name` and check it against the log.
    fn claim(
        &mut self,
        name: &str,
        kind: OperationKind,
    ) -> Result<(u32, Option<Operation>), DurableError> {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        if let Some(&first) = self.names.get(name) {
            return Err(DurableError::DuplicateOperationName {
                name: name.to_string(),
                ordinal: first,
            });
        }
        self.names.insert(name.to_string(), ordinal);

        let recorded = self.log.lookup(ordinal).cloned();
        if let Some(op) = &recorded
            && (op.kind != kind || op.name != name)
        {
            return Err(DurableError::ReplayMismatch {
                ordinal,
                recorded_kind: op.kind,
                recorded_name: op.name.clone(),
                declared_kind: kind,
                declared_name: name.to_string(),
            });
        }

        Ok((ordinal, recorded))
    }

    /// Remember errors that end the invocation and pass every error through.
    fn raise(&mut self, error: DurableError) -> DurableError {
        if self.halt.is_none() {
            self.halt = match &error {
                DurableError::Suspended { until } => Some(Halt::Suspended(*until)),
                DurableError::Checkpoint(store) => Some(Halt::Store(store.clone())),
                fatal if fatal.is_fatal() => Some(Halt::Fatal(fatal.clone())),
                _ => None,
            };
        }
        error
    }

    fn halted(&self) -> Result<(), DurableError> {
        match &self.halt {
            Some(halt) => Err(halt.to_error()),
            None => Ok(()),
        }
    }
}

struct ContextInner {
    execution_id: String,
    clock: Arc<dyn Clock>,
    replaying: Arc<AtomicBool>,
    logger: DurableLogger,
    state: Mutex<ExecutionState>,
}

/// Handle through which a workflow declares durable operations.
///
/// Cheap to clone; all clones belong to the same invocation. Operations are
/// serialized: a second `step` waits until the first one has been recorded.
#[derive(Clone)]
pub struct DurableContext {
    inner: Arc<ContextInner>,
}

impl DurableContext {
    pub(crate) fn new(
        log: OperationLog,
        clock: Arc<dyn Clock>,
        replaying: Arc<AtomicBool>,
        logger: DurableLogger,
    ) -> Self {
        replaying.store(log.contains(0), Ordering::SeqCst);
        Self {
            inner: Arc::new(ContextInner {
                execution_id: log.execution_id().to_string(),
                clock,
                replaying,
                logger,
                state: Mutex::new(ExecutionState::new(log)),
            }),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.inner.execution_id
    }

    /// Current clock reading.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Whether workflow code is currently re-visiting recorded operations.
    pub fn is_replaying(&self) -> bool {
        self.inner.replaying.load(Ordering::SeqCst)
    }

    pub fn logger(&self) -> &DurableLogger {
        &self.inner.logger
    }

    /// Run `f` as a durable step with the default configuration (no retries).
    pub async fn step<T, F>(&self, name: &str, f: F) -> Result<T, DurableError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&StepContext) -> Result<T, ErrorObject>,
    {
        self.step_with_config(name, StepConfig::default(), f).await
    }

    /// Run `f` as a durable step.
    ///
    /// Returns the recorded result without calling `f` when the step already
    /// succeeded in an earlier invocation.
    pub async fn step_with_config<T, F>(
        &self,
        name: &str,
        config: StepConfig,
        f: F,
    ) -> Result<T, DurableError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&StepContext) -> Result<T, ErrorObject>,
    {
        let mut state = self.inner.state.lock().await;
        let result = self.run_step(&mut state, name, &config, f).await;
        self.refresh_replay_flag(&state);
        result.map_err(|e| state.raise(e))
    }

    /// Durable wait. Suspends the invocation until `duration` has elapsed on
    /// the engine clock.
    pub async fn wait(&self, name: &str, duration: Duration) -> Result<(), DurableError> {
        let mut state = self.inner.state.lock().await;
        let result = self.run_wait(&mut state, name, duration).await;
        self.refresh_replay_flag(&state);
        result.map_err(|e| state.raise(e))
    }

    pub(crate) async fn take_state(&self) -> InvocationSnapshot {
        let mut state = self.inner.state.lock().await;
        InvocationSnapshot {
            halt: state.halt.take(),
            operations: state.log.operations(),
            next_ready_at: state.log.next_ready_time(),
        }
    }

    fn refresh_replay_flag(&self, state: &ExecutionState) {
        self.inner
            .replaying
            .store(state.log.contains(state.next_ordinal), Ordering::SeqCst);
    }

    async fn run_step<T, F>(
        &self,
        state: &mut ExecutionState,
        name: &str,
        config: &StepConfig,
        f: F,
    ) -> Result<T, DurableError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&StepContext) -> Result<T, ErrorObject>,
    {
        state.halted()?;
        let (ordinal, recorded) = state.claim(name, OperationKind::Step)?;
        let now = self.now();

        let attempt = match recorded {
            None => 1,
            Some(op) => match op.status {
                OperationStatus::Succeeded => {
                    debug!(
                        execution_id = %self.inner.execution_id,
                        operation_id = %op.id,
                        "Returning recorded step result"
                    );
                    return decode_result(&op);
                }
                OperationStatus::Failed => {
                    let error = op.error.clone().unwrap_or_else(|| {
                        ErrorObject::new("UnknownError", "step failed without a recorded error")
                    });
                    return Err(DurableError::StepFailed {
                        name: op.name,
                        error,
                    });
                }
                OperationStatus::Pending if !op.is_ready(now) => {
                    return Err(DurableError::Suspended {
                        until: op.ready_at.unwrap_or(now),
                    });
                }
                OperationStatus::Pending => op.attempt + 1,
                OperationStatus::Started => match config.semantics {
                    StepSemantics::AtMostOncePerRetry => {
                        return Err(self.interrupted(state, &op).await);
                    }
                    StepSemantics::AtLeastOncePerRetry => op.attempt.max(1),
                },
            },
        };

        self.execute_attempt(state, ordinal, name, attempt, config, f)
            .await
    }

    async fn execute_attempt<T, F>(
        &self,
        state: &mut ExecutionState,
        ordinal: u32,
        name: &str,
        attempt: u32,
        config: &StepConfig,
        f: F,
    ) -> Result<T, DurableError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&StepContext) -> Result<T, ErrorObject>,
    {
        self.inner.replaying.store(false, Ordering::SeqCst);
        let template = Operation::step(ordinal, name);

        if config.semantics == StepSemantics::AtMostOncePerRetry {
            write(&mut state.log, &template, OperationUpdate::started(attempt)).await?;
        }

        let step_context = StepContext {
            execution_id: self.inner.execution_id.clone(),
            operation_id: template.id.clone(),
            name: name.to_string(),
            attempt,
            logger: self.inner.logger.clone(),
        };

        let outcome = {
            let span = info_span!(
                "operation",
                execution_id = %self.inner.execution_id,
                operation_id = %template.id,
                operation_name = %name,
                attempt
            );
            let _scope = self.inner.logger.enter_operation(OperationLogContext {
                operation_id: template.id.clone(),
                operation_name: name.to_string(),
                attempt,
            });
            span.in_scope(|| f(&step_context))
        };

        match outcome {
            Ok(value) => {
                let payload = match serde_json::to_value(&value) {
                    Ok(payload) => payload,
                    Err(encode_error) => {
                        // The body already ran; close the attempt so replay sees the same failure.
                        let error =
                            ErrorObject::new(error_types::SERIALIZATION, encode_error.to_string());
                        write(
                            &mut state.log,
                            &template,
                            OperationUpdate::failed(attempt, error.clone()),
                        )
                        .await?;
                        warn!(
                            execution_id = %self.inner.execution_id,
                            operation_id = %template.id,
                            attempt,
                            error = %encode_error,
                            "Step result could not be encoded"
                        );
                        return Err(DurableError::StepFailed {
                            name: name.to_string(),
                            error,
                        });
                    }
                };
                write(
                    &mut state.log,
                    &template,
                    OperationUpdate::succeeded(attempt, payload),
                )
                .await?;
                debug!(
                    execution_id = %self.inner.execution_id,
                    operation_id = %template.id,
                    attempt,
                    "Step succeeded"
                );
                Ok(value)
            }
            Err(error) => match config.retry_strategy.compute_delay(attempt, &error) {
                Some(delay) => {
                    let ready_at = add_duration(self.now(), delay);
                    write(
                        &mut state.log,
                        &template,
                        OperationUpdate::retry_scheduled(attempt, ready_at),
                    )
                    .await?;
                    info!(
                        execution_id = %self.inner.execution_id,
                        operation_id = %template.id,
                        attempt,
                        error_type = %error.error_type,
                        retry_at = %ready_at,
                        "Step failed, retry scheduled"
                    );
                    Err(DurableError::Suspended { until: ready_at })
                }
                None => {
                    write(
                        &mut state.log,
                        &template,
                        OperationUpdate::failed(attempt, error.clone()),
                    )
                    .await?;
                    warn!(
                        execution_id = %self.inner.execution_id,
                        operation_id = %template.id,
                        attempt,
                        error_type = %error.error_type,
                        "Step failed, no retries left"
                    );
                    Err(DurableError::StepFailed {
                        name: name.to_string(),
                        error,
                    })
                }
            },
        }
    }

    /// Surface a `STARTED` record left behind by an interrupted attempt.
    ///
    /// The attempt is not re-run and does not count against the retry budget.
    async fn interrupted(&self, state: &mut ExecutionState, op: &Operation) -> DurableError {
        let error = DurableError::StepInterrupted {
            name: op.name.clone(),
            attempt: op.attempt,
        };
        warn!(
            execution_id = %self.inner.execution_id,
            operation_id = %op.id,
            attempt = op.attempt,
            "Step was interrupted before its outcome was recorded"
        );

        if op.error.is_none() {
            let mut update = OperationUpdate::started(op.attempt);
            update.error = Some(error.to_error_object());
            if let Err(store_error) = state.log.update_status(op.ordinal, update).await {
                return DurableError::Checkpoint(store_error);
            }
        }
        error
    }

    async fn run_wait(
        &self,
        state: &mut ExecutionState,
        name: &str,
        duration: Duration,
    ) -> Result<(), DurableError> {
        state.halted()?;
        let (ordinal, recorded) = state.claim(name, OperationKind::Timer)?;
        let now = self.now();

        let Some(op) = recorded else {
            let ready_at = add_duration(now, duration);
            let timer = Operation::timer(ordinal, name, ready_at);
            if ready_at <= now {
                state.log.record(timer.apply(elapsed(&timer))?).await?;
                return Ok(());
            }
            let timer = state.log.record(timer).await?;
            debug!(
                execution_id = %self.inner.execution_id,
                operation_id = %timer.id,
                ready_at = %ready_at,
                "Timer started"
            );
            return Err(DurableError::Suspended { until: ready_at });
        };

        match op.status {
            OperationStatus::Succeeded => Ok(()),
            OperationStatus::Pending if op.is_ready(now) => {
                state.log.update_status(ordinal, elapsed(&op)).await?;
                debug!(
                    execution_id = %self.inner.execution_id,
                    operation_id = %op.id,
                    "Timer elapsed"
                );
                Ok(())
            }
            OperationStatus::Pending => Err(DurableError::Suspended {
                until: op.ready_at.unwrap_or(now),
            }),
            OperationStatus::Started | OperationStatus::Failed => {
                Err(DurableError::InvalidOperationState {
                    name: op.name.clone(),
                    details: format!("timer recorded as {}", op.status),
                })
            }
        }
    }
}

/// Halt state and log contents at the end of an invocation.
pub(crate) struct InvocationSnapshot {
    pub(crate) halt: Option<Halt>,
    pub(crate) operations: Vec<Operation>,
    pub(crate) next_ready_at: Option<DateTime<Utc>>,
}

/// Timer transition to `SUCCEEDED`, keeping its ready time.
fn elapsed(timer: &Operation) -> OperationUpdate {
    let mut update = OperationUpdate::succeeded(timer.attempt, serde_json::Value::Null);
    update.ready_at = timer.ready_at;
    update
}

/// Record `update` for the operation at `template.ordinal`, creating it from
/// `template` on first write.
async fn write(
    log: &mut OperationLog,
    template: &Operation,
    update: OperationUpdate,
) -> Result<Operation, DurableError> {
    let written = if log.contains(template.ordinal) {
        log.update_status(template.ordinal, update).await?
    } else {
        log.record(template.apply(update)?).await?
    };
    Ok(written)
}

fn decode_result<T: DeserializeOwned>(op: &Operation) -> Result<T, DurableError> {
    match op.result_as::<T>()? {
        Some(value) => Ok(value),
        None => Err(DurableError::InvalidOperationState {
            name: op.name.clone(),
            details: "succeeded without a recorded result".to_string(),
        }),
    }
}
