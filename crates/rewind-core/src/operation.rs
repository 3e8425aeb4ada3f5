// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation records and execution status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorObject, StoreError};

/// Kind of a durable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// A side-effecting unit of user code.
    Step,
    /// A durable wait.
    Timer,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Step => "STEP",
            OperationKind::Timer => "TIMER",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STEP" => Ok(OperationKind::Step),
            "TIMER" => Ok(OperationKind::Timer),
            other => Err(StoreError::Serialization(format!(
                "unknown operation kind: {}",
                other
            ))),
        }
    }
}

/// Status of a single operation.
///
/// `Started` is the indeterminate state: an attempt began and its outcome was
/// never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Started,
    Succeeded,
    Failed,
}

impl OperationStatus {
    /// Terminal operations are never re-executed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Succeeded | OperationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Started => "STARTED",
            OperationStatus::Succeeded => "SUCCEEDED",
            OperationStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OperationStatus::Pending),
            "STARTED" => Ok(OperationStatus::Started),
            "SUCCEEDED" => Ok(OperationStatus::Succeeded),
            "FAILED" => Ok(OperationStatus::Failed),
            other => Err(StoreError::Serialization(format!(
                "unknown operation status: {}",
                other
            ))),
        }
    }
}

/// Status of an execution after an invocation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    /// Suspended until a future time or an external re-invocation.
    Pending,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded | ExecutionStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Pending => "PENDING",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable operation id for a declaration ordinal.
pub fn operation_id(ordinal: u32) -> String {
    format!("op-{:04}", ordinal)
}

/// One durable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Stable identifier derived from the declaration ordinal.
    pub id: String,
    /// Position of the declaration within the workflow.
    pub ordinal: u32,
    /// User-supplied label, unique within the execution.
    pub name: String,
    pub kind: OperationKind,
    pub status: OperationStatus,
    /// Attempts made so far (1-based once the first attempt begins).
    pub attempt: u32,
    /// Result payload, present only when `Succeeded`.
    pub result: Option<serde_json::Value>,
    /// Failure info, present only when `Failed` or after an interruption.
    pub error: Option<ErrorObject>,
    /// Earliest time the operation may be (re)attempted.
    pub ready_at: Option<DateTime<Utc>>,
}

impl Operation {
    /// A step about to run its first attempt.
    pub fn step(ordinal: u32, name: impl Into<String>) -> Self {
        Self {
            id: operation_id(ordinal),
            ordinal,
            name: name.into(),
            kind: OperationKind::Step,
            status: OperationStatus::Pending,
            attempt: 0,
            result: None,
            error: None,
            ready_at: None,
        }
    }

    /// A timer that elapses at `ready_at`.
    pub fn timer(ordinal: u32, name: impl Into<String>, ready_at: DateTime<Utc>) -> Self {
        Self {
            id: operation_id(ordinal),
            ordinal,
            name: name.into(),
            kind: OperationKind::Timer,
            status: OperationStatus::Pending,
            attempt: 1,
            result: None,
            error: None,
            ready_at: Some(ready_at),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the operation may be (re)attempted at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.ready_at.is_none_or(|ready_at| ready_at <= now)
    }

    /// Decode the stored result.
    pub fn result_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.result.clone().map(serde_json::from_value).transpose()
    }

    /// Produce the next state of this operation.
    ///
    /// Identity fields never change, terminal operations are frozen and
    /// `attempt` never decreases.
    pub fn apply(&self, update: OperationUpdate) -> Result<Operation, StoreError> {
        if self.is_terminal() {
            return Err(StoreError::Conflict {
                ordinal: self.ordinal,
                details: format!(
                    "operation '{}' is already {} and cannot move to {}",
                    self.name, self.status, update.status
                ),
            });
        }
        if update.attempt < self.attempt {
            return Err(StoreError::Conflict {
                ordinal: self.ordinal,
                details: format!(
                    "attempt for '{}' would decrease from {} to {}",
                    self.name, self.attempt, update.attempt
                ),
            });
        }

        Ok(Operation {
            id: self.id.clone(),
            ordinal: self.ordinal,
            name: self.name.clone(),
            kind: self.kind,
            status: update.status,
            attempt: update.attempt,
            result: update.result,
            error: update.error,
            ready_at: update.ready_at,
        })
    }
}

/// A status change for an existing operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationUpdate {
    pub status: OperationStatus,
    pub attempt: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<ErrorObject>,
    pub ready_at: Option<DateTime<Utc>>,
}

impl OperationUpdate {
    /// Marker written before an at-most-once attempt runs.
    pub fn started(attempt: u32) -> Self {
        Self {
            status: OperationStatus::Started,
            attempt,
            result: None,
            error: None,
            ready_at: None,
        }
    }

    pub fn succeeded(attempt: u32, result: serde_json::Value) -> Self {
        Self {
            status: OperationStatus::Succeeded,
            attempt,
            result: Some(result),
            error: None,
            ready_at: None,
        }
    }

    pub fn failed(attempt: u32, error: ErrorObject) -> Self {
        Self {
            status: OperationStatus::Failed,
            attempt,
            result: None,
            error: Some(error),
            ready_at: None,
        }
    }

    /// Failed attempt with a retry scheduled for `ready_at`.
    pub fn retry_scheduled(attempt: u32, ready_at: DateTime<Utc>) -> Self {
        Self {
            status: OperationStatus::Pending,
            attempt,
            result: None,
            error: None,
            ready_at: Some(ready_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_is_stable() {
        assert_eq!(operation_id(0), "op-0000");
        assert_eq!(operation_id(12), "op-0012");
        assert_eq!(Operation::step(12, "a").id, operation_id(12));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::Started,
            OperationStatus::Succeeded,
            OperationStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OperationStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<OperationStatus>().is_err());
        assert!("WAIT".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(OperationStatus::Succeeded.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Started.is_terminal());

        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_is_ready() {
        let now = Utc::now();
        assert!(Operation::step(0, "a").is_ready(now));
        let timer = Operation::timer(1, "t", now + chrono::Duration::seconds(5));
        assert!(!timer.is_ready(now));
        assert!(timer.is_ready(now + chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_apply_keeps_identity() {
        let op = Operation::step(3, "charge");
        let next = op
            .apply(OperationUpdate::succeeded(1, serde_json::json!("ok")))
            .unwrap();
        assert_eq!(next.id, op.id);
        assert_eq!(next.name, "charge");
        assert_eq!(next.kind, OperationKind::Step);
        assert_eq!(next.result_as::<String>().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_apply_rejects_terminal_and_decreasing_attempts() {
        let done = Operation::step(0, "a")
            .apply(OperationUpdate::succeeded(1, serde_json::json!(1)))
            .unwrap();
        assert!(done.apply(OperationUpdate::started(2)).is_err());

        let retrying = Operation::step(0, "a")
            .apply(OperationUpdate::retry_scheduled(2, Utc::now()))
            .unwrap();
        let err = retrying.apply(OperationUpdate::started(1)).unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_value(OperationKind::Timer).unwrap();
        assert_eq!(json, serde_json::json!("TIMER"));
        let json = serde_json::to_value(ExecutionStatus::Pending).unwrap();
        assert_eq!(json, serde_json::json!("PENDING"));
    }
}
