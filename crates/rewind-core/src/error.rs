// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for rewind-core.
//!
//! Three layers:
//! - [`ErrorObject`] is the reduced `{error_type, message}` form persisted in the
//!   operation log and surfaced to callers.
//! - [`DurableError`] is what workflow code observes at a `step`/`wait` call site.
//! - [`StoreError`] and [`EngineError`] describe checkpoint store and invocation
//!   failures.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::OperationKind;

/// Stable `error_type` discriminators produced by the engine.
pub mod error_types {
    /// A step began running but its outcome was never recorded.
    pub const STEP_INTERRUPTED: &str = "StepInterruptedError";
    /// The invocation halted because an operation is not ready yet.
    pub const SUSPENDED: &str = "SuspendedExecution";
    /// The workflow declared a different operation than the log recorded.
    pub const REPLAY_MISMATCH: &str = "ReplayMismatchError";
    /// Two operations in one execution share a name.
    pub const DUPLICATE_OPERATION_NAME: &str = "DuplicateOperationNameError";
    /// A recorded operation is in a state the engine cannot continue from.
    pub const INVALID_OPERATION_STATE: &str = "InvalidOperationStateError";
    /// A step result could not be encoded or decoded.
    pub const SERIALIZATION: &str = "SerializationError";
    /// The checkpoint store rejected a read or write.
    pub const CHECKPOINT: &str = "CheckpointError";
}

/// Reduced failure representation.
///
/// Any [`std::error::Error`] converts into an `ErrorObject`; the error's type
/// name becomes `error_type`, so step bodies can use `?` freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// String-matchable discriminator.
    pub error_type: String,
    /// Human readable description.
    pub message: String,
}

impl ErrorObject {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Whether this error carries the given discriminator.
    pub fn is(&self, error_type: &str) -> bool {
        self.error_type == error_type
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl<E: std::error::Error> From<E> for ErrorObject {
    fn from(err: E) -> Self {
        Self::new(short_type_name::<E>(), err.to_string())
    }
}

/// Last path segment of a type name, without generic arguments.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Errors observed by workflow code.
#[derive(Debug, Clone, Error)]
pub enum DurableError {
    /// The step failed and its retry strategy gave up.
    #[error("step '{name}' failed: {error}")]
    StepFailed { name: String, error: ErrorObject },

    /// The step started an attempt that never recorded an outcome.
    #[error("step '{name}' was interrupted during attempt {attempt}; its outcome is unknown")]
    StepInterrupted { name: String, attempt: u32 },

    /// The invocation must end here and resume no earlier than `until`.
    #[error("execution suspended until {until}")]
    Suspended { until: DateTime<Utc> },

    /// The workflow no longer declares the operations its log recorded.
    #[error(
        "replay mismatch at operation {ordinal}: log recorded {recorded_kind} '{recorded_name}', workflow declared {declared_kind} '{declared_name}'"
    )]
    ReplayMismatch {
        ordinal: u32,
        recorded_kind: OperationKind,
        recorded_name: String,
        declared_kind: OperationKind,
        declared_name: String,
    },

    /// An operation name was reused within one execution.
    #[error("operation name '{name}' is already used by operation {ordinal}")]
    DuplicateOperationName { name: String, ordinal: u32 },

    /// A recorded operation is in a state the engine cannot continue from.
    #[error("operation '{name}' is in an invalid state: {details}")]
    InvalidOperationState { name: String, details: String },

    /// A step result could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The checkpoint store failed.
    #[error("checkpoint store error: {0}")]
    Checkpoint(#[from] StoreError),

    /// A failure raised by workflow code itself.
    #[error("{0}")]
    Workflow(ErrorObject),
}

impl DurableError {
    /// Stable discriminator for this error.
    pub fn error_type(&self) -> &str {
        match self {
            DurableError::StepFailed { error, .. } => &error.error_type,
            DurableError::StepInterrupted { .. } => error_types::STEP_INTERRUPTED,
            DurableError::Suspended { .. } => error_types::SUSPENDED,
            DurableError::ReplayMismatch { .. } => error_types::REPLAY_MISMATCH,
            DurableError::DuplicateOperationName { .. } => error_types::DUPLICATE_OPERATION_NAME,
            DurableError::InvalidOperationState { .. } => error_types::INVALID_OPERATION_STATE,
            DurableError::Serialization(_) => error_types::SERIALIZATION,
            DurableError::Checkpoint(_) => error_types::CHECKPOINT,
            DurableError::Workflow(error) => &error.error_type,
        }
    }

    /// Reduce to the persisted `{error_type, message}` form.
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            DurableError::StepFailed { error, .. } | DurableError::Workflow(error) => {
                error.clone()
            }
            other => ErrorObject::new(other.error_type(), other.to_string()),
        }
    }

    /// Whether this is the interrupted-step signal.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, DurableError::StepInterrupted { .. })
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, DurableError::Suspended { .. })
    }

    /// Errors that end the execution no matter how workflow code handles them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DurableError::ReplayMismatch { .. }
                | DurableError::DuplicateOperationName { .. }
                | DurableError::InvalidOperationState { .. }
                | DurableError::Serialization(_)
        )
    }
}

impl From<ErrorObject> for DurableError {
    fn from(error: ErrorObject) -> Self {
        DurableError::Workflow(error)
    }
}

impl From<serde_json::Error> for DurableError {
    fn from(err: serde_json::Error) -> Self {
        DurableError::Serialization(err.to_string())
    }
}

/// Checkpoint store errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error during {operation}: {details}")]
    Database { operation: String, details: String },

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A write conflicts with what the log already holds.
    #[error("conflicting write for operation {ordinal}: {details}")]
    Conflict { ordinal: u32, details: String },
}

impl StoreError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Database { .. } => "DATABASE_ERROR",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
            StoreError::Conflict { .. } => "CONFLICT",
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Failure of an invocation cycle as a whole.
///
/// An invocation that cannot read or persist its log has no trustworthy
/// status, so it is reported as an error rather than as `FAILED`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl EngineError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Store(err) => err.error_code(),
            EngineError::Config(_) => "CONFIG_ERROR",
        }
    }
}
