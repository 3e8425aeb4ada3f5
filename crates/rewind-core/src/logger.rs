// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replay-aware logging for workflow code.
//!
//! Workflow code runs again from the top on every invocation, so a plain log
//! call between two steps would be emitted once per invocation. [`DurableLogger`]
//! drops calls made while the execution is replaying recorded operations and
//! forwards everything else to a [`LogSink`].
//!
//! The replay flag is shared with the running execution and read on every
//! call: it flips from `true` to `false` once replay catches up with the log.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, trace, warn};

/// Severity of a log call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation fields of the operation currently executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLogContext {
    pub operation_id: String,
    pub operation_name: String,
    pub attempt: u32,
}

/// Correlation fields attached to every forwarded log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub execution_id: String,
    pub operation: Option<OperationLogContext>,
}

/// Destination of forwarded log calls.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, context: &LogContext);
}

/// Forwards to `tracing` at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! emit {
    ($macro:ident, $message:expr, $context:expr) => {{
        let context: &LogContext = $context;
        let op = context.operation.as_ref();
        let operation_id = op.map(|o| o.operation_id.as_str());
        let operation_name = op.map(|o| o.operation_name.as_str());
        let attempt = op.map(|o| o.attempt);
        $macro!(
            execution_id = %context.execution_id,
            operation_id,
            operation_name,
            attempt,
            "{}",
            $message
        )
    }};
}

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str, context: &LogContext) {
        match level {
            LogLevel::Trace => emit!(trace, message, context),
            LogLevel::Debug => emit!(debug, message, context),
            LogLevel::Info => emit!(info, message, context),
            LogLevel::Warn => emit!(warn, message, context),
            LogLevel::Error => emit!(error, message, context),
        }
    }
}

/// Replay-aware logging facade handed to workflow and step code.
#[derive(Clone)]
pub struct DurableLogger {
    execution_id: String,
    sink: Arc<dyn LogSink>,
    replaying: Arc<AtomicBool>,
    suppress_during_replay: bool,
    scopes: Arc<Mutex<Vec<OperationLogContext>>>,
}

impl DurableLogger {
    /// Create a logger bound to an execution's replay flag.
    ///
    /// Suppression during replay is on by default.
    pub fn new(
        execution_id: impl Into<String>,
        sink: Arc<dyn LogSink>,
        replaying: Arc<AtomicBool>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            sink,
            replaying,
            suppress_during_replay: true,
            scopes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_replay_suppression(mut self, enabled: bool) -> Self {
        self.suppress_during_replay = enabled;
        self
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::SeqCst)
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Forward `message` unless the execution is replaying and suppression is on.
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        if self.suppress_during_replay && self.is_replaying() {
            return;
        }
        let context = LogContext {
            execution_id: self.execution_id.clone(),
            operation: self.current_operation(),
        };
        self.sink.log(level, message.as_ref(), &context);
    }

    pub fn trace(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Trace, message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    /// Innermost operation scope, if any.
    pub fn current_operation(&self) -> Option<OperationLogContext> {
        self.scopes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Attach `context` to log calls until the returned guard is dropped.
    pub fn enter_operation(&self, context: OperationLogContext) -> OperationScope {
        let mut scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());
        let depth = scopes.len();
        scopes.push(context);
        OperationScope {
            scopes: Arc::clone(&self.scopes),
            depth,
        }
    }
}

impl fmt::Debug for DurableLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableLogger")
            .field("execution_id", &self.execution_id)
            .field("replaying", &self.is_replaying())
            .field("suppress_during_replay", &self.suppress_during_replay)
            .finish()
    }
}

/// Guard returned by [`DurableLogger::enter_operation`].
///
/// Dropping it removes the scope and anything pushed after it, including on
/// unwinding.
#[must_use = "the operation context is removed when the scope is dropped"]
pub struct OperationScope {
    scopes: Arc<Mutex<Vec<OperationLogContext>>>,
    depth: usize,
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        self.scopes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .truncate(self.depth);
    }
}
