// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Log sink that records forwarded calls for assertions.

use std::sync::Mutex;

use rewind_core::{LogContext, LogLevel, LogSink};

/// One forwarded log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub execution_id: String,
    pub operation_name: Option<String>,
    pub attempt: Option<u32>,
}

/// Keeps every call the [`DurableLogger`](rewind_core::DurableLogger) forwards.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    /// Messages logged at exactly `level`.
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .map(|r| r.message)
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: LogLevel, message: &str, context: &LogContext) {
        let record = LogRecord {
            level,
            message: message.to_string(),
            execution_id: context.execution_id.clone(),
            operation_name: context
                .operation
                .as_ref()
                .map(|op| op.operation_name.clone()),
            attempt: context.operation.as_ref().map(|op| op.attempt),
        };
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}
