// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for rewind-core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use rewind_core::{
    CheckpointStore, ExecutionManager, InMemoryStore, LogContext, LogLevel, LogSink, VirtualClock,
};

/// Fixed start instant so ready times are predictable.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Manager over an in-memory store and a virtual clock.
pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<VirtualClock>,
    pub manager: ExecutionManager,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(VirtualClock::new(start_time()));
        let manager = ExecutionManager::new(store.clone(), clock.clone());
        Self {
            store,
            clock,
            manager,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.manager = self.manager.with_log_sink(sink);
        self
    }

    pub fn shared_store(&self) -> Arc<dyn CheckpointStore> {
        self.store.clone()
    }
}

/// Counts how often a step body ran.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicU32>);

impl Calls {
    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Log sink that keeps every forwarded call.
#[derive(Default)]
pub struct CaptureSink {
    pub records: Mutex<Vec<(LogLevel, String, LogContext)>>,
}

impl CaptureSink {
    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message, _)| message.clone())
            .collect()
    }
}

impl LogSink for CaptureSink {
    fn log(&self, level: LogLevel, message: &str, context: &LogContext) {
        self.records
            .lock()
            .unwrap()
            .push((level, message.to_string(), context.clone()));
    }
}

/// Install a fmt subscriber once so `RUST_LOG` works while debugging tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
