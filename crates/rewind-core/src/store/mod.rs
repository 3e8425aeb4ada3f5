// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Checkpoint store abstraction.
//!
//! The store is an append-only record of operation states per execution. The
//! engine appends a new record on every status change and folds the history
//! back into one current state per operation when an invocation starts.

mod memory;
mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::operation::Operation;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Durable storage for operation logs.
///
/// Implementations must preserve append order per execution. Executions are
/// independent of each other.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append an operation state to the execution's history.
    async fn append(&self, execution_id: &str, operation: &Operation) -> Result<(), StoreError>;

    /// Every appended record, in append order.
    async fn history(&self, execution_id: &str) -> Result<Vec<Operation>, StoreError>;

    /// Ids of all executions that have at least one record.
    async fn list_executions(&self) -> Result<Vec<String>, StoreError>;

    /// Latest state of every operation, in the order operations first appeared.
    async fn load(&self, execution_id: &str) -> Result<Vec<Operation>, StoreError> {
        Ok(latest_states(self.history(execution_id).await?))
    }
}

/// Fold an append history into the latest state per operation.
pub fn latest_states(history: Vec<Operation>) -> Vec<Operation> {
    let mut positions: HashMap<u32, usize> = HashMap::new();
    let mut latest: Vec<Operation> = Vec::new();
    for operation in history {
        match positions.get(&operation.ordinal) {
            Some(&index) => latest[index] = operation,
            None => {
                positions.insert(operation.ordinal, latest.len());
                latest.push(operation);
            }
        }
    }
    latest
}

/// Open the store selected by the configuration.
///
/// `database_url` unset means an in-memory store.
pub async fn open_store(config: &EngineConfig) -> Result<Arc<dyn CheckpointStore>, StoreError> {
    match &config.database_url {
        Some(url) if url.starts_with("sqlite:") => Ok(Arc::new(SqliteStore::connect(url).await?)),
        Some(path) => Ok(Arc::new(SqliteStore::from_path(path).await?)),
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}
