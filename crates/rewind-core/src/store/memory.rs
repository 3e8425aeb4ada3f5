// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory checkpoint store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CheckpointStore;
use crate::error::StoreError;
use crate::operation::Operation;

/// Checkpoint store backed by process memory.
///
/// Used by the local test harness and by hosts that do not need to survive a
/// restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    executions: RwLock<HashMap<String, Vec<Operation>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record of an execution.
    pub async fn clear(&self, execution_id: &str) {
        self.executions.write().await.remove(execution_id);
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn append(&self, execution_id: &str, operation: &Operation) -> Result<(), StoreError> {
        self.executions
            .write()
            .await
            .entry(execution_id.to_string())
            .or_default()
            .push(operation.clone());
        Ok(())
    }

    async fn history(&self, execution_id: &str) -> Result<Vec<Operation>, StoreError> {
        Ok(self
            .executions
            .read()
            .await
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_executions(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.executions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
