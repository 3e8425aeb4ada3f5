// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The operation log of one execution.
//!
//! Holds the latest state of every recorded operation, keyed by declaration
//! ordinal, and writes every change through to the [`CheckpointStore`] before
//! it becomes visible in memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StoreError;
use crate::operation::{Operation, OperationUpdate};
use crate::store::CheckpointStore;

pub struct OperationLog {
    execution_id: String,
    store: Arc<dyn CheckpointStore>,
    operations: BTreeMap<u32, Operation>,
}

impl OperationLog {
    /// Load the log of `execution_id` from the store.
    pub async fn load(
        execution_id: impl Into<String>,
        store: Arc<dyn CheckpointStore>,
    ) -> Result<Self, StoreError> {
        let execution_id = execution_id.into();
        let operations: BTreeMap<u32, Operation> = store
            .load(&execution_id)
            .await?
            .into_iter()
            .map(|op| (op.ordinal, op))
            .collect();

        debug!(
            execution_id = %execution_id,
            operations = operations.len(),
            "Operation log loaded"
        );

        Ok(Self {
            execution_id,
            store,
            operations,
        })
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Recorded operation at `ordinal`.
    pub fn lookup(&self, ordinal: u32) -> Option<&Operation> {
        self.operations.get(&ordinal)
    }

    pub fn contains(&self, ordinal: u32) -> bool {
        self.operations.contains_key(&ordinal)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Operation> {
        self.operations.values().find(|op| op.name == name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// All operations in declaration order.
    pub fn operations(&self) -> Vec<Operation> {
        self.operations.values().cloned().collect()
    }

    /// Record a new operation. The ordinal must not be recorded yet.
    pub async fn record(&mut self, operation: Operation) -> Result<Operation, StoreError> {
        if let Some(existing) = self.operations.get(&operation.ordinal) {
            return Err(StoreError::Conflict {
                ordinal: operation.ordinal,
                details: format!(
                    "operation '{}' is already recorded at this ordinal",
                    existing.name
                ),
            });
        }

        self.store.append(&self.execution_id, &operation).await?;
        self.operations.insert(operation.ordinal, operation.clone());
        Ok(operation)
    }

    /// Move a recorded operation to its next state.
    pub async fn update_status(
        &mut self,
        ordinal: u32,
        update: OperationUpdate,
    ) -> Result<Operation, StoreError> {
        let current = self
            .operations
            .get(&ordinal)
            .ok_or_else(|| StoreError::Conflict {
                ordinal,
                details: "no operation recorded at this ordinal".to_string(),
            })?;
        let next = current.apply(update)?;

        self.store.append(&self.execution_id, &next).await?;
        self.operations.insert(ordinal, next.clone());
        Ok(next)
    }

    /// Earliest ready time among non-terminal operations.
    pub fn next_ready_time(&self) -> Option<DateTime<Utc>> {
        next_ready_time(self.operations.values())
    }
}

/// Earliest ready time among the non-terminal operations in `operations`.
pub fn next_ready_time<'a>(
    operations: impl IntoIterator<Item = &'a Operation>,
) -> Option<DateTime<Utc>> {
    operations
        .into_iter()
        .filter(|op| !op.is_terminal())
        .filter_map(|op| op.ready_at)
        .min()
}
