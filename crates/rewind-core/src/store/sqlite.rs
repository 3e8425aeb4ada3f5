// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed checkpoint store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{debug, instrument};

use super::CheckpointStore;
use crate::error::{ErrorObject, StoreError};
use crate::operation::Operation;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite-backed checkpoint store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Row as stored in `operation_log`.
#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    ordinal: i64,
    operation_id: String,
    name: String,
    kind: String,
    status: String,
    attempt: i64,
    result: Option<String>,
    error_type: Option<String>,
    error_message: Option<String>,
    ready_at: Option<DateTime<Utc>>,
}

impl TryFrom<OperationRow> for Operation {
    type Error = StoreError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        let error = match (row.error_type, row.error_message) {
            (Some(error_type), message) => {
                Some(ErrorObject::new(error_type, message.unwrap_or_default()))
            }
            (None, _) => None,
        };
        let result = row
            .result
            .map(|json| serde_json::from_str(&json))
            .transpose()?;

        Ok(Operation {
            id: row.operation_id,
            ordinal: u32::try_from(row.ordinal)
                .map_err(|_| StoreError::Serialization(format!("bad ordinal {}", row.ordinal)))?,
            name: row.name,
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            attempt: u32::try_from(row.attempt)
                .map_err(|_| StoreError::Serialization(format!("bad attempt {}", row.attempt)))?,
            result,
            error,
            ready_at: row.ready_at,
        })
    }
}

impl SqliteStore {
    /// Create a store from an existing, already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite URL and run migrations.
    ///
    /// In-memory URLs (`sqlite::memory:`) use a single connection so every
    /// query sees the same database.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(url)
            .await
            .map_err(|e| StoreError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Create and initialize a store from a file path.
    ///
    /// Creates parent directories and the database file when missing, then
    /// runs migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url).await
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
        MIGRATOR
            .run(pool)
            .await
            .map_err(|e| StoreError::Database {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    #[instrument(skip(self, operation), fields(ordinal = operation.ordinal, status = %operation.status))]
    async fn append(&self, execution_id: &str, operation: &Operation) -> Result<(), StoreError> {
        let result = operation
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO operation_log (
                execution_id, ordinal, operation_id, name, kind, status,
                attempt, result, error_type, error_message, ready_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution_id)
        .bind(i64::from(operation.ordinal))
        .bind(&operation.id)
        .bind(&operation.name)
        .bind(operation.kind.as_str())
        .bind(operation.status.as_str())
        .bind(i64::from(operation.attempt))
        .bind(result)
        .bind(operation.error.as_ref().map(|e| e.error_type.as_str()))
        .bind(operation.error.as_ref().map(|e| e.message.as_str()))
        .bind(operation.ready_at)
        .execute(&self.pool)
        .await?;

        debug!("Operation record appended");
        Ok(())
    }

    async fn history(&self, execution_id: &str) -> Result<Vec<Operation>, StoreError> {
        let rows = sqlx::query_as::<_, OperationRow>(
            r#"
            SELECT ordinal, operation_id, name, kind, status, attempt,
                   result, error_type, error_message, ready_at
            FROM operation_log
            WHERE execution_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Operation::try_from).collect()
    }

    async fn list_executions(&self) -> Result<Vec<String>, StoreError> {
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT execution_id
            FROM operation_log
            ORDER BY execution_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
