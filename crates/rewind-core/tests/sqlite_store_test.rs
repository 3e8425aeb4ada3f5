// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite checkpoint store tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use rewind_core::{
    CheckpointStore, DurableContext, DurableError, ErrorObject, ExecutionManager, ExecutionStatus,
    Operation, OperationStatus, OperationUpdate, SqliteStore, VirtualClock,
};

#[tokio::test]
async fn test_sqlite_store_preserves_operation_fields() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    let ready_at = start_time() + chrono::Duration::seconds(30);

    let step = Operation::step(0, "charge");
    let started = step.apply(OperationUpdate::started(1)).unwrap();
    let retrying = started
        .apply(OperationUpdate::retry_scheduled(1, ready_at))
        .unwrap();
    let done = retrying
        .apply(OperationUpdate::succeeded(
            2,
            serde_json::json!({"receipt": "r-1", "amount": 42}),
        ))
        .unwrap();
    let failed = Operation::step(1, "notify")
        .apply(OperationUpdate::failed(
            1,
            ErrorObject::new("SmtpError", "relay refused"),
        ))
        .unwrap();

    for op in [&started, &retrying, &done, &failed] {
        store.append("exec-1", op).await.unwrap();
    }

    let history = store.history("exec-1").await.unwrap();
    assert_eq!(history, vec![started, retrying.clone(), done.clone(), failed.clone()]);
    assert_eq!(history[1].ready_at, Some(ready_at));

    let latest = store.load("exec-1").await.unwrap();
    assert_eq!(latest, vec![done, failed]);
}

#[tokio::test]
async fn test_sqlite_store_lists_executions() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    store
        .append("exec-b", &Operation::step(0, "a"))
        .await
        .unwrap();
    store
        .append("exec-a", &Operation::step(0, "a"))
        .await
        .unwrap();
    store
        .append("exec-a", &Operation::step(1, "b"))
        .await
        .unwrap();

    assert_eq!(
        store.list_executions().await.unwrap(),
        vec!["exec-a".to_string(), "exec-b".to_string()]
    );
    assert!(store.load("missing").await.unwrap().is_empty());
}

async fn order(ctx: DurableContext, calls: Calls) -> Result<String, DurableError> {
    let reserved: String = ctx
        .step("reserve", |_| {
            calls.hit();
            Ok("reserved".to_string())
        })
        .await?;
    ctx.wait("settle", Duration::from_secs(3600)).await?;
    let shipped: String = ctx
        .step("ship", |_| {
            calls.hit();
            Ok("shipped".to_string())
        })
        .await?;
    Ok(format!("{}+{}", reserved, shipped))
}

#[tokio::test]
async fn test_execution_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("rewind.db");
    let clock = Arc::new(VirtualClock::new(start_time()));
    let calls = Calls::default();

    let first = {
        let store = SqliteStore::from_path(&path).await.unwrap();
        let manager = ExecutionManager::new(Arc::new(store), clock.clone());
        manager
            .run("order-1", (), |_, ctx| order(ctx, calls.clone()))
            .await
            .unwrap()
    };
    assert_eq!(first.status, ExecutionStatus::Pending);
    assert_eq!(calls.count(), 1);

    clock.advance_by(Duration::from_secs(3600));

    // A fresh store over the same file stands in for a restarted host.
    let store = SqliteStore::from_path(&path).await.unwrap();
    let manager = ExecutionManager::new(Arc::new(store.clone()), clock.clone());
    let second = manager
        .run("order-1", (), |_, ctx| order(ctx, calls.clone()))
        .await
        .unwrap();

    assert_eq!(second.status, ExecutionStatus::Succeeded);
    assert_eq!(second.result.as_deref(), Some("reserved+shipped"));
    assert_eq!(calls.count(), 2);

    let latest = store.load("order-1").await.unwrap();
    assert!(latest.iter().all(|op| op.status == OperationStatus::Succeeded));
    assert_eq!(latest.len(), 3);
}
