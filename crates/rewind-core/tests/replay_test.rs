// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replay, suspension and replay-mismatch tests for the execution manager.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use rewind_core::{
    CheckpointStore, DurableContext, DurableError, ExecutionStatus, OperationKind,
    OperationStatus, error_types,
};

async fn step_wait_step(ctx: DurableContext, calls: Calls) -> Result<String, DurableError> {
    let one: String = ctx
        .step("step-1", |_| {
            calls.hit();
            Ok("step1-done".to_string())
        })
        .await?;
    ctx.wait("pause", Duration::from_secs(300)).await?;
    let two: String = ctx
        .step("step-2", |_| {
            calls.hit();
            Ok("step2-done".to_string())
        })
        .await?;
    Ok(format!("{}+{}", one, two))
}

#[tokio::test]
async fn test_replay_returns_recorded_results_without_rerunning() {
    init_tracing();
    let fx = Fixture::new();
    let calls = Calls::default();

    let first = fx
        .manager
        .run("exec-1", (), |_, ctx| step_wait_step(ctx, calls.clone()))
        .await
        .unwrap();

    assert_eq!(first.status, ExecutionStatus::Pending);
    assert!(first.result.is_none());
    assert_eq!(calls.count(), 1);
    assert_eq!(first.operations.len(), 2);
    assert_eq!(
        first.get_operation("step-1").unwrap().status,
        OperationStatus::Succeeded
    );
    let pause = first.get_operation("pause").unwrap();
    assert_eq!(pause.kind, OperationKind::Timer);
    assert_eq!(pause.status, OperationStatus::Pending);
    assert_eq!(
        first.next_ready_at,
        Some(start_time() + chrono::Duration::minutes(5))
    );

    fx.clock.advance_to(first.next_ready_at.unwrap());

    let second = fx
        .manager
        .run("exec-1", (), |_, ctx| step_wait_step(ctx, calls.clone()))
        .await
        .unwrap();

    assert_eq!(second.status, ExecutionStatus::Succeeded);
    assert_eq!(second.result.as_deref(), Some("step1-done+step2-done"));
    assert_eq!(second.succeeded_operations().len(), 3);
    assert_eq!(second.next_ready_at, None);
    assert_eq!(calls.count(), 2, "step-1 must not run again on replay");

    let third = fx
        .manager
        .run("exec-1", (), |_, ctx| step_wait_step(ctx, calls.clone()))
        .await
        .unwrap();

    assert_eq!(third.result, second.result);
    assert_eq!(third.operations, second.operations);
    assert_eq!(calls.count(), 2);
}

#[tokio::test]
async fn test_pending_timer_blocks_later_operations() {
    let fx = Fixture::new();
    let calls = Calls::default();

    let result = fx
        .manager
        .run("exec-1", (), |_, ctx| {
            let calls = calls.clone();
            async move {
                // Ignoring the suspension does not let later operations run.
                let _ = ctx.wait("pause", Duration::from_secs(60)).await;
                ctx.step("after", |_| {
                    calls.hit();
                    Ok(1u32)
                })
                .await
            }
        })
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Pending);
    assert_eq!(calls.count(), 0);
    assert!(result.get_operation("after").is_none());
}

#[tokio::test]
async fn test_suspended_error_carries_ready_time() {
    let fx = Fixture::new();
    let seen = Arc::new(Mutex::new(None));

    let seen_in_workflow = seen.clone();
    fx.manager
        .run("exec-1", (), move |_, ctx| async move {
            let outcome = ctx.wait("pause", Duration::from_secs(90)).await;
            *seen_in_workflow.lock().unwrap() = Some(outcome.clone());
            outcome
        })
        .await
        .unwrap();

    match seen.lock().unwrap().clone() {
        Some(Err(DurableError::Suspended { until })) => {
            assert_eq!(until, start_time() + chrono::Duration::seconds(90));
        }
        other => panic!("expected suspension, got {:?}", other),
    }
}

#[tokio::test]
async fn test_zero_duration_wait_completes_immediately() {
    let fx = Fixture::new();

    let result = fx
        .manager
        .run("exec-1", (), |_, ctx| async move {
            ctx.wait("no-op", Duration::ZERO).await?;
            ctx.step("next", |_| Ok("done".to_string())).await
        })
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(
        result.get_operation("no-op").unwrap().status,
        OperationStatus::Succeeded
    );
}

#[tokio::test]
async fn test_replay_mismatch_on_name_is_fatal() {
    let fx = Fixture::new();
    let calls = Calls::default();

    fx.manager
        .run("exec-1", (), |_, ctx| async move {
            ctx.step("a", |_| Ok(1u32)).await?;
            ctx.wait("w", Duration::from_secs(60)).await?;
            Ok(())
        })
        .await
        .unwrap();

    let result = fx
        .manager
        .run("exec-1", (), |_, ctx| {
            let calls = calls.clone();
            async move {
                // Swallowing the error does not rescue the execution.
                let _ = ctx
                    .step("b", |_| {
                        calls.hit();
                        Ok(2u32)
                    })
                    .await;
                Ok(())
            }
        })
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.is(error_types::REPLAY_MISMATCH));
    assert!(error.message.contains("'a'"));
    assert!(error.message.contains("'b'"));
    assert_eq!(calls.count(), 0);
}

#[tokio::test]
async fn test_replay_mismatch_on_kind_is_fatal() {
    let fx = Fixture::new();

    fx.manager
        .run("exec-1", (), |_, ctx| async move {
            ctx.step("x", |_| Ok(1u32)).await?;
            ctx.wait("later", Duration::from_secs(60)).await
        })
        .await
        .unwrap();

    let result = fx
        .manager
        .run("exec-1", (), |_, ctx| async move {
            ctx.wait("x", Duration::from_secs(1)).await
        })
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(
        result.error.unwrap().error_type,
        error_types::REPLAY_MISMATCH
    );
}

#[tokio::test]
async fn test_duplicate_operation_name_fails_execution() {
    let fx = Fixture::new();

    let result = fx
        .manager
        .run("exec-1", (), |_, ctx| async move {
            ctx.step("same", |_| Ok(1u32)).await?;
            ctx.step("same", |_| Ok(2u32)).await
        })
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(
        result.error.unwrap().error_type,
        error_types::DUPLICATE_OPERATION_NAME
    );
    assert_eq!(result.operations.len(), 1);
}

#[tokio::test]
async fn test_uncaught_workflow_error_fails_execution() {
    let fx = Fixture::new();

    let result = fx
        .manager
        .run("exec-1", (), |_, ctx| async move {
            ctx.step("a", |_| Ok(1u32)).await?;
            Err::<u32, _>(rewind_core::ErrorObject::new("OutOfStock", "nothing left").into())
        })
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.error_type, "OutOfStock");
    assert_eq!(error.message, "nothing left");
    assert!(result.result.is_none());
}

#[tokio::test]
async fn test_replay_flag_tracks_catch_up() {
    let fx = Fixture::new();
    let flags: Arc<Mutex<Vec<(&'static str, bool)>>> = Arc::default();

    let workflow = |flags: Arc<Mutex<Vec<(&'static str, bool)>>>| {
        move |_: (), ctx: DurableContext| async move {
            flags.lock().unwrap().push(("start", ctx.is_replaying()));
            ctx.step("step-1", |_| Ok(1u32)).await?;
            flags.lock().unwrap().push(("after-step-1", ctx.is_replaying()));
            ctx.wait("pause", Duration::from_secs(10)).await?;
            flags.lock().unwrap().push(("after-wait", ctx.is_replaying()));
            ctx.step("step-2", |_| Ok(2u32)).await
        }
    };

    let first = fx
        .manager
        .run("exec-1", (), workflow(flags.clone()))
        .await
        .unwrap();
    fx.clock.advance_to(first.next_ready_at.unwrap());
    fx.manager
        .run("exec-1", (), workflow(flags.clone()))
        .await
        .unwrap();

    assert_eq!(
        *flags.lock().unwrap(),
        vec![
            ("start", false),
            ("after-step-1", false),
            ("start", true),
            ("after-step-1", true),
            ("after-wait", false),
        ]
    );
}

#[tokio::test]
async fn test_executions_are_independent() {
    let fx = Fixture::new();
    let calls_a = Calls::default();
    let calls_b = Calls::default();

    let (a, b) = tokio::join!(
        fx.manager
            .run("exec-a", (), |_, ctx| step_wait_step(ctx, calls_a.clone())),
        fx.manager
            .run("exec-b", (), |_, ctx| step_wait_step(ctx, calls_b.clone())),
    );

    assert_eq!(a.unwrap().status, ExecutionStatus::Pending);
    assert_eq!(b.unwrap().status, ExecutionStatus::Pending);
    assert_eq!(calls_a.count(), 1);
    assert_eq!(calls_b.count(), 1);
    assert_eq!(fx.store.load("exec-a").await.unwrap().len(), 2);
    assert_eq!(fx.store.load("exec-b").await.unwrap().len(), 2);
}
