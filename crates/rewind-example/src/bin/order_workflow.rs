// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Host example - an order workflow re-invoked until it completes.
//!
//! With `REWIND_DATABASE_URL` pointing at a SQLite file the log survives
//! restarts: kill the process at any point and start it again with the same
//! execution id to watch it resume.
//!
//! ```text
//! REWIND_DATABASE_URL=.data/rewind-example.db cargo run -p rewind-example --bin order_workflow -- order-42
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rewind_core::{
    DurableContext, DurableError, ErrorObject, ExecutionManager, ExecutionStatus,
    ExponentialBackoff, JitterStrategy, StepConfig, SystemClock,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Order {
    id: String,
    sku: String,
    quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Receipt {
    order_id: String,
    amount_cents: u64,
}

async fn process_order(order: Order, ctx: DurableContext) -> Result<String, DurableError> {
    ctx.logger()
        .info(format!("processing order {} ({} x {})", order.id, order.quantity, order.sku));

    let reservation: String = ctx
        .step("reserve-stock", |step| {
            step.logger.info("reserving stock");
            Ok(format!("rsv-{}-{}", order.sku, order.quantity))
        })
        .await?;

    // The payment provider rejects the first attempt.
    let charge_config = StepConfig::new().with_retry_strategy(
        ExponentialBackoff::new(4, Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(4))
            .with_jitter(JitterStrategy::None)
            .with_non_retryable("CardDeclined"),
    );
    let receipt: Receipt = ctx
        .step_with_config("charge-card", charge_config, |step| {
            step.logger.info(format!("charging, attempt {}", step.attempt));
            if step.attempt < 2 {
                return Err(ErrorObject::new("GatewayTimeout", "payment gateway timed out"));
            }
            Ok(Receipt {
                order_id: order.id.clone(),
                amount_cents: u64::from(order.quantity) * 1_999,
            })
        })
        .await?;

    ctx.wait("fraud-review-window", Duration::from_secs(3)).await?;

    let tracking: String = ctx
        .step("ship", |_| Ok(format!("trk-{}", order.id)))
        .await?;

    ctx.logger().info("order complete");
    Ok(format!(
        "{} charged {} cents, reservation {}, tracking {}",
        receipt.order_id, receipt.amount_cents, reservation, tracking
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rewind_core=info".parse()?))
        .init();

    let manager = ExecutionManager::from_env(Arc::new(SystemClock)).await?;
    let max_invocations = manager.config().max_invocations;

    let execution_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("order-{}", uuid::Uuid::new_v4()));
    let order = Order {
        id: execution_id.clone(),
        sku: "SKU-RED-MUG".to_string(),
        quantity: 2,
    };

    for invocation in 1..=max_invocations {
        let result = manager
            .run(&execution_id, order.clone(), process_order)
            .await?;

        match result.status {
            ExecutionStatus::Succeeded => {
                info!(invocation, "Execution succeeded");
                println!("{}", result.result.unwrap_or_default());
                return Ok(());
            }
            ExecutionStatus::Failed => {
                let error = result
                    .error
                    .unwrap_or_else(|| ErrorObject::new("UnknownError", "no error recorded"));
                return Err(format!("execution {} failed: {}", execution_id, error).into());
            }
            ExecutionStatus::Pending | ExecutionStatus::Running => {
                let wake_at = result.next_ready_at.unwrap_or_else(Utc::now);
                let delay = (wake_at - Utc::now()).to_std().unwrap_or_default();
                info!(invocation, wake_at = %wake_at, "Execution suspended, sleeping until ready");
                tokio::time::sleep(delay).await;
            }
        }
    }

    warn!(execution_id = %execution_id, "Gave up before the execution completed");
    Err(format!("execution {} did not complete", execution_id).into())
}
