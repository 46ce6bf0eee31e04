//! Stream monitoring: bounded views of the transaction and alert feeds, and
//! the WebSocket client that keeps them reconciled.

pub mod state;
pub mod stream;

pub use state::{MonitorHandle, MonitorState, StreamEvent};
pub use stream::{ConnectionState, StreamClient};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::api::BackendClient;

/// Seed the monitor from the backend's snapshot endpoints before the push
/// feed takes over. Seeded entries go through the same insert contract as
/// pushed events, just without the highlight flag.
pub async fn seed_from_backend(monitor: &MonitorHandle, api: &BackendClient) -> Result<()> {
    let transactions = api
        .recent_transactions(monitor.transaction_capacity())
        .await
        .context("fetch recent transactions snapshot")?;
    let alerts = api
        .recent_alerts(monitor.alert_capacity())
        .await
        .context("fetch recent alerts snapshot")?;

    let (tx_count, alert_count) = (transactions.len(), alerts.len());
    monitor.seed(transactions, alerts);
    info!(tx_count, alert_count, "seeded monitor from snapshot");

    // Aggregate stats are display-only; a failure here is not a seed failure.
    match api.transaction_stats().await {
        Ok(stats) => info!(
            total = stats.total_transactions,
            fraud_rate = stats.fraud_rate,
            avg_amount = stats.avg_amount,
            "backend statistics"
        ),
        Err(e) => debug!(error = %e, "stats snapshot unavailable"),
    }
    Ok(())
}
