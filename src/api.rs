//! Backend REST client.
//!
//! Two concerns only: the transaction-submission call the scenario driver
//! uses, and the snapshot reads that seed the monitor at startup. The push
//! feed remains the primary real-time channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::models::{FraudAlert, NewTransaction, SubmissionAck, Transaction, TransactionStats};

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build BackendClient")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Submit one synthetic transaction. Non-2xx is a submission failure;
    /// the body is included in the error for the sequencer's log line.
    pub async fn submit_transaction(&self, tx: &NewTransaction) -> Result<SubmissionAck> {
        let resp = self
            .client
            .post(self.url("/transaction"))
            .json(tx)
            .send()
            .await
            .context("POST /transaction failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("POST /transaction {}: {}", status, text));
        }

        resp.json::<SubmissionAck>()
            .await
            .context("Failed to parse submission ack")
    }

    /// Recent transactions, newest-first.
    pub async fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        self.get_list("/transactions", limit).await
    }

    /// Recent alerts, newest-first.
    pub async fn recent_alerts(&self, limit: usize) -> Result<Vec<FraudAlert>> {
        self.get_list("/alerts", limit).await
    }

    pub async fn transaction_stats(&self) -> Result<TransactionStats> {
        let resp = self
            .client
            .get(self.url("/transactions/stats"))
            .send()
            .await
            .context("GET /transactions/stats failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("GET /transactions/stats {}: {}", status, text));
        }

        resp.json::<TransactionStats>()
            .await
            .context("Failed to parse stats response")
    }

    async fn get_list<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<T>> {
        let resp = self
            .client
            .get(self.url(path))
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("GET {} {}: {}", path, status, text));
        }

        resp.json::<Vec<T>>()
            .await
            .with_context(|| format!("Failed to parse {path} response"))
    }
}

/// Submission seam the scenario drivers run against, so sequencing logic can
/// be exercised without a live backend.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, tx: &NewTransaction) -> Result<SubmissionAck>;
}

#[async_trait]
impl Submitter for BackendClient {
    async fn submit(&self, tx: &NewTransaction) -> Result<SubmissionAck> {
        self.submit_transaction(tx).await
    }
}
