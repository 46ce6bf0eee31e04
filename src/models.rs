use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single financial transaction as the backend serializes it.
///
/// `id` and `created_at` are backend-assigned and absent on locally-built
/// synthetic records until the backend acknowledges them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: String,
    pub amount: f64,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub merchant_details: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_fraud: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// UI highlight flag, cleared shortly after insertion. Never sent on the wire.
    #[serde(skip)]
    pub is_new: bool,
}

impl Transaction {
    pub fn synthetic(user_id: impl Into<String>, amount: f64) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            amount,
            card_number: None,
            merchant_details: None,
            location: None,
            is_fraud: false,
            created_at: None,
            is_new: false,
        }
    }
}

/// A fraud verdict pushed by the backend.
///
/// The feed delivers two shapes: a rich one carrying an embedded snapshot of
/// the triggering transaction, and a flat summary with only `user_id`,
/// `amount` and `status`. Everything except the rule text is optional so both
/// decode; only the embedded-transaction shape can be reconciled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "rule_violated")]
    pub rule_name: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Embedded snapshot of the triggering transaction. A weak reference by
    /// id: the registry may or may not still hold the original.
    #[serde(default)]
    pub transaction: Option<Transaction>,
}

impl FraudAlert {
    pub fn reason(&self) -> &str {
        self.rule_name
            .as_deref()
            .or(self.details.as_deref())
            .unwrap_or("unspecified rule")
    }
}

/// Request body for the transaction-submission endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NewTransaction {
    pub user_id: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
}

impl NewTransaction {
    pub fn new(user_id: impl Into<String>, amount: f64) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            merchant_details: None,
            location: None,
            card_number: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant_details = Some(merchant.into());
        self
    }
}

/// Success response from the submission endpoint.
///
/// The backend returns the new id as a JSON string; richer deployments return
/// a number plus a fraud score. Both decode.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionAck {
    #[serde(default, alias = "id", deserialize_with = "de_lenient_id")]
    pub transaction_id: Option<i64>,
    #[serde(default)]
    pub fraud_score: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

fn de_lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }))
}

/// Aggregate statistics from the snapshot endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionStats {
    #[serde(default)]
    pub total_transactions: i64,
    #[serde(default)]
    pub fraudulent_count: i64,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub avg_amount: f64,
    #[serde(default)]
    pub fraud_rate: f64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub ws_url: String,
    pub transaction_capacity: usize,
    pub alert_capacity: usize,
    pub highlight_ttl_ms: u64,
    pub continuous_interval_ms: u64,
    pub high_value_prob: f64,
    pub travel_prob: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let api_base = std::env::var("FRAUDWATCH_API_BASE")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let ws_url = std::env::var("FRAUDWATCH_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:8080/ws".to_string());

        // Buffer capacities must be positive; a zero or garbage value falls
        // back to the default rather than panicking at buffer construction.
        let transaction_capacity = std::env::var("FRAUDWATCH_TX_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(50);

        let alert_capacity = std::env::var("FRAUDWATCH_ALERT_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(20);

        let highlight_ttl_ms = std::env::var("FRAUDWATCH_HIGHLIGHT_TTL_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .unwrap_or(2000);

        let continuous_interval_ms = std::env::var("FRAUDWATCH_CONTINUOUS_INTERVAL_MS")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let high_value_prob = std::env::var("FRAUDWATCH_HIGH_VALUE_PROB")
            .unwrap_or_else(|_| "0.10".to_string())
            .parse()
            .unwrap_or(0.10);

        let travel_prob = std::env::var("FRAUDWATCH_TRAVEL_PROB")
            .unwrap_or_else(|_| "0.05".to_string())
            .parse()
            .unwrap_or(0.05);

        Ok(Self {
            api_base,
            ws_url,
            transaction_capacity,
            alert_capacity,
            highlight_ttl_ms,
            continuous_interval_ms,
            high_value_prob,
            travel_prob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_decodes_backend_json() {
        let json = r#"{
            "id": 42,
            "user_id": "user-101",
            "amount": 50.0,
            "card_number": "4111-1111",
            "merchant_details": "SHOP_ABC",
            "location": "New York",
            "is_fraud": false,
            "created_at": "2024-05-01T12:00:00Z"
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.id, Some(42));
        assert_eq!(tx.user_id, "user-101");
        assert!(!tx.is_fraud);
        assert!(!tx.is_new);
    }

    #[test]
    fn test_alert_decodes_rich_shape() {
        let json = r#"{
            "rule_violated": "High Value Transaction",
            "transaction": {"id": 7, "user_id": "user-201", "amount": 15000.0}
        }"#;
        let alert: FraudAlert = serde_json::from_str(json).unwrap();
        assert_eq!(alert.reason(), "High Value Transaction");
        assert_eq!(alert.transaction.as_ref().unwrap().id, Some(7));
    }

    #[test]
    fn test_alert_decodes_flat_shape() {
        let json = r#"{"user_id": "user-9", "amount": 12.5, "status": "active"}"#;
        let alert: FraudAlert = serde_json::from_str(json).unwrap();
        assert!(alert.transaction.is_none());
        assert_eq!(alert.amount, Some(12.5));
        assert_eq!(alert.reason(), "unspecified rule");
    }

    #[test]
    fn test_ack_accepts_string_or_numeric_id() {
        let from_string: SubmissionAck =
            serde_json::from_str(r#"{"status": "success", "transaction_id": "123"}"#).unwrap();
        assert_eq!(from_string.transaction_id, Some(123));

        let from_number: SubmissionAck =
            serde_json::from_str(r#"{"id": 456, "fraud_score": 0.92}"#).unwrap();
        assert_eq!(from_number.transaction_id, Some(456));
        assert_eq!(from_number.fraud_score, Some(0.92));
    }

    #[test]
    fn test_zero_capacity_env_falls_back_to_defaults() {
        std::env::set_var("FRAUDWATCH_TX_CAPACITY", "0");
        std::env::set_var("FRAUDWATCH_ALERT_CAPACITY", "not-a-number");
        let config = Config::from_env().unwrap();
        std::env::remove_var("FRAUDWATCH_TX_CAPACITY");
        std::env::remove_var("FRAUDWATCH_ALERT_CAPACITY");

        assert_eq!(config.transaction_capacity, 50);
        assert_eq!(config.alert_capacity, 20);
    }

    #[test]
    fn test_new_transaction_skips_empty_fields() {
        let body = serde_json::to_value(NewTransaction::new("u1", 9.99)).unwrap();
        assert!(body.get("location").is_none());
        assert!(body.get("merchant_details").is_none());
    }
}
