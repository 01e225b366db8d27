//! Read-only client for the banking system's public transaction endpoints.
//!
//! The banking system is never written to. Its records are converted into
//! [`Transaction`]s and used either as behavioural history or, by the
//! monitor, as new work to score.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use fros_models::{BankConfig, Transaction};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{BankError, ProviderError};
use crate::history::HistorySource;

/// Identifiers arrive as either JSON numbers or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

/// One transaction as served by `GET /transactions/{account}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransaction {
    transaction_id: WireId,
    pub from_account_num: String,
    #[serde(default)]
    pub from_routing_num: Option<String>,
    pub to_account_num: String,
    #[serde(default)]
    pub to_routing_num: Option<String>,
    /// Cents.
    pub amount: i64,
    pub timestamp: String,
}

impl BankTransaction {
    pub fn transaction_id(&self) -> String {
        self.transaction_id.clone().into_string()
    }

    pub fn into_transaction(self) -> Result<Transaction, BankError> {
        let timestamp = parse_bank_timestamp(&self.timestamp)?;
        let mut extra = serde_json::Map::new();
        if let Some(r) = &self.from_routing_num {
            extra.insert("from_routing_num".into(), serde_json::Value::String(r.clone()));
        }
        if let Some(r) = &self.to_routing_num {
            extra.insert("to_routing_num".into(), serde_json::Value::String(r.clone()));
        }

        Ok(Transaction {
            id: self.transaction_id.into_string(),
            amount: self.amount,
            timestamp,
            origin_account: self.from_account_num,
            destination_account: self.to_account_num,
            metadata: (!extra.is_empty()).then(|| fros_models::TransactionMetadata {
                extra: Some(serde_json::Value::Object(extra)),
                ..Default::default()
            }),
        })
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_bank_timestamp(raw: &str) -> Result<DateTime<Utc>, BankError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| BankError::Decode(format!("timestamp {raw:?}: {e}")))
}

pub struct BankApiClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl BankApiClient {
    pub fn new(config: &BankConfig) -> Result<Self, BankError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// Raw records for an account, in the order the bank returns them.
    pub async fn list_transactions(&self, account: &str) -> Result<Vec<BankTransaction>, BankError> {
        let url = format!("{}/transactions/{}", self.base_url, account);
        debug!(url = %url, "Fetching bank transactions");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BankError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.json::<Vec<BankTransaction>>().await?)
    }

    /// Records for an account converted to transactions. Undecodable records
    /// are skipped with a warning.
    pub async fn transactions_for(&self, account: &str) -> Result<Vec<Transaction>, BankError> {
        let raw = self.list_transactions(account).await?;
        let mut out = Vec::with_capacity(raw.len());
        for record in raw {
            let id = record.transaction_id();
            match record.into_transaction() {
                Ok(tx) => out.push(tx),
                Err(e) => warn!(transaction_id = %id, error = %e, "Skipping bank record"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl HistorySource for BankApiClient {
    fn name(&self) -> &str {
        "bank_api"
    }

    async fn recent(&self, account: &str, limit: usize) -> Result<Vec<Transaction>, ProviderError> {
        let mut txs: Vec<Transaction> = self
            .transactions_for(account)
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?
            .into_iter()
            .filter(|tx| tx.origin_account == account)
            .collect();
        txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        txs.truncate(limit);
        Ok(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(url: &str) -> BankConfig {
        BankConfig {
            base_url: url.to_string(),
            request_timeout_ms: 2_000,
            auth_token: Some("token-123".to_string()),
        }
    }

    const BODY: &str = r#"[
        {"transactionId": 9001, "fromAccountNum": "1011226360", "fromRoutingNum": "883745000",
         "toAccountNum": "1033623433", "toRoutingNum": "883745000",
         "amount": 4500, "timestamp": "2026-03-02T14:05:00.000+00:00"},
        {"transactionId": "9002", "fromAccountNum": "1033623433",
         "toAccountNum": "1011226360", "amount": 120000, "timestamp": "2026-03-02T15:00:00"},
        {"transactionId": 9003, "fromAccountNum": "1011226360",
         "toAccountNum": "1055757655", "amount": 800, "timestamp": "2026-03-03T09:30:00Z"}
    ]"#;

    #[test]
    fn wire_record_converts_to_transaction() {
        let records: Vec<BankTransaction> = serde_json::from_str(BODY).unwrap();
        let tx = records[0].clone().into_transaction().unwrap();
        assert_eq!(tx.id, "9001");
        assert_eq!(tx.amount, 4500);
        assert_eq!(tx.origin_account, "1011226360");
        assert_eq!(tx.timestamp, Utc.with_ymd_and_hms(2026, 3, 2, 14, 5, 0).unwrap());
        let extra = tx.metadata.unwrap().extra.unwrap();
        assert_eq!(extra["from_routing_num"], "883745000");

        let naive = records[1].clone().into_transaction().unwrap();
        assert_eq!(naive.id, "9002");
        assert_eq!(naive.timestamp, Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap());
    }

    #[test]
    fn bad_timestamp_is_decode_error() {
        assert!(matches!(
            parse_bank_timestamp("yesterday"),
            Err(BankError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn history_filters_to_outgoing_newest_first() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/transactions/1011226360")
            .match_header("authorization", "Bearer token-123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(BODY)
            .create_async()
            .await;

        let client = BankApiClient::new(&config(&server.url())).unwrap();
        let history = client.recent("1011226360", 10).await.unwrap();

        mock.assert_async().await;
        let ids: Vec<&str> = history.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["9003", "9001"]);
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/transactions/1011226360")
            .with_status(503)
            .create_async()
            .await;

        let client = BankApiClient::new(&config(&server.url())).unwrap();
        match client.list_transactions("1011226360").await {
            Err(BankError::Status { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(matches!(
            client.recent("1011226360", 10).await,
            Err(ProviderError::Unavailable(_))
        ));
    }
}
