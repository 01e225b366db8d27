use fros_models::BankConfig;
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Path to the engine configuration (`FrosConfig`). Defaults apply when absent.
    #[serde(default)]
    pub engine_config: Option<String>,
    /// Accounts whose outgoing transactions are scored.
    pub accounts: Vec<String>,
    /// Seconds between polls of the banking system.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// How far behind the newest transaction seen an id is still remembered.
    /// Older ids are forgotten; if the bank lists them again the ledger
    /// reports them as duplicates.
    #[serde(default = "default_seen_retention")]
    pub seen_retention_seconds: u64,
    pub bank: BankConfig,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.accounts.is_empty() {
            return Err(MonitorError::Config("no accounts to monitor".to_string()));
        }
        if self.poll_interval_seconds == 0 {
            return Err(MonitorError::Config(
                "poll_interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_seen_retention() -> u64 {
    7 * 24 * 3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_example_config() {
        let toml_str = r#"
engine_config = "config/fros.toml"
accounts = ["acct-1001", "acct-1002"]
poll_interval_seconds = 10

[bank]
base_url = "http://localhost:8080"
request_timeout_ms = 2000
"#;
        let config: MonitorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine_config.as_deref(), Some("config/fros.toml"));
        assert_eq!(config.accounts, vec!["acct-1001", "acct-1002"]);
        assert_eq!(config.bank.request_timeout_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserialize_minimal_config() {
        let toml_str = r#"
accounts = ["acct-1"]

[bank]
base_url = "http://bank"
"#;
        let config: MonitorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.poll_interval_seconds, 30);
        assert_eq!(config.seen_retention_seconds, 604_800);
        assert_eq!(config.bank.request_timeout_ms, 5_000);
        assert!(config.engine_config.is_none());
        assert!(config.bank.auth_token.is_none());
    }

    #[test]
    fn sample_config_parses() {
        let config: MonitorConfig =
            toml::from_str(include_str!("../../../config/monitor.toml")).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_account_list() {
        let toml_str = r#"
accounts = []

[bank]
base_url = "http://bank"
"#;
        let config: MonitorConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }
}
