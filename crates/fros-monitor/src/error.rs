use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Bank API error: {0}")]
    Bank(#[from] fros_agents::BankError),

    #[error("Configuration error: {0}")]
    Config(String),
}
