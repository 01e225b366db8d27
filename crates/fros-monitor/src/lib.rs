pub mod config;
pub mod daemon;
pub mod error;

pub use config::MonitorConfig;
pub use daemon::{Monitor, PollSummary};
pub use error::MonitorError;
