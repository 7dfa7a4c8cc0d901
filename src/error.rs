// src/error.rs
use crate::types::{ContractKey, MonitorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Transient gateway failure. Logged, skipped, retried next cycle.
    #[error("market data unavailable for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    /// Bad manual entry or position-file row. Only that row is dropped.
    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("invalid contract: {0}")]
    InvalidContract(String),

    #[error("{0} monitor is already running")]
    AlreadyRunning(MonitorKind),

    #[error("{0} monitor is not running")]
    NotRunning(MonitorKind),

    /// No usable bid/ask/last this cycle.
    #[error("no usable quote for {0}")]
    UnusableQuote(ContractKey),
}

impl EngineError {
    pub fn unavailable(ticker: &str, reason: impl ToString) -> Self {
        Self::DataUnavailable {
            ticker: ticker.to_string(),
            reason: reason.to_string(),
        }
    }
}
