// src/connectors/traits.rs
use crate::error::EngineError;
use crate::types::{ContractKey, ContractObservation};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirySelector {
    Nearest,
    On(NaiveDate),
}

/// What an undated chain request returns: every listed expiration plus the
/// full chain of the nearest one.
#[derive(Debug, Clone, Default)]
pub struct ChainListing {
    /// Ascending.
    pub expirations: Vec<NaiveDate>,
    pub nearest_expiration: Option<NaiveDate>,
    pub nearest: Vec<ContractObservation>,
}

/// Chain query boundary. Implementations must bound every request with a finite
/// timeout and report failures as `EngineError::DataUnavailable`, never panic.
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    async fn list_chain(&self, ticker: &str) -> Result<ChainListing, EngineError>;

    async fn fetch_chain(
        &self,
        ticker: &str,
        expiry: ExpirySelector,
    ) -> Result<Vec<ContractObservation>, EngineError>;

    /// Quotes for exact contracts sharing one ticker and expiration, from a
    /// single chain request. Contracts the chain no longer lists are absent
    /// from the map.
    async fn fetch_quotes(
        &self,
        ticker: &str,
        expiration: NaiveDate,
        keys: &[ContractKey],
    ) -> Result<HashMap<ContractKey, ContractObservation>, EngineError> {
        let chain = self
            .fetch_chain(ticker, ExpirySelector::On(expiration))
            .await?;
        Ok(chain
            .into_iter()
            .filter(|obs| keys.contains(&obs.key))
            .map(|obs| (obs.key.clone(), obs))
            .collect())
    }
}
