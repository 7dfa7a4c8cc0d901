// src/connectors/yahoo.rs
use crate::config::GatewayConfig;
use crate::connectors::messages::{date_to_unix, OptionChainEnvelope, OptionChainResult};
use crate::connectors::traits::{ChainListing, ExpirySelector, MarketDataGateway};
use crate::error::EngineError;
use crate::types::ContractObservation;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Option chains from the public Yahoo Finance options endpoint.
pub struct YahooChainClient {
    http_client: Client,
    base_url: Url,
}

impl YahooChainClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid gateway base_url '{}'", config.base_url))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn chain_url(&self, ticker: &str, date: Option<NaiveDate>) -> Result<Url, EngineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EngineError::unavailable(ticker, "base url cannot carry a path"))?
            .pop_if_empty()
            .extend(["v7", "finance", "options", ticker]);
        if let Some(date) = date {
            url.query_pairs_mut()
                .append_pair("date", &date_to_unix(date).to_string());
        }
        Ok(url)
    }

    async fn request_chain(
        &self,
        ticker: &str,
        date: Option<NaiveDate>,
    ) -> Result<OptionChainResult, EngineError> {
        let url = self.chain_url(ticker, date)?;
        debug!(ticker, url = %url, "Requesting option chain");

        let envelope = self
            .http_client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| EngineError::unavailable(ticker, e))?
            .json::<OptionChainEnvelope>()
            .await
            .map_err(|e| EngineError::unavailable(ticker, format!("bad chain payload: {}", e)))?;

        if let Some(err) = envelope.option_chain.error.filter(|e| !e.is_null()) {
            return Err(EngineError::unavailable(ticker, err));
        }

        envelope
            .option_chain
            .result
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::unavailable(ticker, "empty chain result"))
    }
}

#[async_trait]
impl MarketDataGateway for YahooChainClient {
    async fn list_chain(&self, ticker: &str) -> Result<ChainListing, EngineError> {
        let result = self.request_chain(ticker, None).await?;
        Ok(ChainListing {
            expirations: result.expirations(),
            nearest_expiration: result.served_expiration(),
            nearest: result.into_observations(Utc::now()),
        })
    }

    async fn fetch_chain(
        &self,
        ticker: &str,
        expiry: ExpirySelector,
    ) -> Result<Vec<ContractObservation>, EngineError> {
        let date = match expiry {
            ExpirySelector::Nearest => None,
            ExpirySelector::On(date) => Some(date),
        };
        let result = self.request_chain(ticker, date).await?;
        Ok(result.into_observations(Utc::now()))
    }
}
