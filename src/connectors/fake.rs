// src/connectors/fake.rs
//! Scripted in-memory gateway for tests. Each ticker or contract holds a queue
//! of responses; every call consumes one, and the last one repeats forever.
//! Listings and chain fetches draw from the same per-ticker queue.

use crate::connectors::traits::{ChainListing, ExpirySelector, MarketDataGateway};
use crate::error::EngineError;
use crate::types::{ContractKey, ContractObservation, OptionType};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

type Response<T> = Result<T, String>;

#[derive(Default)]
pub struct ScriptedGateway {
    chains: Mutex<HashMap<String, VecDeque<Response<Vec<ContractObservation>>>>>,
    quotes: Mutex<HashMap<ContractKey, VecDeque<Response<Option<ContractObservation>>>>>,
    pub listing_calls: AtomicUsize,
    pub chain_calls: AtomicUsize,
    pub quote_calls: AtomicUsize,
}

fn next<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chain(&self, ticker: &str, observations: Vec<ContractObservation>) {
        self.chains
            .lock()
            .entry(ticker.to_string())
            .or_default()
            .push_back(Ok(observations));
    }

    pub fn push_chain_failure(&self, ticker: &str, reason: &str) {
        self.chains
            .lock()
            .entry(ticker.to_string())
            .or_default()
            .push_back(Err(reason.to_string()));
    }

    pub fn push_quote(&self, observation: ContractObservation) {
        self.quotes
            .lock()
            .entry(observation.key.clone())
            .or_default()
            .push_back(Ok(Some(observation)));
    }

    pub fn push_quote_failure(&self, key: &ContractKey, reason: &str) {
        self.quotes
            .lock()
            .entry(key.clone())
            .or_default()
            .push_back(Err(reason.to_string()));
    }

    fn next_chain(&self, ticker: &str) -> Result<Vec<ContractObservation>, EngineError> {
        let response = self.chains.lock().get_mut(ticker).and_then(next);
        response
            .unwrap_or_else(|| Err("no chain scripted".to_string()))
            .map_err(|e| EngineError::unavailable(ticker, e))
    }
}

#[async_trait]
impl MarketDataGateway for ScriptedGateway {
    async fn list_chain(&self, ticker: &str) -> Result<ChainListing, EngineError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        let observations = self.next_chain(ticker)?;

        let mut expirations: Vec<NaiveDate> = observations.iter().map(|o| o.key.expiration).collect();
        expirations.sort();
        expirations.dedup();
        let nearest_expiration = expirations.first().copied();
        Ok(ChainListing {
            expirations,
            nearest_expiration,
            nearest: observations
                .into_iter()
                .filter(|o| Some(o.key.expiration) == nearest_expiration)
                .collect(),
        })
    }

    async fn fetch_chain(
        &self,
        ticker: &str,
        expiry: ExpirySelector,
    ) -> Result<Vec<ContractObservation>, EngineError> {
        self.chain_calls.fetch_add(1, Ordering::SeqCst);
        let observations = self.next_chain(ticker)?;

        let nearest = observations.iter().map(|o| o.key.expiration).min();
        Ok(observations
            .into_iter()
            .filter(|o| match expiry {
                ExpirySelector::Nearest => Some(o.key.expiration) == nearest,
                ExpirySelector::On(date) => o.key.expiration == date,
            })
            .collect())
    }

    async fn fetch_quotes(
        &self,
        _ticker: &str,
        _expiration: NaiveDate,
        keys: &[ContractKey],
    ) -> Result<HashMap<ContractKey, ContractObservation>, EngineError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        let mut quotes = self.quotes.lock();
        let mut out = HashMap::new();
        for key in keys {
            match quotes.get_mut(key).and_then(next) {
                Some(Ok(Some(observation))) => {
                    out.insert(key.clone(), observation);
                }
                Some(Ok(None)) | None => {}
                Some(Err(e)) => return Err(EngineError::unavailable(&key.ticker, e)),
            }
        }
        Ok(out)
    }
}

pub fn expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 1, 16).unwrap()
}

pub fn key(ticker: &str, option_type: OptionType, strike: Decimal) -> ContractKey {
    ContractKey::new(ticker, option_type, strike, expiry()).unwrap()
}

pub fn obs(key: &ContractKey, bid: Decimal, ask: Decimal, last: Option<Decimal>) -> ContractObservation {
    ContractObservation {
        key: key.clone(),
        bid,
        ask,
        last,
        volume: None,
        observed_at: Utc::now(),
    }
}
