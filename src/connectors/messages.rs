// src/connectors/messages.rs
use crate::types::{ContractKey, ContractObservation, OptionType};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

/// Response of `GET /v7/finance/options/<symbol>[?date=<unix>]`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionChainEnvelope {
    pub option_chain: OptionChainBody,
}

#[derive(Debug, Deserialize)]
pub struct OptionChainBody {
    #[serde(default)]
    pub result: Vec<OptionChainResult>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionChainResult {
    pub underlying_symbol: String,
    /// Unix seconds at 00:00 UTC of each listed expiration.
    #[serde(default)]
    pub expiration_dates: Vec<i64>,
    #[serde(default)]
    pub options: Vec<OptionSeries>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSeries {
    pub expiration_date: i64,
    #[serde(default)]
    pub calls: Vec<OptionContractQuote>,
    #[serde(default)]
    pub puts: Vec<OptionContractQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContractQuote {
    pub contract_symbol: String,
    pub strike: Decimal,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub last_price: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<u64>,
}

pub fn unix_to_date(secs: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}

pub fn date_to_unix(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

impl OptionChainResult {
    pub fn expirations(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .expiration_dates
            .iter()
            .filter_map(|secs| unix_to_date(*secs))
            .collect();
        dates.sort();
        dates.dedup();
        dates
    }

    /// Expiration of the chain actually included in this response.
    pub fn served_expiration(&self) -> Option<NaiveDate> {
        self.options
            .first()
            .and_then(|series| unix_to_date(series.expiration_date))
    }

    /// Flattens every call and put into observations. Rows that can't form a
    /// valid contract key are dropped.
    pub fn into_observations(self, observed_at: DateTime<Utc>) -> Vec<ContractObservation> {
        let ticker = self.underlying_symbol;
        let mut out = Vec::new();

        for series in self.options {
            let Some(expiration) = unix_to_date(series.expiration_date) else {
                debug!(ticker = %ticker, ts = series.expiration_date, "Skipping series with bad expiration");
                continue;
            };
            let sides = [
                (OptionType::Call, series.calls),
                (OptionType::Put, series.puts),
            ];
            for (option_type, quotes) in sides {
                for q in quotes {
                    match ContractKey::new(&ticker, option_type, q.strike, expiration) {
                        Ok(key) => out.push(ContractObservation {
                            key,
                            bid: q.bid.unwrap_or_default().max(Decimal::ZERO),
                            ask: q.ask.unwrap_or_default().max(Decimal::ZERO),
                            last: q.last_price.filter(|l| *l >= Decimal::ZERO),
                            volume: q.volume,
                            observed_at,
                        }),
                        Err(e) => debug!(contract = %q.contract_symbol, error = %e, "Dropping chain row"),
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"{
      "optionChain": {
        "result": [{
          "underlyingSymbol": "AMD",
          "expirationDates": [1895011200, 1894406400],
          "strikes": [140.0, 150.0],
          "options": [{
            "expirationDate": 1894406400,
            "calls": [
              {"contractSymbol": "AMD300111C00150000", "strike": 150.0, "bid": 1.1, "ask": 1.3, "lastPrice": 1.25, "volume": 12},
              {"contractSymbol": "AMD300111C00000000", "strike": 0.0, "bid": 0.0, "ask": 0.0}
            ],
            "puts": [
              {"contractSymbol": "AMD300111P00140000", "strike": 140.0, "lastPrice": 0.4}
            ]
          }]
        }],
        "error": null
      }
    }"#;

    #[test]
    fn parses_chain_into_observations() {
        let env: OptionChainEnvelope = serde_json::from_str(SAMPLE).unwrap();
        let result = env.option_chain.result.into_iter().next().unwrap();

        let exps = result.expirations();
        assert_eq!(exps.len(), 2);
        assert!(exps[0] < exps[1]);
        assert_eq!(result.served_expiration(), Some(exps[0]));

        let obs = result.into_observations(Utc::now());
        // strike 0 row is dropped
        assert_eq!(obs.len(), 2);

        let call = &obs[0];
        assert_eq!(call.key.option_type, OptionType::Call);
        assert_eq!(call.key.strike, dec!(150));
        assert_eq!(call.bid, dec!(1.1));
        assert_eq!(call.last, Some(dec!(1.25)));
        assert_eq!(call.volume, Some(12));

        let put = &obs[1];
        assert_eq!(put.key.option_type, OptionType::Put);
        assert_eq!(put.bid, Decimal::ZERO);
        assert_eq!(put.last, Some(dec!(0.4)));
        assert_eq!(put.volume, None);
    }

    #[test]
    fn date_round_trips_through_unix_seconds() {
        let d = NaiveDate::from_ymd_opt(2030, 1, 11).unwrap();
        assert_eq!(unix_to_date(date_to_unix(d)), Some(d));
    }
}
