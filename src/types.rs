// src/types.rs
use crate::error::EngineError;
use crate::utils::pricing::{self, QuotePolicy};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

impl FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" | "CALL" | "CALLS" => Ok(Self::Call),
            "P" | "PUT" | "PUTS" => Ok(Self::Put),
            other => Err(format!("unknown option type '{}'", other)),
        }
    }
}

/// Identity of one option contract. Used as the map key wherever a contract is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractKey {
    pub ticker: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiration: NaiveDate,
}

impl ContractKey {
    /// Builds a key, upper-casing the ticker. Rejects empty tickers and non-positive strikes.
    pub fn new(
        ticker: &str,
        option_type: OptionType,
        strike: Decimal,
        expiration: NaiveDate,
    ) -> Result<Self, EngineError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(EngineError::InvalidContract("empty ticker".to_string()));
        }
        if strike <= Decimal::ZERO {
            return Err(EngineError::InvalidContract(format!(
                "strike must be positive, got {}",
                strike
            )));
        }
        Ok(Self {
            ticker,
            option_type,
            // 150 and 150.00 are the same contract
            strike: strike.normalize(),
            expiration,
        })
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiration < today
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}{}",
            self.ticker, self.expiration, self.option_type, self.strike
        )
    }
}

/// One poll result for one contract. Zero bid/ask means "not quoted".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractObservation {
    pub key: ContractKey,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Option<Decimal>,
    /// Contracts traded today, when the source reports it.
    #[serde(default)]
    pub volume: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

impl ContractObservation {
    /// Premium for this observation, or `None` when the quote is unusable.
    pub fn mid(&self, policy: QuotePolicy) -> Option<Decimal> {
        pricing::mid_price(self.bid, self.ask, self.last, policy)
    }

    pub fn spread_pct(&self) -> Option<Decimal> {
        pricing::spread_pct(self.bid, self.ask)
    }
}

/// Scanner-side state for one contract seen in a chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedContract {
    pub key: ContractKey,
    pub last_known_mid: Option<Decimal>,
    pub last_observed_at: Option<DateTime<Utc>>,
    pub last_alert_at: Option<DateTime<Utc>>,
}

impl TrackedContract {
    pub fn new(key: ContractKey) -> Self {
        Self {
            key,
            last_known_mid: None,
            last_observed_at: None,
            last_alert_at: None,
        }
    }
}

/// A short option the user wants to buy back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortPosition {
    pub key: ContractKey,
    pub credit_received: Decimal,
    pub quantity: u32,
    pub target_capture_pct: Decimal,
    pub floor_price: Option<Decimal>,
    #[serde(default)]
    pub note: String,
    #[serde(skip)]
    pub last_known_mid: Option<Decimal>,
    #[serde(skip)]
    pub last_alert_at: Option<DateTime<Utc>>,
}

impl ShortPosition {
    pub fn new(
        key: ContractKey,
        credit_received: Decimal,
        quantity: u32,
        target_capture_pct: Decimal,
        floor_price: Option<Decimal>,
    ) -> Result<Self, EngineError> {
        if credit_received <= Decimal::ZERO {
            return Err(EngineError::InvalidContract(format!(
                "{}: credit received must be positive",
                key
            )));
        }
        if quantity == 0 {
            return Err(EngineError::InvalidContract(format!(
                "{}: quantity must be positive",
                key
            )));
        }
        if target_capture_pct <= Decimal::ZERO || target_capture_pct > Decimal::ONE_HUNDRED {
            return Err(EngineError::InvalidContract(format!(
                "{}: target capture must be in (0, 100], got {}",
                key, target_capture_pct
            )));
        }
        if matches!(floor_price, Some(f) if f < Decimal::ZERO) {
            return Err(EngineError::InvalidContract(format!(
                "{}: floor price cannot be negative",
                key
            )));
        }
        Ok(Self {
            key,
            credit_received,
            quantity,
            target_capture_pct,
            floor_price,
            note: String::new(),
            last_known_mid: None,
            last_alert_at: None,
        })
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Share of the opening credit kept if the position were bought back at `mid`.
    pub fn captured_pct(&self, mid: Decimal) -> Decimal {
        pricing::pct_change(mid, self.credit_received)
            .map(|change| -change)
            .unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    Spike,
    Capture,
    Floor,
    FastDrop,
    Spread,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spike => "SPIKE",
            Self::Capture => "CAPTURE",
            Self::Floor => "FLOOR",
            Self::FastDrop => "FAST_DROP",
            Self::Spread => "SPREAD",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub contract_key: ContractKey,
    pub kind: AlertKind,
    pub old_value: Decimal,
    pub new_value: Decimal,
    pub change_pct: Option<Decimal>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        contract_key: ContractKey,
        kind: AlertKind,
        old_value: Decimal,
        new_value: Decimal,
        change_pct: Option<Decimal>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let message = format_alert_message(&contract_key, kind, old_value, new_value, change_pct);
        Self {
            id: Uuid::new_v4(),
            contract_key,
            kind,
            old_value,
            new_value,
            change_pct,
            message,
            timestamp,
        }
    }
}

fn format_alert_message(
    key: &ContractKey,
    kind: AlertKind,
    old_value: Decimal,
    new_value: Decimal,
    change_pct: Option<Decimal>,
) -> String {
    let pct = change_pct.unwrap_or_default();
    match kind {
        AlertKind::Spike => format!(
            "[SPIKE] {} {:.2}→{:.2} +{:.1}%",
            key, old_value, new_value, pct
        ),
        AlertKind::Capture => format!(
            "[CAPTURE] {} mid={:.2} captured={:.1}%",
            key, new_value, pct
        ),
        AlertKind::Floor => format!(
            "[FLOOR] {} mid={:.2} <= floor {:.2}",
            key, new_value, old_value
        ),
        AlertKind::FastDrop => format!(
            "[FAST_DROP] {} {:.2}→{:.2} -{:.1}%",
            key, old_value, new_value, pct
        ),
        AlertKind::Spread => format!(
            "[SPREAD] {} bid={:.2} ask={:.2} spread={:.1}%",
            key, old_value, new_value, pct
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorKind {
    Spike,
    Buyback,
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spike => write!(f, "spike"),
            Self::Buyback => write!(f, "buyback"),
        }
    }
}

// --- Structures for the TUI ---

#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    pub monitor: MonitorKind,
    pub cycle: u64,
    pub tracked: usize,
    pub alerts: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Alert(Alert),
    Snapshot(MonitorSnapshot),
    Log(String),
}
