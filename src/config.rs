// src/config.rs

use crate::utils::pricing::QuotePolicy;
use anyhow::{ensure, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Longest cooldown a config file may ask for.
pub const MAX_COOLDOWN_SECS: u64 = 366 * 24 * 60 * 60;

/// Saturates instead of panicking for values chrono can't represent.
fn cooldown_window(seconds: u64) -> chrono::Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Upper bound on a single chain request. Keeps `stop()` responsive.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query2.finance.yahoo.com".to_string(),
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (option_sentinel)".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct QuoteConfig {
    pub policy: QuotePolicy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UniverseConfig {
    pub presets_dir: PathBuf,
    /// Preset names, e.g. `sp100`, `sp500`, `nas100`.
    pub presets: Vec<String>,
    pub tickers: Vec<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            presets_dir: PathBuf::from("presets"),
            presets: Vec::new(),
            tickers: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SpikeConfig {
    pub min_spike_pct: Decimal,
    pub min_abs_change: Decimal,
    pub min_premium: Decimal,
    pub max_spread_pct: Option<Decimal>,
    /// 0 disables the check; otherwise rows without a reported volume are skipped too.
    pub min_volume: u64,
    pub cooldown_seconds: u64,
    /// 0 = nearest expiration only.
    pub expiration_window_days: u32,
    pub poll_interval_seconds: u64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            min_spike_pct: dec!(15),
            min_abs_change: Decimal::ZERO,
            min_premium: Decimal::ZERO,
            max_spread_pct: None,
            min_volume: 0,
            cooldown_seconds: 300,
            expiration_window_days: 0,
            poll_interval_seconds: 60,
        }
    }
}

impl SpikeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        cooldown_window(self.cooldown_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.min_spike_pct > Decimal::ZERO,
            "spike.min_spike_pct must be > 0"
        );
        ensure!(
            self.min_abs_change >= Decimal::ZERO,
            "spike.min_abs_change cannot be negative"
        );
        ensure!(
            self.poll_interval_seconds > 0,
            "spike.poll_interval_seconds must be > 0"
        );
        ensure!(
            self.cooldown_seconds <= MAX_COOLDOWN_SECS,
            "spike.cooldown_seconds cannot exceed {}",
            MAX_COOLDOWN_SECS
        );
        if let Some(spread) = self.max_spread_pct {
            ensure!(spread > Decimal::ZERO, "spike.max_spread_pct must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BuybackConfig {
    pub positions_file: Option<PathBuf>,
    pub poll_interval_seconds: u64,
    pub cooldown_seconds: u64,
    pub fast_drop_pct: Decimal,
    /// Informational only. `None` disables SPREAD alerts.
    pub spread_pct_threshold: Option<Decimal>,
    /// Used for rows that don't carry their own target.
    pub default_target_capture_pct: Decimal,
    pub default_floor_price: Option<Decimal>,
}

impl Default for BuybackConfig {
    fn default() -> Self {
        Self {
            positions_file: None,
            poll_interval_seconds: 60,
            cooldown_seconds: 300,
            fast_drop_pct: dec!(40),
            spread_pct_threshold: None,
            default_target_capture_pct: dec!(80),
            default_floor_price: None,
        }
    }
}

impl BuybackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        cooldown_window(self.cooldown_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.poll_interval_seconds > 0,
            "buyback.poll_interval_seconds must be > 0"
        );
        ensure!(
            self.cooldown_seconds <= MAX_COOLDOWN_SECS,
            "buyback.cooldown_seconds cannot exceed {}",
            MAX_COOLDOWN_SECS
        );
        ensure!(
            self.fast_drop_pct > Decimal::ZERO,
            "buyback.fast_drop_pct must be > 0"
        );
        if let Some(spread) = self.spread_pct_threshold {
            ensure!(
                spread > Decimal::ZERO,
                "buyback.spread_pct_threshold must be > 0"
            );
        }
        ensure!(
            self.default_target_capture_pct > Decimal::ZERO
                && self.default_target_capture_pct <= Decimal::ONE_HUNDRED,
            "buyback.default_target_capture_pct must be in (0, 100]"
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub stop_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub filter: String,
    /// Every alert is appended here as it arrives, when set.
    pub alerts_csv: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_prefix: "option_sentinel.log".to_string(),
            filter: "option_sentinel=info".to_string(),
            alerts_csv: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub quotes: QuoteConfig,
    pub universe: UniverseConfig,
    pub spike: SpikeConfig,
    pub buyback: BuybackConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn new(path: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("SENTINEL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.gateway.timeout_secs > 0, "gateway.timeout_secs must be > 0");
        self.spike.validate()?;
        self.buyback.validate()?;
        Ok(())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.stop_timeout_secs)
    }
}
