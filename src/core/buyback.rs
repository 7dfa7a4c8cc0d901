// src/core/buyback.rs
use crate::config::BuybackConfig;
use crate::connectors::traits::MarketDataGateway;
use crate::core::cooldown::CooldownRegistry;
use crate::core::sink::AlertSink;
use crate::core::worker::{StoppableWorker, WorkerState};
use crate::error::EngineError;
use crate::rules::buyback::{primary_signal, spread_signal, BuybackSignal};
use crate::types::{
    Alert, AlertKind, ContractKey, ContractObservation, MonitorKind, MonitorSnapshot,
    ShortPosition,
};
use crate::utils::pricing::QuotePolicy;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuybackReport {
    pub cycle: u64,
    pub positions: usize,
    pub quoted: usize,
    pub expired: usize,
    pub alerts: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
enum PositionEdit {
    Upsert(Box<ShortPosition>),
    Remove(ContractKey),
    Clear,
}

struct BuybackCore {
    gateway: Arc<dyn MarketDataGateway>,
    policy: QuotePolicy,
    positions: RwLock<HashMap<ContractKey, ShortPosition>>,
    // edits that arrived while a cycle held the position map
    pending: Mutex<Vec<PositionEdit>>,
    cooldowns: CooldownRegistry<(ContractKey, AlertKind)>,
    sink: AlertSink,
    cycle: tokio::sync::Mutex<u64>,
}

/// Watches short positions and alerts when buying them back looks attractive.
pub struct BuybackMonitor {
    core: Arc<BuybackCore>,
    worker: StoppableWorker,
}

impl BuybackMonitor {
    pub fn new(
        gateway: Arc<dyn MarketDataGateway>,
        policy: QuotePolicy,
        sink: AlertSink,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            core: Arc::new(BuybackCore {
                gateway,
                policy,
                positions: RwLock::new(HashMap::new()),
                pending: Mutex::new(Vec::new()),
                cooldowns: CooldownRegistry::new(),
                sink,
                cycle: tokio::sync::Mutex::new(0),
            }),
            worker: StoppableWorker::new(MonitorKind::Buyback, stop_timeout),
        }
    }

    /// Adds or replaces the position for its contract.
    pub fn add_position(&self, position: ShortPosition) {
        self.core.submit(PositionEdit::Upsert(Box::new(position)));
    }

    pub fn add_positions(&self, positions: impl IntoIterator<Item = ShortPosition>) {
        for position in positions {
            self.add_position(position);
        }
    }

    /// Position was closed or bought back.
    pub fn remove_position(&self, key: &ContractKey) {
        self.core.submit(PositionEdit::Remove(key.clone()));
    }

    pub fn clear_positions(&self) {
        self.core.submit(PositionEdit::Clear);
    }

    /// Copy of the tracked positions, sorted by contract.
    pub fn positions(&self) -> Vec<ShortPosition> {
        let mut positions: Vec<ShortPosition> =
            self.core.positions.read().values().cloned().collect();
        positions.sort_by(|a, b| a.key.cmp(&b.key));
        positions
    }

    pub fn start(&self, config: BuybackConfig) -> Result<(), EngineError> {
        let core = self.core.clone();
        let interval = config.poll_interval();

        self.worker.start(interval, move || {
            let core = core.clone();
            let config = config.clone();
            async move {
                core.scan_at(&config, Utc::now()).await;
                Ok(())
            }
        })?;

        self.core.sink.log("Buyback monitor started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.worker.stop().await?;
        self.core.sink.log("Buyback monitor stopped");
        Ok(())
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    pub async fn scan_once(&self, config: &BuybackConfig) -> BuybackReport {
        self.core.scan_at(config, Utc::now()).await
    }

    pub async fn scan_at(&self, config: &BuybackConfig, now: DateTime<Utc>) -> BuybackReport {
        self.core.scan_at(config, now).await
    }
}

impl BuybackCore {
    /// Applies the edit right away when no cycle is running, otherwise queues
    /// it for the start of the next cycle.
    fn submit(&self, edit: PositionEdit) {
        match self.cycle.try_lock() {
            Ok(_idle) => self.apply(edit),
            Err(_) => self.pending.lock().push(edit),
        }
    }

    fn apply(&self, edit: PositionEdit) {
        let mut positions = self.positions.write();
        match edit {
            PositionEdit::Upsert(position) => {
                debug!(key = %position.key, "Position added");
                positions.insert(position.key.clone(), *position);
            }
            PositionEdit::Remove(key) => {
                if positions.remove(&key).is_some() {
                    debug!(key = %key, "Position removed");
                }
            }
            PositionEdit::Clear => positions.clear(),
        }
    }

    async fn scan_at(&self, config: &BuybackConfig, now: DateTime<Utc>) -> BuybackReport {
        let mut cycle = self.cycle.lock().await;
        *cycle += 1;

        let edits: Vec<PositionEdit> = std::mem::take(&mut *self.pending.lock());
        for edit in edits {
            self.apply(edit);
        }

        let today = now.date_naive();
        let positions: Vec<ContractKey> = self.positions.read().keys().cloned().collect();
        let mut report = BuybackReport {
            cycle: *cycle,
            positions: positions.len(),
            ..BuybackReport::default()
        };

        // one chain request per (ticker, expiration), however many legs share it
        let mut groups: BTreeMap<(String, NaiveDate), Vec<ContractKey>> = BTreeMap::new();
        for key in positions {
            if key.is_expired(today) {
                debug!(key = %key, "Position expired, not polling");
                self.sink.log(format!("[buyback] {} expired, skipped", key));
                report.expired += 1;
                continue;
            }
            groups
                .entry((key.ticker.clone(), key.expiration))
                .or_default()
                .push(key);
        }

        for ((ticker, expiration), keys) in groups {
            let mut quotes = match self.gateway.fetch_quotes(&ticker, expiration, &keys).await {
                Ok(quotes) => quotes,
                Err(e) => {
                    warn!(ticker = %ticker, %expiration, error = %e, "Quote fetch failed");
                    for key in &keys {
                        self.sink.log(format!("[buyback] {} skipped: {}", key, e));
                    }
                    report.skipped += keys.len();
                    continue;
                }
            };

            for key in keys {
                let Some(observation) = quotes.remove(&key) else {
                    warn!(key = %key, "Contract missing from chain");
                    self.sink.log(format!("[buyback] {} not in chain", key));
                    report.skipped += 1;
                    continue;
                };
                report.quoted += 1;

                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    self.evaluate(&key, &observation, config, now)
                }));
                match outcome {
                    Ok(Ok(fired)) => report.alerts += fired,
                    Ok(Err(e)) => {
                        debug!(error = %e, "Position skipped");
                        report.skipped += 1;
                    }
                    Err(_) => {
                        error!(key = %key, "Position evaluation panicked, skipping");
                        report.skipped += 1;
                    }
                }
            }
        }

        self.sink.snapshot(MonitorSnapshot {
            monitor: MonitorKind::Buyback,
            cycle: report.cycle,
            tracked: report.positions,
            alerts: report.alerts,
            skipped: report.skipped,
        });
        info!(
            cycle = report.cycle,
            positions = report.positions,
            quoted = report.quoted,
            alerts = report.alerts,
            alerted_keys = self.cooldowns.len(),
            "Buyback cycle complete"
        );
        report
    }

    /// Returns how many alerts fired for this position.
    fn evaluate(
        &self,
        key: &ContractKey,
        observation: &ContractObservation,
        config: &BuybackConfig,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let mid = observation
            .mid(self.policy)
            .ok_or_else(|| EngineError::UnusableQuote(key.clone()))?;
        let cooldown = config.cooldown();

        let alerts = {
            let mut positions = self.positions.write();
            let Some(mut record) = positions.get(key).cloned() else {
                return Ok(0);
            };

            let mut alerts = Vec::new();
            // primary rules are exclusive: a cooled-down winner does not fall through
            let signals = [
                primary_signal(&record, mid, config.fast_drop_pct),
                spread_signal(observation, config.spread_pct_threshold),
            ];
            for signal in signals.into_iter().flatten() {
                if self.cooldowns.try_acquire(&(key.clone(), signal.kind), now, cooldown) {
                    alerts.push(to_alert(key, signal, now));
                } else {
                    debug!(key = %key, kind = %signal.kind, "Alert suppressed by cooldown");
                }
            }

            if !alerts.is_empty() {
                record.last_alert_at = Some(now);
            }
            record.last_known_mid = Some(mid);
            positions.insert(key.clone(), record);
            alerts
        };

        let fired = alerts.len();
        for alert in alerts {
            info!(key = %key, kind = %alert.kind, message = %alert.message, "Buyback alert");
            self.sink.alert(alert);
        }
        Ok(fired)
    }
}

fn to_alert(key: &ContractKey, signal: BuybackSignal, now: DateTime<Utc>) -> Alert {
    Alert::new(
        key.clone(),
        signal.kind,
        signal.old_value,
        signal.new_value,
        signal.change_pct,
        now,
    )
}
