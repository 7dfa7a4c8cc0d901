// src/core/spike.rs
use crate::config::SpikeConfig;
use crate::connectors::traits::{ChainListing, ExpirySelector, MarketDataGateway};
use crate::core::cooldown::CooldownRegistry;
use crate::core::sink::AlertSink;
use crate::core::worker::{StoppableWorker, WorkerState};
use crate::error::EngineError;
use crate::rules::spike::{evaluate_spike, filter_observation, SpikeDecision};
use crate::storage::presets::TickerUniverse;
use crate::types::{
    Alert, AlertKind, ContractKey, ContractObservation, MonitorKind, MonitorSnapshot,
    TrackedContract,
};
use crate::utils::pricing::QuotePolicy;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub cycle: u64,
    pub tickers_scanned: usize,
    pub tickers_failed: usize,
    pub observations: usize,
    pub alerts: usize,
    pub skipped: usize,
}

enum ContractOutcome {
    Updated,
    Filtered,
    Alerted,
}

struct SpikeCore {
    gateway: Arc<dyn MarketDataGateway>,
    policy: QuotePolicy,
    tracked: RwLock<HashMap<ContractKey, TrackedContract>>,
    cooldowns: CooldownRegistry<ContractKey>,
    sink: AlertSink,
    // serialises cycles and counts them
    cycle: tokio::sync::Mutex<u64>,
}

/// Polls a ticker universe and alerts on cycle-over-cycle premium spikes.
pub struct SpikeScanner {
    core: Arc<SpikeCore>,
    worker: StoppableWorker,
}

impl SpikeScanner {
    pub fn new(
        gateway: Arc<dyn MarketDataGateway>,
        policy: QuotePolicy,
        sink: AlertSink,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            core: Arc::new(SpikeCore {
                gateway,
                policy,
                tracked: RwLock::new(HashMap::new()),
                cooldowns: CooldownRegistry::new(),
                sink,
                cycle: tokio::sync::Mutex::new(0),
            }),
            worker: StoppableWorker::new(MonitorKind::Spike, stop_timeout),
        }
    }

    /// Starts the poll loop. The universe is re-read at the start of every cycle.
    pub fn start(&self, config: SpikeConfig, universe: TickerUniverse) -> Result<(), EngineError> {
        let core = self.core.clone();
        let interval = config.poll_interval();

        self.worker.start(interval, move || {
            let core = core.clone();
            let config = config.clone();
            let tickers = universe.snapshot();
            async move {
                core.scan_at(&config, &tickers, Utc::now()).await;
                Ok(())
            }
        })?;

        self.core.sink.log("Spike scanner started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.worker.stop().await?;
        self.core.sink.log("Spike scanner stopped");
        Ok(())
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Copy of every tracked contract, sorted by key.
    pub fn snapshot(&self) -> Vec<TrackedContract> {
        let mut records: Vec<TrackedContract> = self.core.tracked.read().values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    pub async fn scan_once(&self, config: &SpikeConfig, tickers: &[String]) -> ScanReport {
        self.scan_at(config, tickers, Utc::now()).await
    }

    pub async fn scan_at(
        &self,
        config: &SpikeConfig,
        tickers: &[String],
        now: DateTime<Utc>,
    ) -> ScanReport {
        self.core.scan_at(config, tickers, now).await
    }
}

impl SpikeCore {
    async fn scan_at(
        &self,
        config: &SpikeConfig,
        tickers: &[String],
        now: DateTime<Utc>,
    ) -> ScanReport {
        let mut cycle = self.cycle.lock().await;
        *cycle += 1;

        let today = now.date_naive();
        self.prune_expired(today);

        let mut report = ScanReport {
            cycle: *cycle,
            ..ScanReport::default()
        };

        for ticker in tickers {
            let observations = match self.fetch_window(ticker, config, today).await {
                Ok(observations) => observations,
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Skipping ticker this cycle");
                    self.sink.log(format!("[spike] {} skipped: {}", ticker, e));
                    report.tickers_failed += 1;
                    continue;
                }
            };
            report.tickers_scanned += 1;
            report.observations += observations.len();

            for observation in &observations {
                // one bad record must not take the cycle down
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    self.process(observation, config, now)
                }));
                match outcome {
                    Ok(Ok(ContractOutcome::Alerted)) => report.alerts += 1,
                    Ok(Ok(ContractOutcome::Updated)) => {}
                    Ok(Ok(ContractOutcome::Filtered)) => report.skipped += 1,
                    Ok(Err(e)) => {
                        debug!(error = %e, "Contract skipped");
                        report.skipped += 1;
                    }
                    Err(_) => {
                        error!(key = %observation.key, "Contract evaluation panicked, skipping");
                        report.skipped += 1;
                    }
                }
            }
        }

        let tracked = self.tracked.read().len();
        self.sink.snapshot(MonitorSnapshot {
            monitor: MonitorKind::Spike,
            cycle: report.cycle,
            tracked,
            alerts: report.alerts,
            skipped: report.skipped,
        });
        info!(
            cycle = report.cycle,
            tickers = report.tickers_scanned,
            failed = report.tickers_failed,
            tracked,
            alerts = report.alerts,
            alerted_keys = self.cooldowns.len(),
            "Spike cycle complete"
        );
        report
    }

    /// Chains for every expiration inside the window. Falls back to the
    /// nearest expiration when the window holds none. The nearest chain comes
    /// with the listing and is never requested twice.
    async fn fetch_window(
        &self,
        ticker: &str,
        config: &SpikeConfig,
        today: NaiveDate,
    ) -> Result<Vec<ContractObservation>, EngineError> {
        if config.expiration_window_days == 0 {
            return self.gateway.fetch_chain(ticker, ExpirySelector::Nearest).await;
        }

        let ChainListing {
            expirations,
            nearest_expiration,
            nearest,
        } = self.gateway.list_chain(ticker).await?;
        let horizon = today + chrono::Duration::days(i64::from(config.expiration_window_days));
        let in_window: Vec<NaiveDate> = expirations
            .into_iter()
            .filter(|exp| *exp >= today && *exp <= horizon)
            .collect();

        if in_window.is_empty() {
            return Ok(nearest);
        }

        let mut nearest = Some(nearest);
        let mut observations = Vec::new();
        for expiration in in_window {
            if Some(expiration) == nearest_expiration {
                if let Some(mut chain) = nearest.take() {
                    observations.append(&mut chain);
                    continue;
                }
            }
            match self.gateway.fetch_chain(ticker, ExpirySelector::On(expiration)).await {
                Ok(mut chain) => observations.append(&mut chain),
                Err(e) => {
                    warn!(ticker = %ticker, %expiration, error = %e, "Expiration skipped");
                }
            }
        }
        Ok(observations)
    }

    fn process(
        &self,
        observation: &ContractObservation,
        config: &SpikeConfig,
        now: DateTime<Utc>,
    ) -> Result<ContractOutcome, EngineError> {
        let key = &observation.key;
        let mid = observation
            .mid(self.policy)
            .ok_or_else(|| EngineError::UnusableQuote(key.clone()))?;

        if let Some(reason) = filter_observation(observation, mid, config) {
            debug!(key = %key, ?reason, "Observation filtered");
            return Ok(ContractOutcome::Filtered);
        }

        let alert = {
            let mut tracked = self.tracked.write();
            let mut record = tracked
                .get(key)
                .cloned()
                .unwrap_or_else(|| TrackedContract::new(key.clone()));
            let previous = record.last_known_mid;

            let alert = match (evaluate_spike(previous, mid, config), previous) {
                (SpikeDecision::Spike { change_pct }, Some(old)) => {
                    let cooldown = config.cooldown();
                    if self.cooldowns.try_acquire(key, now, cooldown) {
                        record.last_alert_at = Some(now);
                        Some(Alert::new(key.clone(), AlertKind::Spike, old, mid, Some(change_pct), now))
                    } else {
                        debug!(key = %key, %change_pct, "Spike suppressed by cooldown");
                        None
                    }
                }
                _ => None,
            };

            // baseline always advances; the record is swapped in whole
            record.last_known_mid = Some(mid);
            record.last_observed_at = Some(observation.observed_at);
            tracked.insert(key.clone(), record);
            alert
        };

        match alert {
            Some(alert) => {
                info!(key = %key, message = %alert.message, "Spike alert");
                self.sink.alert(alert);
                Ok(ContractOutcome::Alerted)
            }
            None => Ok(ContractOutcome::Updated),
        }
    }

    fn prune_expired(&self, today: NaiveDate) {
        let mut tracked = self.tracked.write();
        let before = tracked.len();
        tracked.retain(|key, _| !key.is_expired(today));
        let pruned = before - tracked.len();
        if pruned > 0 {
            debug!(pruned, "Dropped expired contracts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::fake::{expiry, key, obs, ScriptedGateway};
    use crate::types::{OptionType, UiEvent};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::core::sink::UiFeed;

    fn scanner(gateway: Arc<ScriptedGateway>) -> (SpikeScanner, UiFeed) {
        let (sink, rx) = AlertSink::channel(1024);
        let scanner = SpikeScanner::new(gateway, QuotePolicy::PreferMid, sink, Duration::from_secs(1));
        (scanner, rx)
    }

    fn alerts(rx: &mut UiFeed) -> Vec<Alert> {
        let mut out = Vec::new();
        while let Some(event) = rx.try_recv() {
            if let UiEvent::Alert(alert) = event {
                out.push(alert);
            }
        }
        out
    }

    fn quote(mid: Decimal) -> (Decimal, Decimal) {
        (mid - dec!(0.05), mid + dec!(0.05))
    }

    fn push_mid(gateway: &ScriptedGateway, k: &ContractKey, mid: Decimal) {
        let (bid, ask) = quote(mid);
        gateway.push_chain(&k.ticker, vec![obs(k, bid, ask, None)]);
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn flat_premium_never_alerts() {
        let gateway = Arc::new(ScriptedGateway::new());
        let k = key("AMD", OptionType::Call, dec!(150));
        push_mid(&gateway, &k, dec!(1.00));
        let (scanner, mut rx) = scanner(gateway);
        let config = SpikeConfig::default();

        for _ in 0..5 {
            scanner.scan_once(&config, &tickers(&["AMD"])).await;
        }
        assert!(alerts(&mut rx).is_empty());
        assert_eq!(scanner.snapshot()[0].last_known_mid, Some(dec!(1.00)));
    }

    #[tokio::test]
    async fn twenty_percent_spike_alerts_ten_percent_does_not() {
        let gateway = Arc::new(ScriptedGateway::new());
        let k = key("AMD", OptionType::Call, dec!(150));
        push_mid(&gateway, &k, dec!(1.00));
        push_mid(&gateway, &k, dec!(1.20));
        let (scanner, mut rx) = scanner(gateway.clone());
        let config = SpikeConfig::default();
        let t0 = Utc::now();

        scanner.scan_at(&config, &tickers(&["AMD"]), t0).await;
        let report = scanner.scan_at(&config, &tickers(&["AMD"]), t0).await;
        assert_eq!(report.alerts, 1);

        let fired = alerts(&mut rx);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, AlertKind::Spike);
        assert_eq!(fired[0].change_pct, Some(dec!(20)));
        assert_eq!(fired[0].old_value, dec!(1.00));

        let k2 = key("NVDA", OptionType::Put, dec!(100));
        push_mid(&gateway, &k2, dec!(1.00));
        push_mid(&gateway, &k2, dec!(1.10));
        scanner.scan_at(&config, &tickers(&["NVDA"]), t0).await;
        let report = scanner.scan_at(&config, &tickers(&["NVDA"]), t0).await;
        assert_eq!(report.alerts, 0);
        assert!(alerts(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn cooldown_limits_repeat_spikes() {
        let gateway = Arc::new(ScriptedGateway::new());
        let k = key("AMD", OptionType::Call, dec!(150));
        for mid in [dec!(1.00), dec!(1.30), dec!(1.70), dec!(2.20)] {
            push_mid(&gateway, &k, mid);
        }
        let (scanner, mut rx) = scanner(gateway);
        let config = SpikeConfig {
            cooldown_seconds: 300,
            ..SpikeConfig::default()
        };
        let t0 = Utc::now();
        let universe = tickers(&["AMD"]);

        scanner.scan_at(&config, &universe, t0).await;
        scanner.scan_at(&config, &universe, t0 + chrono::Duration::seconds(60)).await;
        // second qualifying spike inside the window
        scanner.scan_at(&config, &universe, t0 + chrono::Duration::seconds(120)).await;
        assert_eq!(alerts(&mut rx).len(), 1);
        // the baseline kept advancing while suppressed
        assert_eq!(scanner.snapshot()[0].last_known_mid, Some(dec!(1.70)));

        // third spike after the window
        scanner.scan_at(&config, &universe, t0 + chrono::Duration::seconds(400)).await;
        let fired = alerts(&mut rx);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].old_value, dec!(1.70));
    }

    #[tokio::test]
    async fn repeated_identical_input_is_idempotent() {
        let gateway = Arc::new(ScriptedGateway::new());
        let k = key("AMD", OptionType::Call, dec!(150));
        push_mid(&gateway, &k, dec!(1.00));
        push_mid(&gateway, &k, dec!(1.50));
        let (scanner, mut rx) = scanner(gateway);
        let config = SpikeConfig::default();
        let t0 = Utc::now();
        let universe = tickers(&["AMD"]);

        scanner.scan_at(&config, &universe, t0).await;
        assert_eq!(scanner.scan_at(&config, &universe, t0).await.alerts, 1);
        assert_eq!(scanner.scan_at(&config, &universe, t0).await.alerts, 0);
        assert_eq!(alerts(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn unusable_quote_leaves_state_untouched() {
        let gateway = Arc::new(ScriptedGateway::new());
        let k = key("AMD", OptionType::Call, dec!(150));
        push_mid(&gateway, &k, dec!(1.00));
        gateway.push_chain("AMD", vec![obs(&k, dec!(0), dec!(0), None)]);
        push_mid(&gateway, &k, dec!(1.05));
        let (scanner, mut rx) = scanner(gateway);
        let config = SpikeConfig::default();
        let universe = tickers(&["AMD"]);

        scanner.scan_once(&config, &universe).await;
        let report = scanner.scan_once(&config, &universe).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(scanner.snapshot()[0].last_known_mid, Some(dec!(1.00)));

        scanner.scan_once(&config, &universe).await;
        assert_eq!(scanner.snapshot()[0].last_known_mid, Some(dec!(1.05)));
        assert!(alerts(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn failing_ticker_does_not_block_the_others() {
        let gateway = Arc::new(ScriptedGateway::new());
        let amd = key("AMD", OptionType::Call, dec!(150));
        push_mid(&gateway, &amd, dec!(1.00));
        push_mid(&gateway, &amd, dec!(2.00));
        gateway.push_chain_failure("BAD", "timed out");
        let (scanner, mut rx) = scanner(gateway);
        let config = SpikeConfig::default();
        let universe = tickers(&["BAD", "AMD"]);

        scanner.scan_once(&config, &universe).await;
        let report = scanner.scan_once(&config, &universe).await;

        assert_eq!(report.tickers_failed, 1);
        assert_eq!(report.tickers_scanned, 1);
        assert_eq!(report.alerts, 1);
        assert_eq!(alerts(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn expiration_window_scans_each_listed_date() {
        let gateway = Arc::new(ScriptedGateway::new());
        let near = key("AMD", OptionType::Call, dec!(150));
        let later = ContractKey::new("AMD", OptionType::Call, dec!(150), expiry() + chrono::Duration::days(7)).unwrap();
        let far = ContractKey::new("AMD", OptionType::Call, dec!(150), expiry() + chrono::Duration::days(90)).unwrap();
        gateway.push_chain(
            "AMD",
            vec![
                obs(&near, dec!(1), dec!(1.1), None),
                obs(&later, dec!(2), dec!(2.1), None),
                obs(&far, dec!(3), dec!(3.1), None),
            ],
        );
        let (scanner, _rx) = scanner(gateway.clone());
        let config = SpikeConfig {
            expiration_window_days: 10,
            ..SpikeConfig::default()
        };
        let now = expiry().and_hms_opt(15, 0, 0).unwrap().and_utc();

        scanner.scan_at(&config, &tickers(&["AMD"]), now).await;
        let keys: Vec<ContractKey> = scanner.snapshot().into_iter().map(|t| t.key).collect();
        assert_eq!(keys, vec![near, later]);
        // the nearest chain rides along with the listing
        assert_eq!(gateway.listing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.chain_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_window_uses_the_listed_nearest_chain() {
        let gateway = Arc::new(ScriptedGateway::new());
        let k = key("AMD", OptionType::Call, dec!(150));
        push_mid(&gateway, &k, dec!(1.00));
        let (scanner, _rx) = scanner(gateway.clone());
        let config = SpikeConfig {
            expiration_window_days: 10,
            ..SpikeConfig::default()
        };
        let month_before = (expiry() - chrono::Duration::days(30)).and_hms_opt(15, 0, 0).unwrap().and_utc();

        let report = scanner.scan_at(&config, &tickers(&["AMD"]), month_before).await;
        assert_eq!(report.observations, 1);
        assert_eq!(scanner.snapshot()[0].key, k);
        assert_eq!(gateway.chain_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_cooldown_still_lets_the_first_spike_through() {
        let gateway = Arc::new(ScriptedGateway::new());
        let k = key("AMD", OptionType::Call, dec!(150));
        push_mid(&gateway, &k, dec!(1.00));
        push_mid(&gateway, &k, dec!(2.00));
        push_mid(&gateway, &k, dec!(4.00));
        let (scanner, mut rx) = scanner(gateway);
        let config = SpikeConfig {
            cooldown_seconds: 10_000_000_000_000_000,
            ..SpikeConfig::default()
        };
        let universe = tickers(&["AMD"]);

        scanner.scan_once(&config, &universe).await;
        let report = scanner.scan_once(&config, &universe).await;
        assert_eq!((report.alerts, report.skipped), (1, 0));
        assert_eq!(scanner.snapshot()[0].last_known_mid, Some(dec!(2.00)));

        // cooling down for good, but the baseline keeps moving
        let report = scanner.scan_once(&config, &universe).await;
        assert_eq!((report.alerts, report.skipped), (0, 0));
        assert_eq!(scanner.snapshot()[0].last_known_mid, Some(dec!(4.00)));
        assert_eq!(alerts(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn a_burst_of_alerts_larger_than_the_queue_is_delivered() {
        let gateway = Arc::new(ScriptedGateway::new());
        let keys: Vec<ContractKey> = (1..=10)
            .map(|strike| key("AMD", OptionType::Call, Decimal::from(strike * 10)))
            .collect();
        for mid in [dec!(1.00), dec!(2.00)] {
            let (bid, ask) = quote(mid);
            gateway.push_chain("AMD", keys.iter().map(|k| obs(k, bid, ask, None)).collect());
        }
        let (sink, mut rx) = AlertSink::channel(4);
        let scanner = SpikeScanner::new(gateway, QuotePolicy::PreferMid, sink, Duration::from_secs(1));
        let config = SpikeConfig::default();
        let universe = tickers(&["AMD"]);

        scanner.scan_once(&config, &universe).await;
        let report = scanner.scan_once(&config, &universe).await;
        assert_eq!(report.alerts, 10);
        assert_eq!(alerts(&mut rx).len(), 10);
    }

    #[tokio::test]
    async fn expired_contracts_are_pruned() {
        let gateway = Arc::new(ScriptedGateway::new());
        let k = key("AMD", OptionType::Call, dec!(150));
        push_mid(&gateway, &k, dec!(1.00));
        gateway.push_chain("AMD", vec![]);
        let (scanner, _rx) = scanner(gateway);
        let config = SpikeConfig::default();
        let universe = tickers(&["AMD"]);

        scanner.scan_at(&config, &universe, Utc::now()).await;
        assert_eq!(scanner.snapshot().len(), 1);

        let after_expiry = (expiry() + chrono::Duration::days(1)).and_hms_opt(12, 0, 0).unwrap().and_utc();
        scanner.scan_at(&config, &universe, after_expiry).await;
        assert!(scanner.snapshot().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn snapshots_never_observe_torn_records() {
        const CYCLES: i64 = 200;
        let gateway = Arc::new(ScriptedGateway::new());
        let keys: Vec<ContractKey> = (1..=20)
            .map(|strike| key("AMD", OptionType::Call, Decimal::from(strike * 5)))
            .collect();
        let base = Utc::now();

        // cycle n quotes every contract at mid n, observed at base + n seconds
        for n in 1..=CYCLES {
            let mid = Decimal::from(n);
            let chain = keys
                .iter()
                .map(|k| ContractObservation {
                    key: k.clone(),
                    bid: mid,
                    ask: mid,
                    last: None,
                    volume: None,
                    observed_at: base + chrono::Duration::seconds(n),
                })
                .collect();
            gateway.push_chain("AMD", chain);
        }

        let (scanner, _rx) = scanner(gateway);
        let scanner = Arc::new(scanner);
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let scanner = scanner.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut checked = 0usize;
                while !done.load(Ordering::SeqCst) {
                    for record in scanner.snapshot() {
                        let observed = record.last_observed_at.unwrap();
                        let expected = Decimal::from((observed - base).num_seconds());
                        assert_eq!(record.last_known_mid, Some(expected));
                        checked += 1;
                    }
                }
                checked
            })
        };

        let config = SpikeConfig {
            cooldown_seconds: 0,
            ..SpikeConfig::default()
        };
        let universe = tickers(&["AMD"]);
        for _ in 0..CYCLES {
            scanner.scan_once(&config, &universe).await;
            tokio::task::yield_now().await;
        }
        done.store(true, Ordering::SeqCst);

        reader.join().expect("reader saw a torn record");
        assert_eq!(scanner.snapshot()[0].last_known_mid, Some(Decimal::from(CYCLES)));
    }

    #[tokio::test]
    async fn start_and_stop_drive_the_worker() {
        let gateway = Arc::new(ScriptedGateway::new());
        let k = key("AMD", OptionType::Call, dec!(150));
        push_mid(&gateway, &k, dec!(1.00));
        let (scanner, _rx) = scanner(gateway.clone());
        let universe = TickerUniverse::from_tickers(["AMD"]);
        let config = SpikeConfig {
            poll_interval_seconds: 3600,
            ..SpikeConfig::default()
        };

        scanner.start(config.clone(), universe.clone()).unwrap();
        assert!(matches!(
            scanner.start(config, universe),
            Err(EngineError::AlreadyRunning(MonitorKind::Spike))
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while gateway.chain_calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        scanner.stop().await.unwrap();
        assert_eq!(scanner.state(), WorkerState::Idle);
        assert!(matches!(scanner.stop().await, Err(EngineError::NotRunning(_))));
    }
}
