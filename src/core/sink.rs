// src/core/sink.rs
use crate::types::{Alert, MonitorSnapshot, UiEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Worker → display hand-off. Never blocks the worker.
///
/// Alerts travel on their own unbounded queue so none is ever lost. Log lines
/// and snapshots share a bounded queue and are dropped when it is full.
#[derive(Clone)]
pub struct AlertSink {
    alerts: mpsc::UnboundedSender<Alert>,
    events: mpsc::Sender<UiEvent>,
    closed_reported: Arc<AtomicBool>,
}

/// Receiving half of an [`AlertSink`]. Pending alerts are always handed out
/// before pending log lines and snapshots.
pub struct UiFeed {
    alerts: mpsc::UnboundedReceiver<Alert>,
    events: mpsc::Receiver<UiEvent>,
}

impl AlertSink {
    /// `capacity` bounds the log/snapshot queue only.
    pub fn channel(capacity: usize) -> (Self, UiFeed) {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let sink = Self {
            alerts: alert_tx,
            events: event_tx,
            closed_reported: Arc::new(AtomicBool::new(false)),
        };
        let feed = UiFeed {
            alerts: alert_rx,
            events: event_rx,
        };
        (sink, feed)
    }

    pub fn alert(&self, alert: Alert) {
        if self.alerts.send(alert).is_err() {
            self.report_closed();
        }
    }

    pub fn log(&self, line: impl Into<String>) {
        self.send(UiEvent::Log(line.into()));
    }

    pub fn snapshot(&self, snapshot: MonitorSnapshot) {
        self.send(UiEvent::Snapshot(snapshot));
    }

    fn send(&self, event: UiEvent) {
        match self.events.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "UI queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => self.report_closed(),
        }
    }

    fn report_closed(&self) {
        if !self.closed_reported.swap(true, Ordering::Relaxed) {
            error!("UI channel closed! Display is likely gone.");
        }
    }
}

impl UiFeed {
    pub fn try_recv(&mut self) -> Option<UiEvent> {
        if let Ok(alert) = self.alerts.try_recv() {
            return Some(UiEvent::Alert(alert));
        }
        self.events.try_recv().ok()
    }

    /// Waits for the next event. `None` once every sink is dropped and both
    /// queues are drained.
    pub async fn recv(&mut self) -> Option<UiEvent> {
        tokio::select! {
            biased;
            Some(alert) = self.alerts.recv() => Some(UiEvent::Alert(alert)),
            event = self.events.recv() => match event {
                Some(event) => Some(event),
                None => self.alerts.recv().await.map(UiEvent::Alert),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::fake::key;
    use crate::types::{AlertKind, OptionType};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn spike(n: u32) -> Alert {
        Alert::new(
            key("AMD", OptionType::Call, Decimal::from(100 + n)),
            AlertKind::Spike,
            dec!(1),
            dec!(2),
            Some(dec!(100)),
            Utc::now(),
        )
    }

    fn drain(feed: &mut UiFeed) -> (Vec<Alert>, usize) {
        let mut alerts = Vec::new();
        let mut other = 0;
        while let Some(event) = feed.try_recv() {
            match event {
                UiEvent::Alert(alert) => alerts.push(alert),
                _ => other += 1,
            }
        }
        (alerts, other)
    }

    #[test]
    fn alerts_survive_a_full_queue_in_order() {
        let (sink, mut feed) = AlertSink::channel(4);
        for n in 0..10 {
            sink.log(format!("line {}", n));
            sink.alert(spike(n));
        }

        let (alerts, logs) = drain(&mut feed);
        assert_eq!(alerts.len(), 10);
        let strikes: Vec<Decimal> = alerts.iter().map(|a| a.contract_key.strike).collect();
        let expected: Vec<Decimal> = (0..10).map(|n| Decimal::from(100 + n)).collect();
        assert_eq!(strikes, expected);
        // log lines past capacity are dropped
        assert_eq!(logs, 4);
    }

    #[test]
    fn send_after_display_is_gone_does_not_panic() {
        let (sink, feed) = AlertSink::channel(4);
        drop(feed);
        sink.alert(spike(1));
        sink.log("still fine");
        assert!(sink.closed_reported.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn recv_drains_alerts_before_reporting_closed() {
        let (sink, mut feed) = AlertSink::channel(4);
        sink.log("hello");
        sink.alert(spike(1));
        drop(sink);

        assert!(matches!(feed.recv().await, Some(UiEvent::Alert(_))));
        assert!(matches!(feed.recv().await, Some(UiEvent::Log(_))));
        assert!(feed.recv().await.is_none());
    }
}
