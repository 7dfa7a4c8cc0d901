// src/core/worker.rs
use crate::error::EngineError;
use crate::types::MonitorKind;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
}

struct ActiveLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    state: WorkerState,
    active: Option<ActiveLoop>,
}

/// Cancellable polling loop: runs one cycle, then sleeps, until stopped.
///
/// The stop flag is checked before every cycle and raced against the sleep, so
/// shutdown waits for at most the cycle already in flight. A cycle that errors
/// or panics is logged and the loop carries on.
pub struct StoppableWorker {
    kind: MonitorKind,
    stop_timeout: Duration,
    inner: Mutex<Inner>,
}

impl StoppableWorker {
    pub fn new(kind: MonitorKind, stop_timeout: Duration) -> Self {
        Self {
            kind,
            stop_timeout,
            inner: Mutex::new(Inner {
                state: WorkerState::Idle,
                active: None,
            }),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    /// Spawns the loop on the current Tokio runtime.
    pub fn start<F, Fut>(&self, poll_interval: Duration, cycle: F) -> Result<(), EngineError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.state != WorkerState::Idle {
            return Err(EngineError::AlreadyRunning(self.kind));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(self.kind, poll_interval, stop_rx, cycle));

        inner.active = Some(ActiveLoop { stop_tx, handle });
        inner.state = WorkerState::Running;
        info!(monitor = %self.kind, interval_secs = poll_interval.as_secs(), "Worker started");
        Ok(())
    }

    /// Signals the loop and waits up to the stop timeout for it to exit.
    /// Overrunning the timeout is logged; the loop still exits at its next check.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let active = {
            let mut inner = self.inner.lock();
            if inner.state != WorkerState::Running {
                return Err(EngineError::NotRunning(self.kind));
            }
            inner.state = WorkerState::Stopping;
            inner.active.take()
        };

        if let Some(active) = active {
            // Err only means the loop already exited
            let _ = active.stop_tx.send(true);

            match tokio::time::timeout(self.stop_timeout, active.handle).await {
                Ok(Ok(())) => info!(monitor = %self.kind, "Worker stopped"),
                Ok(Err(e)) => warn!(monitor = %self.kind, error = %e, "Worker task ended abnormally"),
                Err(_) => warn!(
                    monitor = %self.kind,
                    timeout_secs = self.stop_timeout.as_secs_f64(),
                    "Worker did not exit in time; it will stop at its next check point"
                ),
            }
        }

        self.inner.lock().state = WorkerState::Idle;
        Ok(())
    }
}

async fn run_loop<F, Fut>(
    kind: MonitorKind,
    poll_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    mut cycle: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let mut count: u64 = 0;

    loop {
        if *stop_rx.borrow() {
            break;
        }

        count += 1;
        let started = Instant::now();
        match AssertUnwindSafe(cycle()).catch_unwind().await {
            Ok(Ok(())) => debug!(
                monitor = %kind,
                cycle = count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Cycle complete"
            ),
            Ok(Err(e)) => error!(monitor = %kind, cycle = count, error = %e, "Cycle failed"),
            Err(_) => error!(monitor = %kind, cycle = count, "Cycle panicked"),
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    // owner dropped without stopping
                    break;
                }
            }
        }
    }

    info!(monitor = %kind, cycles = count, "Worker loop exited");
}
