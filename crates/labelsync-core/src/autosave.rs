//! Periodic autosave.
//!
//! Each tick snapshots the caller's editable state and saves it as an
//! autosave version. A tick that finds a save, sync or restore already in
//! flight is skipped, not queued. Stopping the scheduler ends the timer
//! before its next firing; a save already on the wire is allowed to finish
//! and the session epoch decides whether its result still applies.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::Error;
use crate::models::{TemplatePayload, Version};
use crate::store::VersionStore;

/// Supplies the editable state to snapshot on each autosave tick.
///
/// Returning `None` means there is nothing to save this tick.
pub trait SnapshotSource: Send + Sync + 'static {
    fn snapshot(&self) -> Option<TemplatePayload>;
}

impl<F> SnapshotSource for F
where
    F: Fn() -> Option<TemplatePayload> + Send + Sync + 'static,
{
    fn snapshot(&self) -> Option<TemplatePayload> {
        self()
    }
}

/// What a single autosave tick did.
#[derive(Debug)]
pub enum AutosaveOutcome {
    Saved(Version),
    /// Another operation held the gate
    Skipped,
    /// The snapshot source had nothing to save
    NothingToSave,
    Failed(Error),
}

pub struct AutosaveScheduler {
    store: Arc<VersionStore>,
    source: Arc<dyn SnapshotSource>,
    interval: Option<Duration>,
    running: Option<RunningTimer>,
}

struct RunningTimer {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AutosaveScheduler {
    pub fn new(store: Arc<VersionStore>, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            store,
            source,
            interval: None,
            running: None,
        }
    }

    pub const fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    /// Reconfigure the cadence. `None` (or a zero interval) tears the timer down.
    pub fn set_interval(&mut self, interval: Option<Duration>) {
        self.stop();
        let Some(period) = interval.filter(|period| !period.is_zero()) else {
            return;
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_timer(
            Arc::clone(&self.store),
            Arc::clone(&self.source),
            period,
            shutdown_rx,
        ));
        tracing::debug!(
            template_id = %self.store.template_id(),
            "Autosave scheduled every {:?}",
            period
        );
        self.interval = Some(period);
        self.running = Some(RunningTimer { shutdown, handle });
    }

    /// Stop the timer; no tick fires after this returns.
    pub fn stop(&mut self) {
        self.interval = None;
        if let Some(timer) = self.running.take() {
            timer.shutdown.send_replace(true);
            tracing::debug!(template_id = %self.store.template_id(), "Autosave stopped");
        }
    }

    /// Run one autosave attempt immediately.
    pub async fn autosave_now(&self) -> AutosaveOutcome {
        autosave_tick(&self.store, self.source.as_ref()).await
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_timer(
    store: Arc<VersionStore>,
    source: Arc<dyn SnapshotSource>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        tracing::debug!(template_id = %store.template_id(), "Autosave tick");
        autosave_tick(&store, source.as_ref()).await;
    }
}

async fn autosave_tick(store: &VersionStore, source: &dyn SnapshotSource) -> AutosaveOutcome {
    let Some(payload) = source.snapshot() else {
        return AutosaveOutcome::NothingToSave;
    };

    match store.try_autosave(&payload).await {
        None => {
            tracing::debug!(
                template_id = %store.template_id(),
                "Skipping autosave: another operation is in flight"
            );
            AutosaveOutcome::Skipped
        }
        Some(Ok(version)) => AutosaveOutcome::Saved(version),
        Some(Err(error)) => {
            tracing::warn!(
                template_id = %store.template_id(),
                "Autosave failed, will retry on next tick: {}",
                error
            );
            AutosaveOutcome::Failed(error)
        }
    }
}
