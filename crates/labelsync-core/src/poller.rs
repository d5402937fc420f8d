//! Change-feed polling.
//!
//! The poller asks the service for recent change notifications on a fixed
//! cadence and hands each non-empty batch of remote changes to subscribers.
//! It never touches document content. The only thing carried between cycles
//! is a cursor, the newest `created_at` seen so far, so each poll asks for
//! what arrived since the last successful one. A failed cycle is logged and
//! the next one runs as scheduled.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::api::TemplateApi;
use crate::device::DeviceId;
use crate::models::{ChangeNotification, TemplateId};

const BATCH_CHANNEL_CAPACITY: usize = 16;

pub type ChangeBatch = Vec<ChangeNotification>;

/// Newest notification timestamp seen by any cycle.
#[derive(Clone, Default)]
struct FeedCursor(Arc<Mutex<Option<DateTime<Utc>>>>);

impl FeedCursor {
    fn get(&self) -> Option<DateTime<Utc>> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, changes: &[ChangeNotification]) {
        let Some(newest) = changes.iter().map(|change| change.created_at).max() else {
            return;
        };
        let mut cursor = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if cursor.is_none_or(|seen| newest > seen) {
            *cursor = Some(newest);
        }
    }
}

pub struct ChangePoller {
    api: Arc<dyn TemplateApi>,
    template_id: TemplateId,
    device_id: DeviceId,
    cursor: FeedCursor,
    batches: broadcast::Sender<ChangeBatch>,
    interval: Option<Duration>,
    task: Option<JoinHandle<()>>,
}

impl ChangePoller {
    pub fn new(api: Arc<dyn TemplateApi>, template_id: TemplateId, device_id: DeviceId) -> Self {
        let (batches, _) = broadcast::channel(BATCH_CHANNEL_CAPACITY);
        Self {
            api,
            template_id,
            device_id,
            cursor: FeedCursor::default(),
            batches,
            interval: None,
            task: None,
        }
    }

    /// Receive every batch of remote changes delivered after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeBatch> {
        self.batches.subscribe()
    }

    pub const fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Reconfigure the cadence. `None` (or a zero interval) disables polling.
    pub fn set_interval(&mut self, interval: Option<Duration>) {
        self.stop();
        let Some(period) = interval.filter(|period| !period.is_zero()) else {
            return;
        };

        self.task = Some(tokio::spawn(run_polls(
            Arc::clone(&self.api),
            self.template_id.clone(),
            self.device_id.clone(),
            self.cursor.clone(),
            self.batches.clone(),
            period,
        )));
        self.interval = Some(period);
        tracing::debug!(
            template_id = %self.template_id,
            "Polling for changes every {:?}",
            period
        );
    }

    /// Tear the timer down together with any cycle still awaiting a response.
    pub fn stop(&mut self) {
        self.interval = None;
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(template_id = %self.template_id, "Change polling stopped");
        }
    }

    /// Run one poll cycle now and return the remote changes it found.
    ///
    /// Errors are logged and yield an empty list.
    pub async fn poll_once(&self) -> ChangeBatch {
        fetch_remote_changes(
            self.api.as_ref(),
            &self.template_id,
            &self.device_id,
            &self.cursor,
        )
        .await
    }
}

impl Drop for ChangePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_polls(
    api: Arc<dyn TemplateApi>,
    template_id: TemplateId,
    device_id: DeviceId,
    cursor: FeedCursor,
    batches: broadcast::Sender<ChangeBatch>,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Owned by this task: aborting the task aborts every cycle in it.
    let mut cycles = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            Some(_) = cycles.join_next(), if !cycles.is_empty() => continue,
        }

        let api = Arc::clone(&api);
        let template_id = template_id.clone();
        let device_id = device_id.clone();
        let cursor = cursor.clone();
        let batches = batches.clone();
        cycles.spawn(async move {
            let changes =
                fetch_remote_changes(api.as_ref(), &template_id, &device_id, &cursor).await;
            if changes.is_empty() {
                return;
            }
            tracing::debug!(
                template_id = %template_id,
                count = changes.len(),
                "Received remote changes"
            );
            // No subscribers is fine: nothing is queued between polls.
            let _ = batches.send(changes);
        });
    }
}

async fn fetch_remote_changes(
    api: &dyn TemplateApi,
    template_id: &TemplateId,
    device_id: &DeviceId,
    cursor: &FeedCursor,
) -> ChangeBatch {
    match api.get_latest_changes(template_id, cursor.get()).await {
        Ok(changes) => {
            cursor.advance(&changes);
            changes
                .into_iter()
                .filter(|change| !change.is_from(device_id))
                .collect()
        }
        Err(error) => {
            tracing::warn!(
                template_id = %template_id,
                "Change poll failed: {}",
                error
            );
            Vec::new()
        }
    }
}
