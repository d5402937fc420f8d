//! One editing session on one template.
//!
//! `SyncSession` owns the device identity, the shared sync state and every
//! component that reads or writes it. Timers run between [`SyncSession::start`]
//! and [`SyncSession::stop`]; after `stop` the session is spent and late
//! completions of calls issued earlier no longer touch its state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::api::{HttpTemplateClient, TemplateApi};
use crate::autosave::{AutosaveOutcome, AutosaveScheduler, SnapshotSource};
use crate::config::ClientConfig;
use crate::coordinator::{ChangeDetails, SyncCoordinator, SyncOutcome};
use crate::device::DeviceId;
use crate::error::{Error, Result};
use crate::models::{
    ChangeType, RemoteSyncStatus, TemplateId, TemplatePayload, Version, VersionNumber,
};
use crate::poller::{ChangeBatch, ChangePoller};
use crate::state::{SharedSyncState, SyncState};
use crate::store::VersionStore;

pub struct SyncSession {
    config: ClientConfig,
    template_id: TemplateId,
    device_id: DeviceId,
    state: SharedSyncState,
    store: Arc<VersionStore>,
    coordinator: SyncCoordinator,
    autosave: AutosaveScheduler,
    poller: ChangePoller,
}

impl SyncSession {
    /// Open a session against the HTTP service named in `config`.
    pub fn connect(
        config: ClientConfig,
        template_id: impl Into<TemplateId>,
        source: Arc<dyn SnapshotSource>,
    ) -> Result<Self> {
        let api = Arc::new(HttpTemplateClient::from_config(&config)?);
        Self::with_api(config, api, template_id, source)
    }

    /// Open a session over any [`TemplateApi`] implementation.
    pub fn with_api(
        config: ClientConfig,
        api: Arc<dyn TemplateApi>,
        template_id: impl Into<TemplateId>,
        source: Arc<dyn SnapshotSource>,
    ) -> Result<Self> {
        config.validate()?;
        let template_id = template_id.into();
        if template_id.as_str().trim().is_empty() {
            return Err(Error::InvalidInput("template id must not be empty".to_string()));
        }

        let device_id = DeviceId::resolve(config.device_id.clone());
        let state = SharedSyncState::new();
        let store = Arc::new(VersionStore::new(
            Arc::clone(&api),
            template_id.clone(),
            config.user_id.clone(),
            config.version_limit,
            state.clone(),
        ));
        let coordinator = SyncCoordinator::new(
            Arc::clone(&api),
            template_id.clone(),
            config.user_id.clone(),
            config.user_name.clone(),
            device_id.clone(),
            state.clone(),
        );
        let autosave = AutosaveScheduler::new(Arc::clone(&store), source);
        let poller = ChangePoller::new(api, template_id.clone(), device_id.clone());

        tracing::info!(
            template_id = %template_id,
            device_id = %device_id,
            "Opened sync session"
        );
        Ok(Self {
            config,
            template_id,
            device_id,
            state,
            store,
            coordinator,
            autosave,
            poller,
        })
    }

    /// Start the configured background timers.
    pub fn start(&mut self) -> Result<()> {
        if self.state.is_closed() {
            return Err(Error::SessionClosed);
        }
        self.autosave.set_interval(self.config.autosave_interval);
        self.poller.set_interval(self.config.poll_interval);
        Ok(())
    }

    /// Tear down both timers and retire the sync state.
    pub fn stop(&mut self) {
        self.autosave.stop();
        self.poller.stop();
        if !self.state.is_closed() {
            self.state.close();
            tracing::info!(template_id = %self.template_id, "Closed sync session");
        }
    }

    pub const fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn sync_state(&self) -> SyncState {
        self.state.snapshot()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeBatch> {
        self.poller.subscribe()
    }

    pub fn versions(&self) -> Arc<Vec<Version>> {
        self.store.versions()
    }

    /// Version this session currently believes is authoritative.
    pub fn known_version(&self) -> VersionNumber {
        self.store.latest_version_number().unwrap_or(0)
    }

    pub fn is_autosave_running(&self) -> bool {
        self.autosave.is_running()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Record unpushed local edits.
    pub fn mark_dirty(&self) {
        self.state.mark_dirty();
    }

    pub fn clear_conflict(&self) {
        self.state.clear_conflict();
    }

    pub async fn load_versions(&self) -> Result<Arc<Vec<Version>>> {
        self.store.load_versions(self.config.version_limit).await
    }

    pub async fn save_version(
        &self,
        payload: &TemplatePayload,
        name: Option<String>,
    ) -> Result<Version> {
        self.store.save_version(payload, name, false).await
    }

    pub async fn restore_version(&self, version_number: VersionNumber) -> Result<Version> {
        self.store.restore_version(version_number).await
    }

    pub async fn sync_template(
        &self,
        payload: &TemplatePayload,
        current_version: VersionNumber,
    ) -> Result<SyncOutcome> {
        self.coordinator.sync_template(payload, current_version).await
    }

    /// Sync against the newest version in the loaded history.
    pub async fn sync_latest(&self, payload: &TemplatePayload) -> Result<SyncOutcome> {
        self.sync_template(payload, self.known_version()).await
    }

    pub async fn get_sync_state(&self) -> Option<RemoteSyncStatus> {
        self.coordinator.get_sync_state().await
    }

    pub fn notify_change(&self, change_type: ChangeType, details: ChangeDetails) -> JoinHandle<()> {
        self.coordinator.notify_change(change_type, details)
    }

    pub async fn autosave_now(&self) -> AutosaveOutcome {
        self.autosave.autosave_now().await
    }

    pub async fn poll_changes_now(&self) -> ChangeBatch {
        self.poller.poll_once().await
    }

    /// `None` disables autosave.
    pub fn set_autosave_interval(&mut self, interval: Option<Duration>) {
        self.config.autosave_interval = interval;
        if !self.state.is_closed() {
            self.autosave.set_interval(interval);
        }
    }

    /// `None` disables change polling.
    pub fn set_poll_interval(&mut self, interval: Option<Duration>) {
        self.config.poll_interval = interval;
        if !self.state.is_closed() {
            self.poller.set_interval(interval);
        }
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.stop();
    }
}
