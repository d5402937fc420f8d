//! In-memory stand-in for the template service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labelsync_core::api::{SaveVersionRequest, SyncRequest, SyncResponse};
use labelsync_core::conflict::is_behind;
use labelsync_core::models::NewChangeNotification;
use labelsync_core::{
    ChangeNotification, ChangeType, ClientConfig, Error, RemoteSyncStatus, Result, TemplateApi,
    TemplateId, TemplatePayload, Version,
};
use serde_json::json;
use tokio::sync::{oneshot, RwLock, RwLockWriteGuard};

pub const TEMPLATE: &str = "shipping-label";
pub const USER: &str = "user-1";
pub const DEVICE: &str = "device-local";

pub fn config() -> ClientConfig {
    ClientConfig::new("http://127.0.0.1:9", USER)
        .with_device_id(DEVICE)
        .without_polling()
}

pub fn payload(marker: &str) -> TemplatePayload {
    TemplatePayload::new(
        json!([{ "id": "title", "text": marker }]),
        json!({ "widthMm": 100, "heightMm": 50 }),
    )
}

pub fn remote_change(version_number: u64, device_id: &str) -> ChangeNotification {
    ChangeNotification {
        version_number,
        change_type: ChangeType::ElementUpdated,
        affected_element_id: Some("title".to_string()),
        affected_element_name: Some("Title".to_string()),
        old_value: Some(json!("old")),
        new_value: Some(json!("new")),
        user_id: "user-2".to_string(),
        user_name: Some("Second User".to_string()),
        device_id: device_id.to_string(),
        created_at: Utc::now(),
    }
}

/// Spin the scheduler until `condition` holds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition was not reached");
}

#[derive(Default)]
struct FakeState {
    versions: HashMap<TemplateId, Vec<Version>>,
    changes: Vec<ChangeNotification>,
    notifications: Vec<NewChangeNotification>,
    statuses: HashMap<(String, String), RemoteSyncStatus>,
}

#[derive(Default)]
pub struct FakeTemplateApi {
    state: Mutex<FakeState>,
    save_hold: RwLock<()>,
    sync_hold: RwLock<()>,
    restore_hold: RwLock<()>,
    next_load_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub save_calls: AtomicUsize,
    pub restore_calls: AtomicUsize,
    pub load_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub notify_calls: AtomicUsize,
    pub fail_saves: AtomicBool,
    pub fail_loads: AtomicBool,
    pub fail_syncs: AtomicBool,
    pub fail_polls: AtomicBool,
    pub fail_notify: AtomicBool,
    pub fail_sync_state: AtomicBool,
}

impl FakeTemplateApi {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Keep every save waiting until the returned guard is dropped.
    pub async fn hold_saves(&self) -> RwLockWriteGuard<'_, ()> {
        self.save_hold.write().await
    }

    pub async fn hold_syncs(&self) -> RwLockWriteGuard<'_, ()> {
        self.sync_hold.write().await
    }

    pub async fn hold_restores(&self) -> RwLockWriteGuard<'_, ()> {
        self.restore_hold.write().await
    }

    /// Delay the next version listing until the returned sender fires.
    ///
    /// The listing is taken when the call arrives, so a held response carries
    /// the history as it was at that moment.
    pub fn hold_next_load(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.next_load_gate.lock().unwrap() = Some(gate);
        release
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    /// Append `count` versions as if other sessions had saved them.
    pub fn seed_versions(&self, template_id: &str, count: u64) {
        for index in 0..count {
            let request = SaveVersionRequest {
                name: format!("Seed {index}"),
                description: None,
                elements: json!([{ "seed": index }]),
                settings: json!({}),
                created_by: "seeder".to_string(),
                is_autosave: false,
                change_summary: "User save".to_string(),
            };
            self.append(&TemplateId::new(template_id), &request);
        }
    }

    pub fn all_versions(&self, template_id: &str) -> Vec<Version> {
        self.state
            .lock()
            .unwrap()
            .versions
            .get(&TemplateId::new(template_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn push_change(&self, change: ChangeNotification) {
        self.state.lock().unwrap().changes.push(change);
    }

    pub fn notifications(&self) -> Vec<NewChangeNotification> {
        self.state.lock().unwrap().notifications.clone()
    }

    fn append(&self, template_id: &TemplateId, request: &SaveVersionRequest) -> Version {
        let mut state = self.state.lock().unwrap();
        let history = state.versions.entry(template_id.clone()).or_default();
        let version = Version {
            version_number: history.last().map_or(1, |last| last.version_number + 1),
            name: request.name.clone(),
            created_at: Utc::now(),
            created_by: request.created_by.clone(),
            change_summary: Some(request.change_summary.clone()),
            is_autosave: request.is_autosave,
            payload: TemplatePayload::new(request.elements.clone(), request.settings.clone()),
        };
        history.push(version.clone());
        version
    }

    fn latest(&self, template_id: &TemplateId) -> u64 {
        self.state
            .lock()
            .unwrap()
            .versions
            .get(template_id)
            .and_then(|history| history.last())
            .map_or(0, |version| version.version_number)
    }
}

fn offline() -> Error {
    Error::Transport("service unavailable".to_string())
}

#[async_trait]
impl TemplateApi for FakeTemplateApi {
    async fn get_template_versions(
        &self,
        template_id: &TemplateId,
        limit: usize,
    ) -> Result<Vec<Version>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(offline());
        }
        let listing: Vec<Version> = self
            .state
            .lock()
            .unwrap()
            .versions
            .get(template_id)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        let gate = self.next_load_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(listing)
    }

    async fn save_template_version(
        &self,
        template_id: &TemplateId,
        request: &SaveVersionRequest,
    ) -> Result<Version> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let _hold = self.save_hold.read().await;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(self.append(template_id, request))
    }

    async fn restore_template_version(
        &self,
        template_id: &TemplateId,
        version_number: u64,
        user_id: &str,
    ) -> Result<Version> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        let _hold = self.restore_hold.read().await;
        let source = self
            .all_versions(template_id.as_str())
            .into_iter()
            .find(|version| version.version_number == version_number)
            .ok_or_else(|| Error::NotFound(format!("Version {version_number}")))?;
        let request = SaveVersionRequest {
            name: format!("Restored from version {version_number}"),
            description: None,
            elements: source.payload.elements,
            settings: source.payload.settings,
            created_by: user_id.to_string(),
            is_autosave: false,
            change_summary: format!("Restored from version {version_number}"),
        };
        Ok(self.append(template_id, &request))
    }

    async fn sync_template(
        &self,
        template_id: &TemplateId,
        request: &SyncRequest,
    ) -> Result<SyncResponse> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        let _hold = self.sync_hold.read().await;
        if self.fail_syncs.load(Ordering::SeqCst) {
            return Err(offline());
        }
        let authoritative = self.latest(template_id);
        let conflict_detected = is_behind(request.current_version, authoritative);
        let now = Utc::now();
        if !conflict_detected {
            self.state.lock().unwrap().statuses.insert(
                (request.user_id.clone(), request.device_id.clone()),
                RemoteSyncStatus {
                    template_id: template_id.clone(),
                    user_id: request.user_id.clone(),
                    device_id: request.device_id.clone(),
                    last_synced_version: authoritative,
                    last_synced_at: now,
                },
            );
        }
        Ok(SyncResponse {
            conflict_detected,
            server_version: Some(authoritative),
            synced_at: Some(now),
            elements: None,
            settings: None,
        })
    }

    async fn get_sync_state(
        &self,
        _template_id: &TemplateId,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<RemoteSyncStatus>> {
        if self.fail_sync_state.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .statuses
            .get(&(user_id.to_string(), device_id.to_string()))
            .cloned())
    }

    async fn get_latest_changes(
        &self,
        _template_id: &TemplateId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangeNotification>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_polls.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .changes
            .iter()
            .filter(|change| since.is_none_or(|since| change.created_at > since))
            .cloned()
            .collect())
    }

    async fn notify_change(
        &self,
        _template_id: &TemplateId,
        change: &NewChangeNotification,
    ) -> Result<()> {
        self.notify_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_notify.load(Ordering::SeqCst) {
            return Err(offline());
        }
        self.state.lock().unwrap().notifications.push(change.clone());
        Ok(())
    }
}
