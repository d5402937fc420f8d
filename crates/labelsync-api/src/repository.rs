//! In-memory template store backing the HTTP routes.
//!
//! History is append-only: saves and restores push a new version with the
//! next number and nothing is ever rewritten or removed.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use labelsync_core::api::{SaveVersionRequest, SyncRequest, SyncResponse};
use labelsync_core::conflict::is_behind;
use labelsync_core::models::{NewChangeNotification, VersionNumber};
use labelsync_core::{
    ChangeNotification, ChangeType, RemoteSyncStatus, TemplateId, TemplatePayload, Version,
};
use tokio::sync::Mutex;

use crate::error::AppError;

pub struct TemplateRepository {
    templates: Mutex<HashMap<TemplateId, TemplateRecord>>,
    change_retention: chrono::Duration,
}

#[derive(Default)]
struct TemplateRecord {
    versions: Vec<Version>,
    /// Last state pushed by a non-conflicting sync
    working_copy: Option<TemplatePayload>,
    statuses: HashMap<(String, String), RemoteSyncStatus>,
    changes: VecDeque<ChangeNotification>,
}

impl TemplateRecord {
    fn latest_number(&self) -> VersionNumber {
        self.versions
            .last()
            .map_or(0, |version| version.version_number)
    }

    fn authoritative_payload(&self) -> Option<TemplatePayload> {
        self.working_copy
            .clone()
            .or_else(|| self.versions.last().map(|version| version.payload.clone()))
    }

    fn append(&mut self, version: Version) -> Version {
        self.working_copy = Some(version.payload.clone());
        self.versions.push(version.clone());
        version
    }

    /// Append to the feed, dropping entries that fell out of the window.
    ///
    /// Feed timestamps are kept strictly increasing so `since` cursors never
    /// skip an entry that shares a timestamp with the last one a reader saw.
    fn push_change(
        &mut self,
        mut change: ChangeNotification,
        retention: chrono::Duration,
    ) -> ChangeNotification {
        self.prune_changes(change.created_at - retention);
        if let Some(last) = self.changes.back() {
            if change.created_at <= last.created_at {
                change.created_at = last.created_at + chrono::Duration::nanoseconds(1);
            }
        }
        self.changes.push_back(change.clone());
        change
    }

    fn prune_changes(&mut self, cutoff: DateTime<Utc>) {
        while self
            .changes
            .front()
            .is_some_and(|change| change.created_at < cutoff)
        {
            self.changes.pop_front();
        }
    }
}

impl TemplateRepository {
    pub fn new(change_retention: Duration) -> Self {
        Self {
            templates: Mutex::new(HashMap::new()),
            change_retention: chrono::Duration::from_std(change_retention)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
        }
    }

    /// Most recent first, at most `limit`.
    pub async fn list_versions(&self, template_id: &TemplateId, limit: usize) -> Vec<Version> {
        let guard = self.templates.lock().await;
        guard
            .get(template_id)
            .map(|record| record.versions.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn save_version(
        &self,
        template_id: &TemplateId,
        request: SaveVersionRequest,
    ) -> Result<Version, AppError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::bad_request("version name must not be empty"));
        }
        if request.created_by.trim().is_empty() {
            return Err(AppError::bad_request("createdBy must not be empty"));
        }

        let now = Utc::now();
        let mut guard = self.templates.lock().await;
        let record = guard.entry(template_id.clone()).or_default();
        let version = record.append(Version {
            version_number: record.latest_number() + 1,
            name: name.to_string(),
            created_at: now,
            created_by: request.created_by.clone(),
            change_summary: Some(request.change_summary),
            is_autosave: request.is_autosave,
            payload: TemplatePayload::new(request.elements, request.settings),
        });
        record.push_change(
            ChangeNotification {
                version_number: version.version_number,
                change_type: ChangeType::VersionSaved,
                affected_element_id: None,
                affected_element_name: Some(version.name.clone()),
                old_value: None,
                new_value: None,
                user_id: request.created_by,
                user_name: None,
                device_id: String::new(),
                created_at: now,
            },
            self.change_retention,
        );
        Ok(version)
    }

    /// Append a copy of `version_number` as the new current version.
    pub async fn restore_version(
        &self,
        template_id: &TemplateId,
        version_number: VersionNumber,
        user_id: &str,
    ) -> Result<Version, AppError> {
        if user_id.trim().is_empty() {
            return Err(AppError::bad_request("userId must not be empty"));
        }

        let now = Utc::now();
        let mut guard = self.templates.lock().await;
        let record = guard
            .get_mut(template_id)
            .ok_or_else(|| AppError::not_found(format!("template {template_id}")))?;
        let source = record
            .versions
            .iter()
            .find(|version| version.version_number == version_number)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("version {version_number}")))?;

        let label = format!("Restored from version {version_number}");
        let version = record.append(Version {
            version_number: record.latest_number() + 1,
            name: label.clone(),
            created_at: now,
            created_by: user_id.to_string(),
            change_summary: Some(label),
            is_autosave: false,
            payload: source.payload,
        });
        record.push_change(
            ChangeNotification {
                version_number: version.version_number,
                change_type: ChangeType::VersionRestored,
                affected_element_id: None,
                affected_element_name: Some(version.name.clone()),
                old_value: Some(version_number.into()),
                new_value: Some(version.version_number.into()),
                user_id: user_id.to_string(),
                user_name: None,
                device_id: String::new(),
                created_at: now,
            },
            self.change_retention,
        );
        Ok(version)
    }

    /// Compare the declared version with the authoritative one.
    ///
    /// A session that is behind gets the conflict flag and the authoritative
    /// content; otherwise its state becomes the working copy and its sync
    /// status is recorded.
    pub async fn sync(&self, template_id: &TemplateId, request: SyncRequest) -> SyncResponse {
        let now = Utc::now();
        let mut guard = self.templates.lock().await;
        let record = guard.entry(template_id.clone()).or_default();
        let authoritative = record.latest_number();

        if is_behind(request.current_version, authoritative) {
            let payload = record.authoritative_payload();
            return SyncResponse {
                conflict_detected: true,
                server_version: Some(authoritative),
                synced_at: Some(now),
                elements: payload.as_ref().map(|payload| payload.elements.clone()),
                settings: payload.map(|payload| payload.settings),
            };
        }

        record.working_copy = Some(TemplatePayload::new(request.elements, request.settings));
        record.statuses.insert(
            (request.user_id.clone(), request.device_id.clone()),
            RemoteSyncStatus {
                template_id: template_id.clone(),
                user_id: request.user_id,
                device_id: request.device_id,
                last_synced_version: authoritative,
                last_synced_at: now,
            },
        );
        SyncResponse {
            conflict_detected: false,
            server_version: Some(authoritative),
            synced_at: Some(now),
            elements: None,
            settings: None,
        }
    }

    pub async fn sync_status(
        &self,
        template_id: &TemplateId,
        user_id: &str,
        device_id: &str,
    ) -> Option<RemoteSyncStatus> {
        let guard = self.templates.lock().await;
        guard
            .get(template_id)?
            .statuses
            .get(&(user_id.to_string(), device_id.to_string()))
            .cloned()
    }

    /// Notifications still inside the retention window, oldest first. With
    /// `since`, only those created strictly after it.
    pub async fn latest_changes(
        &self,
        template_id: &TemplateId,
        since: Option<DateTime<Utc>>,
    ) -> Vec<ChangeNotification> {
        let cutoff = Utc::now() - self.change_retention;
        let mut guard = self.templates.lock().await;
        let Some(record) = guard.get_mut(template_id) else {
            return Vec::new();
        };
        record.prune_changes(cutoff);
        record
            .changes
            .iter()
            .filter(|change| since.is_none_or(|since| change.created_at > since))
            .cloned()
            .collect()
    }

    pub async fn record_change(
        &self,
        template_id: &TemplateId,
        change: NewChangeNotification,
    ) -> Result<ChangeNotification, AppError> {
        if change.user_id.trim().is_empty() || change.device_id.trim().is_empty() {
            return Err(AppError::bad_request(
                "userId and deviceId must not be empty",
            ));
        }

        let mut guard = self.templates.lock().await;
        let record = guard.entry(template_id.clone()).or_default();
        let notification = ChangeNotification {
            version_number: record.latest_number(),
            change_type: change.change_type,
            affected_element_id: change.affected_element_id,
            affected_element_name: change.affected_element_name,
            old_value: change.old_value,
            new_value: change.new_value,
            user_id: change.user_id,
            user_name: change.user_name,
            device_id: change.device_id,
            created_at: Utc::now(),
        };
        Ok(record.push_change(notification, self.change_retention))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn save_request(marker: &str) -> SaveVersionRequest {
        SaveVersionRequest {
            name: format!("Draft {marker}"),
            description: None,
            elements: json!([{ "text": marker }]),
            settings: json!({ "dpi": 300 }),
            created_by: "user-1".to_string(),
            is_autosave: false,
            change_summary: "User save".to_string(),
        }
    }

    fn sync_request(current_version: u64) -> SyncRequest {
        SyncRequest {
            user_id: "user-1".to_string(),
            device_id: "device-a".to_string(),
            elements: json!([{ "text": "local" }]),
            settings: json!({}),
            current_version,
        }
    }

    #[tokio::test]
    async fn versions_are_numbered_sequentially_per_template() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let a = TemplateId::new("a");
        let b = TemplateId::new("b");

        for marker in ["1", "2", "3"] {
            repo.save_version(&a, save_request(marker)).await.unwrap();
        }
        let first_b = repo.save_version(&b, save_request("x")).await.unwrap();

        let numbers: Vec<u64> = repo
            .list_versions(&a, 10)
            .await
            .iter()
            .map(|version| version.version_number)
            .collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(first_b.version_number, 1);
        assert_eq!(repo.list_versions(&a, 2).await.len(), 2);
    }

    #[tokio::test]
    async fn save_rejects_blank_name() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let mut request = save_request("x");
        request.name = "  ".to_string();
        let err = repo
            .save_version(&TemplateId::new("a"), request)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn restore_appends_copy() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let id = TemplateId::new("a");
        let original = repo.save_version(&id, save_request("one")).await.unwrap();
        repo.save_version(&id, save_request("two")).await.unwrap();

        let restored = repo.restore_version(&id, 1, "user-2").await.unwrap();

        assert_eq!(restored.version_number, 3);
        assert_eq!(restored.payload, original.payload);
        assert_eq!(restored.name, "Restored from version 1");
        assert_eq!(restored.created_by, "user-2");
        let history = repo.list_versions(&id, 10).await;
        assert_eq!(history.last().unwrap(), &original);
    }

    #[tokio::test]
    async fn restore_missing_version_is_not_found() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let id = TemplateId::new("a");
        assert!(matches!(
            repo.restore_version(&id, 1, "user-1").await,
            Err(AppError::NotFound(_))
        ));

        repo.save_version(&id, save_request("one")).await.unwrap();
        assert!(matches!(
            repo.restore_version(&id, 7, "user-1").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sync_flags_sessions_behind_authoritative_version() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let id = TemplateId::new("a");
        for marker in ["1", "2", "3", "4", "5"] {
            repo.save_version(&id, save_request(marker)).await.unwrap();
        }

        let stale = repo.sync(&id, sync_request(3)).await;
        assert!(stale.conflict_detected);
        assert_eq!(stale.server_version, Some(5));
        assert_eq!(stale.elements, Some(json!([{ "text": "5" }])));
        assert_eq!(repo.sync_status(&id, "user-1", "device-a").await, None);

        let current = repo.sync(&id, sync_request(5)).await;
        assert!(!current.conflict_detected);
        let status = repo.sync_status(&id, "user-1", "device-a").await.unwrap();
        assert_eq!(status.last_synced_version, 5);
    }

    #[tokio::test]
    async fn sync_on_empty_template_is_clear() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let response = repo.sync(&TemplateId::new("new"), sync_request(0)).await;
        assert!(!response.conflict_detected);
        assert_eq!(response.server_version, Some(0));
    }

    #[tokio::test]
    async fn change_feed_records_saves_and_notifications() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let id = TemplateId::new("a");
        repo.save_version(&id, save_request("one")).await.unwrap();
        repo.record_change(
            &id,
            NewChangeNotification {
                change_type: ChangeType::ElementAdded,
                affected_element_id: Some("qr".to_string()),
                affected_element_name: Some("QR code".to_string()),
                old_value: None,
                new_value: Some(json!({ "x": 4 })),
                user_id: "user-2".to_string(),
                user_name: Some("Second".to_string()),
                device_id: "device-b".to_string(),
            },
        )
        .await
        .unwrap();

        let changes = repo.latest_changes(&id, None).await;
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].change_type, ChangeType::VersionSaved);
        assert_eq!(changes[1].change_type, ChangeType::ElementAdded);
        assert_eq!(changes[1].version_number, 1);
        assert!(repo.latest_changes(&TemplateId::new("other"), None).await.is_empty());
    }

    #[tokio::test]
    async fn change_feed_drops_entries_outside_retention() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let id = TemplateId::new("a");
        repo.save_version(&id, save_request("one")).await.unwrap();
        {
            let mut guard = repo.templates.lock().await;
            let record = guard.get_mut(&id).unwrap();
            record.changes[0].created_at = Utc::now() - chrono::Duration::seconds(60);
        }

        assert!(repo.latest_changes(&id, None).await.is_empty());
    }

    #[tokio::test]
    async fn writes_prune_expired_changes_without_a_reader() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let id = TemplateId::new("a");
        repo.save_version(&id, save_request("one")).await.unwrap();
        {
            let mut guard = repo.templates.lock().await;
            let record = guard.get_mut(&id).unwrap();
            record.changes[0].created_at = Utc::now() - chrono::Duration::seconds(60);
        }

        repo.save_version(&id, save_request("two")).await.unwrap();
        repo.restore_version(&id, 1, "user-1").await.unwrap();

        let guard = repo.templates.lock().await;
        let kinds: Vec<ChangeType> = guard[&id]
            .changes
            .iter()
            .map(|change| change.change_type)
            .collect();
        assert_eq!(kinds, vec![ChangeType::VersionSaved, ChangeType::VersionRestored]);
    }

    #[tokio::test]
    async fn since_cursor_returns_only_newer_changes() {
        let repo = TemplateRepository::new(Duration::from_secs(30));
        let id = TemplateId::new("a");
        for marker in ["1", "2", "3"] {
            repo.save_version(&id, save_request(marker)).await.unwrap();
        }

        let all = repo.latest_changes(&id, None).await;
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|pair| pair[0].created_at < pair[1].created_at));

        let newer = repo.latest_changes(&id, Some(all[0].created_at)).await;
        let numbers: Vec<u64> = newer.iter().map(|change| change.version_number).collect();
        assert_eq!(numbers, vec![2, 3]);
        assert!(repo
            .latest_changes(&id, Some(all[2].created_at))
            .await
            .is_empty());
    }
}
