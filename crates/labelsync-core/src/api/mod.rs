//! Client seam to the remote template service.
//!
//! [`TemplateApi`] has one method per collaborator operation. The HTTP
//! implementation lives in [`http`]; tests substitute in-memory fakes.

mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    ChangeNotification, NewChangeNotification, RemoteSyncStatus, TemplateId, Version,
    VersionNumber,
};

pub use http::HttpTemplateClient;

/// Body of `saveTemplateVersion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveVersionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub elements: Value,
    pub settings: Value,
    pub created_by: String,
    pub is_autosave: bool,
    pub change_summary: String,
}

/// Body of `restoreTemplateVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreVersionRequest {
    pub user_id: String,
}

/// Body of `syncTemplate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub user_id: String,
    pub device_id: String,
    pub elements: Value,
    pub settings: Value,
    /// The version the session believes is current
    pub current_version: VersionNumber,
}

/// Response of `syncTemplate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub conflict_detected: bool,
    /// Authoritative version at sync time
    #[serde(default)]
    pub server_version: Option<VersionNumber>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    /// Authoritative elements, sent back when a conflict is reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionList {
    pub versions: Vec<Version>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeFeed {
    pub changes: Vec<ChangeNotification>,
}

/// Remote operations the sync engine depends on.
#[async_trait]
pub trait TemplateApi: Send + Sync {
    /// Most recent versions first, at most `limit`.
    async fn get_template_versions(
        &self,
        template_id: &TemplateId,
        limit: usize,
    ) -> Result<Vec<Version>>;

    async fn save_template_version(
        &self,
        template_id: &TemplateId,
        request: &SaveVersionRequest,
    ) -> Result<Version>;

    /// Fails with `Error::NotFound` when the version does not exist.
    async fn restore_template_version(
        &self,
        template_id: &TemplateId,
        version_number: VersionNumber,
        user_id: &str,
    ) -> Result<Version>;

    async fn sync_template(
        &self,
        template_id: &TemplateId,
        request: &SyncRequest,
    ) -> Result<SyncResponse>;

    /// `Ok(None)` when the server has no record for the session.
    async fn get_sync_state(
        &self,
        template_id: &TemplateId,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<RemoteSyncStatus>>;

    /// Notifications the feed still holds, oldest first. With `since`, only
    /// those created strictly after it.
    async fn get_latest_changes(
        &self,
        template_id: &TemplateId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangeNotification>>;

    async fn notify_change(
        &self,
        template_id: &TemplateId,
        change: &NewChangeNotification,
    ) -> Result<()>;
}
