//! Server-side sync status record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TemplateId, VersionNumber};

/// The server's view of one (template, user, device) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSyncStatus {
    pub template_id: TemplateId,
    pub user_id: String,
    pub device_id: String,
    /// Authoritative version the device last synced against
    pub last_synced_version: VersionNumber,
    pub last_synced_at: DateTime<Utc>,
}
