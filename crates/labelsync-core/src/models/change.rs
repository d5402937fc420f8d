//! Change notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::VersionNumber;
use crate::device::DeviceId;

/// Kind of edit a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    ElementAdded,
    ElementUpdated,
    ElementRemoved,
    ElementMoved,
    SettingsUpdated,
    VersionSaved,
    VersionRestored,
}

/// One remote edit event, as delivered by the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub version_number: VersionNumber,
    pub change_type: ChangeType,
    #[serde(default)]
    pub affected_element_id: Option<String>,
    #[serde(default)]
    pub affected_element_name: Option<String>,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub device_id: String,
    /// Server timestamp
    pub created_at: DateTime<Utc>,
}

impl ChangeNotification {
    /// Whether the notification was produced by the given device.
    pub fn is_from(&self, device_id: &DeviceId) -> bool {
        self.device_id == device_id.as_str()
    }
}

/// Payload pushed by `notifyChange`; the server stamps version and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChangeNotification {
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_element_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub device_id: String,
}
