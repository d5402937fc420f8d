//! Version model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TemplatePayload;

/// Server-assigned, per-template version number.
pub type VersionNumber = u64;

/// `change_summary` attached to automatic saves.
pub const AUTOSAVE_SUMMARY: &str = "Auto-save";
/// `change_summary` attached to user-initiated saves.
pub const USER_SAVE_SUMMARY: &str = "User save";

/// Immutable snapshot of a template at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    /// Strictly increasing per template, assigned by the server
    pub version_number: VersionNumber,
    /// Display label
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// User that created the snapshot
    pub created_by: String,
    #[serde(default)]
    pub change_summary: Option<String>,
    #[serde(default)]
    pub is_autosave: bool,
    /// Snapshot content
    #[serde(flatten)]
    pub payload: TemplatePayload,
}

impl Version {
    /// The summary a save of the given kind is stamped with.
    pub const fn summary_for(is_autosave: bool) -> &'static str {
        if is_autosave {
            AUTOSAVE_SUMMARY
        } else {
            USER_SAVE_SUMMARY
        }
    }
}

/// Timestamped label used when a save is requested without a name.
pub fn default_version_name(is_autosave: bool, now: DateTime<Utc>) -> String {
    let prefix = if is_autosave { "Auto-save" } else { "Version" };
    format!("{prefix} {}", now.format("%Y-%m-%d %H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn default_name_contains_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(default_version_name(true, now), "Auto-save 2024-03-09 14:05:07");
        assert_eq!(default_version_name(false, now), "Version 2024-03-09 14:05:07");
    }

    #[test]
    fn summary_distinguishes_autosave() {
        assert_eq!(Version::summary_for(true), "Auto-save");
        assert_eq!(Version::summary_for(false), "User save");
    }

    #[test]
    fn version_reads_camel_case_wire_format() {
        let version: Version = serde_json::from_value(json!({
            "versionNumber": 3,
            "name": "Before reprint",
            "createdAt": "2024-03-09T14:05:07Z",
            "createdBy": "user-1",
            "changeSummary": "User save",
            "isAutosave": false,
            "elements": [{ "id": "barcode" }],
            "settings": { "width": 100 }
        }))
        .unwrap();

        assert_eq!(version.version_number, 3);
        assert_eq!(version.change_summary.as_deref(), Some("User save"));
        assert_eq!(version.payload.elements, json!([{ "id": "barcode" }]));
        assert_eq!(version.payload.settings, json!({ "width": 100 }));
    }
}
