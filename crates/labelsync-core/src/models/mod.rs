//! Data models for LabelSync

mod change;
mod sync_status;
mod template;
mod version;

pub use change::{ChangeNotification, ChangeType, NewChangeNotification};
pub use sync_status::RemoteSyncStatus;
pub use template::{TemplateId, TemplatePayload};
pub use version::{
    default_version_name, Version, VersionNumber, AUTOSAVE_SUMMARY, USER_SAVE_SUMMARY,
};
