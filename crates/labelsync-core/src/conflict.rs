//! Conflict decision rule.
//!
//! A conflict exists iff the server flags one in its sync response, which it
//! does when the session's declared version is older than the authoritative
//! one. No merge is attempted: the flag blocks silent overwrites and the user
//! is asked to review and save again.

use crate::api::SyncResponse;
use crate::models::VersionNumber;
use crate::state::SyncState;

/// Advisory text surfaced through `SyncState::conflict_message`.
pub const CONFLICT_MESSAGE: &str = "This template was changed by another user or device since \
you last synced. Review the latest version and save again to keep your changes.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStatus {
    Clear,
    Conflict,
}

impl ConflictStatus {
    pub const fn from_response(response: &SyncResponse) -> Self {
        if response.conflict_detected {
            Self::Conflict
        } else {
            Self::Clear
        }
    }

    pub const fn is_conflict(self) -> bool {
        matches!(self, Self::Conflict)
    }

    pub const fn message(self) -> Option<&'static str> {
        match self {
            Self::Clear => None,
            Self::Conflict => Some(CONFLICT_MESSAGE),
        }
    }

    /// Write the flag and message into the session state.
    pub fn apply(self, state: &mut SyncState) {
        state.has_conflict = self.is_conflict();
        state.conflict_message = self.message().map(str::to_string);
    }
}

/// Server-side comparison: the declared version is behind the authoritative one.
pub const fn is_behind(declared: VersionNumber, authoritative: VersionNumber) -> bool {
    declared < authoritative
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(conflict_detected: bool) -> SyncResponse {
        SyncResponse {
            conflict_detected,
            server_version: None,
            synced_at: None,
            elements: None,
            settings: None,
        }
    }

    #[test]
    fn flag_follows_server_response() {
        assert_eq!(
            ConflictStatus::from_response(&response(true)),
            ConflictStatus::Conflict
        );
        assert_eq!(
            ConflictStatus::from_response(&response(false)),
            ConflictStatus::Clear
        );
    }

    #[test]
    fn apply_sets_and_clears_message() {
        let mut state = SyncState::default();
        ConflictStatus::Conflict.apply(&mut state);
        assert!(state.has_conflict);
        assert_eq!(state.conflict_message.as_deref(), Some(CONFLICT_MESSAGE));

        ConflictStatus::Clear.apply(&mut state);
        assert!(!state.has_conflict);
        assert_eq!(state.conflict_message, None);
    }

    #[test]
    fn behind_only_when_declared_is_older() {
        assert!(is_behind(3, 5));
        assert!(!is_behind(3, 3));
        assert!(!is_behind(6, 5));
    }
}
