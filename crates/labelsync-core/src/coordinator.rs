//! Single round-trip reconciliation with the template service.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::api::{SyncRequest, SyncResponse, TemplateApi};
use crate::conflict::ConflictStatus;
use crate::device::DeviceId;
use crate::error::Result;
use crate::models::{
    ChangeType, NewChangeNotification, RemoteSyncStatus, TemplateId, TemplatePayload,
    VersionNumber,
};
use crate::state::SharedSyncState;

/// Result of a successful `sync_template` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub conflict: ConflictStatus,
    /// Authoritative version number reported by the server
    pub server_version: Option<VersionNumber>,
    /// Authoritative content, present when the server sent it back
    pub authoritative: Option<TemplatePayload>,
}

impl SyncOutcome {
    fn from_response(response: SyncResponse) -> Self {
        let conflict = ConflictStatus::from_response(&response);
        let authoritative = match (response.elements, response.settings) {
            (None, None) => None,
            (elements, settings) => Some(TemplatePayload::new(
                elements.unwrap_or_default(),
                settings.unwrap_or_default(),
            )),
        };
        Self {
            conflict,
            server_version: response.server_version,
            authoritative,
        }
    }

    pub const fn has_conflict(&self) -> bool {
        self.conflict.is_conflict()
    }
}

/// Optional detail attached to a change notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeDetails {
    pub affected_element_id: Option<String>,
    pub affected_element_name: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl ChangeDetails {
    pub fn element(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            affected_element_id: Some(id.into()),
            affected_element_name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_values(mut self, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }
}

pub struct SyncCoordinator {
    api: Arc<dyn TemplateApi>,
    template_id: TemplateId,
    user_id: String,
    user_name: Option<String>,
    device_id: DeviceId,
    state: SharedSyncState,
}

impl SyncCoordinator {
    pub fn new(
        api: Arc<dyn TemplateApi>,
        template_id: TemplateId,
        user_id: impl Into<String>,
        user_name: Option<String>,
        device_id: DeviceId,
        state: SharedSyncState,
    ) -> Self {
        Self {
            api,
            template_id,
            user_id: user_id.into(),
            user_name,
            device_id,
            state,
        }
    }

    pub const fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Push local state along with the version this session believes is
    /// current, and record the server's conflict verdict.
    ///
    /// On failure `sync_error` is set, the conflict flag is left as it was,
    /// and the error is returned.
    pub async fn sync_template(
        &self,
        payload: &TemplatePayload,
        current_version: VersionNumber,
    ) -> Result<SyncOutcome> {
        let flight = self.state.begin_flight().await?;
        let request = SyncRequest {
            user_id: self.user_id.clone(),
            device_id: self.device_id.to_string(),
            elements: payload.elements.clone(),
            settings: payload.settings.clone(),
            current_version,
        };

        match self.api.sync_template(&self.template_id, &request).await {
            Ok(response) => {
                let outcome = SyncOutcome::from_response(response);
                flight.succeed(|state| outcome.conflict.apply(state));
                if outcome.has_conflict() {
                    tracing::warn!(
                        template_id = %self.template_id,
                        device_id = %self.device_id,
                        current_version,
                        server_version = ?outcome.server_version,
                        "Sync reported a conflict"
                    );
                } else {
                    tracing::info!(
                        template_id = %self.template_id,
                        current_version,
                        "Template synced"
                    );
                }
                Ok(outcome)
            }
            Err(error) => {
                tracing::error!(
                    template_id = %self.template_id,
                    current_version,
                    "Template sync failed: {}",
                    error
                );
                flight.fail(&error);
                Err(error)
            }
        }
    }

    /// Advisory lookup of the server's sync record for this session.
    pub async fn get_sync_state(&self) -> Option<RemoteSyncStatus> {
        match self
            .api
            .get_sync_state(&self.template_id, &self.user_id, self.device_id.as_str())
            .await
        {
            Ok(status) => status,
            Err(error) => {
                tracing::warn!(
                    template_id = %self.template_id,
                    "Failed to fetch sync state: {}",
                    error
                );
                None
            }
        }
    }

    /// Push a change notification without waiting for it.
    ///
    /// Failures are logged, never returned. The handle only signals that the
    /// attempt finished.
    pub fn notify_change(&self, change_type: ChangeType, details: ChangeDetails) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        let template_id = self.template_id.clone();
        let closed = self.state.is_closed();
        let change = NewChangeNotification {
            change_type,
            affected_element_id: details.affected_element_id,
            affected_element_name: details.affected_element_name,
            old_value: details.old_value,
            new_value: details.new_value,
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            device_id: self.device_id.to_string(),
        };

        tokio::spawn(async move {
            if closed {
                tracing::debug!(
                    template_id = %template_id,
                    "Session closed; dropping change notification"
                );
                return;
            }
            if let Err(error) = api.notify_change(&template_id, &change).await {
                tracing::warn!(
                    template_id = %template_id,
                    change_type = ?change.change_type,
                    "Failed to send change notification: {}",
                    error
                );
            }
        })
    }
}
