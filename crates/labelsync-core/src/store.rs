//! Client-side version history for one template.
//!
//! The version list is replaced wholesale on every successful load, never
//! patched in place. Saves and restores run under the session's operation
//! gate and refresh the list once the server has accepted them. Every load is
//! ticketed when issued; a response is applied only if no later-issued load
//! has already been applied, so overlapping refreshes cannot roll the list back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;

use crate::api::{SaveVersionRequest, TemplateApi};
use crate::config::non_blank;
use crate::error::Result;
use crate::models::{default_version_name, TemplateId, TemplatePayload, Version, VersionNumber};
use crate::state::{Flight, SharedSyncState};

pub struct VersionStore {
    api: Arc<dyn TemplateApi>,
    template_id: TemplateId,
    user_id: String,
    limit: usize,
    state: SharedSyncState,
    next_ticket: AtomicU64,
    versions: RwLock<LoadedVersions>,
}

#[derive(Default)]
struct LoadedVersions {
    /// Ticket of the load that produced `list`
    ticket: u64,
    list: Arc<Vec<Version>>,
}

impl VersionStore {
    pub fn new(
        api: Arc<dyn TemplateApi>,
        template_id: TemplateId,
        user_id: impl Into<String>,
        limit: usize,
        state: SharedSyncState,
    ) -> Self {
        Self {
            api,
            template_id,
            user_id: user_id.into(),
            limit: limit.max(1),
            state,
            next_ticket: AtomicU64::new(0),
            versions: RwLock::new(LoadedVersions::default()),
        }
    }

    pub const fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    /// Last loaded list, most recent first.
    pub fn versions(&self) -> Arc<Vec<Version>> {
        self.versions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .list
            .clone()
    }

    /// Highest version number in the last loaded list.
    pub fn latest_version_number(&self) -> Option<VersionNumber> {
        self.versions().first().map(|version| version.version_number)
    }

    /// Fetch the history, most recent first, capped at `limit`.
    ///
    /// On failure the previous list is kept and `sync_error` is set.
    pub async fn load_versions(&self, limit: usize) -> Result<Arc<Vec<Version>>> {
        self.load_for_epoch(self.state.epoch(), limit).await
    }

    /// Create a new version from the given editable state.
    ///
    /// Without a name the version gets a timestamped label.
    pub async fn save_version(
        &self,
        payload: &TemplatePayload,
        name: Option<String>,
        is_autosave: bool,
    ) -> Result<Version> {
        let flight = self.state.begin_flight().await?;
        let epoch = flight.epoch();
        let saved = self.push_save(&flight, payload, name, is_autosave).await;
        drop(flight);

        if saved.is_ok() {
            self.refresh(epoch).await;
        }
        saved
    }

    /// Autosave entry point: skipped (`None`) when an operation is in flight.
    pub(crate) async fn try_autosave(&self, payload: &TemplatePayload) -> Option<Result<Version>> {
        let flight = self.state.try_begin_flight()?;
        let epoch = flight.epoch();
        let saved = self.push_save(&flight, payload, None, true).await;
        drop(flight);

        if saved.is_ok() {
            self.refresh(epoch).await;
        }
        Some(saved)
    }

    /// Make `version_number`'s content current by appending a new version.
    pub async fn restore_version(&self, version_number: VersionNumber) -> Result<Version> {
        let flight = self.state.begin_flight().await?;
        let epoch = flight.epoch();
        let restored = match self
            .api
            .restore_template_version(&self.template_id, version_number, &self.user_id)
            .await
        {
            Ok(version) => {
                flight.succeed(|_| {});
                tracing::info!(
                    template_id = %self.template_id,
                    restored_from = version_number,
                    version_number = version.version_number,
                    "Restored template version"
                );
                Ok(version)
            }
            Err(error) => {
                tracing::error!(
                    template_id = %self.template_id,
                    version_number,
                    "Failed to restore version: {}",
                    error
                );
                flight.fail(&error);
                Err(error)
            }
        };
        drop(flight);

        if restored.is_ok() {
            self.refresh(epoch).await;
        }
        restored
    }

    async fn push_save(
        &self,
        flight: &Flight<'_>,
        payload: &TemplatePayload,
        name: Option<String>,
        is_autosave: bool,
    ) -> Result<Version> {
        let request = SaveVersionRequest {
            name: non_blank(name)
                .unwrap_or_else(|| default_version_name(is_autosave, Utc::now())),
            description: None,
            elements: payload.elements.clone(),
            settings: payload.settings.clone(),
            created_by: self.user_id.clone(),
            is_autosave,
            change_summary: Version::summary_for(is_autosave).to_string(),
        };

        match self
            .api
            .save_template_version(&self.template_id, &request)
            .await
        {
            Ok(version) => {
                flight.succeed(|_| {});
                tracing::info!(
                    template_id = %self.template_id,
                    version_number = version.version_number,
                    is_autosave,
                    "Saved template version"
                );
                Ok(version)
            }
            Err(error) => {
                tracing::error!(
                    template_id = %self.template_id,
                    is_autosave,
                    "Failed to save version: {}",
                    error
                );
                flight.fail(&error);
                Err(error)
            }
        }
    }

    async fn refresh(&self, epoch: u64) {
        if let Err(error) = self.load_for_epoch(epoch, self.limit).await {
            tracing::warn!(
                template_id = %self.template_id,
                "Version list refresh failed after write: {}",
                error
            );
        }
    }

    async fn load_for_epoch(&self, epoch: u64, limit: usize) -> Result<Arc<Vec<Version>>> {
        let limit = limit.max(1);
        let ticket = self.next_ticket.fetch_add(1, Ordering::AcqRel) + 1;
        match self
            .api
            .get_template_versions(&self.template_id, limit)
            .await
        {
            Ok(mut versions) => {
                versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
                versions.truncate(limit);
                let versions = Arc::new(versions);
                if self.state.is_current(epoch) {
                    self.apply_loaded(ticket, &versions);
                }
                tracing::debug!(
                    template_id = %self.template_id,
                    count = versions.len(),
                    "Loaded template versions"
                );
                Ok(versions)
            }
            Err(error) => {
                tracing::error!(
                    template_id = %self.template_id,
                    "Failed to load versions: {}",
                    error
                );
                self.state.record_error(epoch, &error);
                Err(error)
            }
        }
    }

    fn apply_loaded(&self, ticket: u64, versions: &Arc<Vec<Version>>) {
        let mut loaded = self.versions.write().unwrap_or_else(PoisonError::into_inner);
        if ticket < loaded.ticket {
            tracing::debug!(
                template_id = %self.template_id,
                ticket,
                applied = loaded.ticket,
                "Discarding version list from an older load"
            );
            return;
        }
        loaded.ticket = ticket;
        loaded.list = Arc::clone(versions);
    }
}
