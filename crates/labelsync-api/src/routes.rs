use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use labelsync_core::api::{
    ChangeFeed, RestoreVersionRequest, SaveVersionRequest, SyncRequest, SyncResponse, VersionList,
};
use labelsync_core::models::{NewChangeNotification, VersionNumber};
use labelsync_core::{ChangeNotification, RemoteSyncStatus, TemplateId, Version};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::repository::TemplateRepository;

const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    repository: Arc<TemplateRepository>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        Self {
            repository: Arc::new(TemplateRepository::new(config.change_retention)),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let template_routes = Router::new()
        .route(
            "/templates/{template_id}/versions",
            get(list_versions).post(save_version),
        )
        .route(
            "/templates/{template_id}/versions/{version_number}/restore",
            post(restore_version),
        )
        .route("/templates/{template_id}/sync", post(sync_template))
        .route("/templates/{template_id}/sync-state", get(sync_state))
        .route(
            "/templates/{template_id}/changes",
            get(latest_changes).post(notify_change),
        );

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", template_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

#[derive(Debug, Deserialize)]
struct ListVersionsQuery {
    limit: Option<usize>,
}

async fn list_versions(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    Query(query): Query<ListVersionsQuery>,
) -> Result<Json<VersionList>, AppError> {
    let limit = match query.limit {
        Some(0) => return Err(AppError::bad_request("limit must be at least 1")),
        Some(limit) => limit.min(state.config.max_version_limit),
        None => DEFAULT_LIST_LIMIT.min(state.config.max_version_limit),
    };
    let versions = state
        .repository
        .list_versions(&TemplateId::from(template_id), limit)
        .await;
    Ok(Json(VersionList { versions }))
}

async fn save_version(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    Json(request): Json<SaveVersionRequest>,
) -> Result<(StatusCode, Json<Version>), AppError> {
    let template_id = TemplateId::from(template_id);
    let version = state.repository.save_version(&template_id, request).await?;
    tracing::info!(
        endpoint = "save_version",
        template = %template_id,
        version = version.version_number,
        autosave = version.is_autosave,
        "Saved template version"
    );
    Ok((StatusCode::CREATED, Json(version)))
}

async fn restore_version(
    State(state): State<AppState>,
    Path((template_id, version_number)): Path<(String, VersionNumber)>,
    Json(request): Json<RestoreVersionRequest>,
) -> Result<Json<Version>, AppError> {
    let template_id = TemplateId::from(template_id);
    let version = state
        .repository
        .restore_version(&template_id, version_number, &request.user_id)
        .await?;
    tracing::info!(
        endpoint = "restore_version",
        template = %template_id,
        source = version_number,
        version = version.version_number,
        "Restored template version"
    );
    Ok(Json(version))
}

async fn sync_template(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    if request.user_id.trim().is_empty() || request.device_id.trim().is_empty() {
        return Err(AppError::bad_request(
            "userId and deviceId must not be empty",
        ));
    }
    let template_id = TemplateId::from(template_id);
    let declared = request.current_version;
    let response = state.repository.sync(&template_id, request).await;
    if response.conflict_detected {
        tracing::info!(
            endpoint = "sync",
            template = %template_id,
            declared,
            server_version = response.server_version,
            "Sync rejected, session is behind"
        );
    } else {
        tracing::debug!(endpoint = "sync", template = %template_id, declared, "Sync accepted");
    }
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncStateQuery {
    user_id: String,
    device_id: String,
}

async fn sync_state(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    Query(query): Query<SyncStateQuery>,
) -> Result<Json<RemoteSyncStatus>, AppError> {
    let template_id = TemplateId::from(template_id);
    state
        .repository
        .sync_status(&template_id, &query.user_id, &query.device_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("sync state for {template_id}")))
}

#[derive(Debug, Deserialize)]
struct ChangesQuery {
    since: Option<DateTime<Utc>>,
}

async fn latest_changes(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    Query(query): Query<ChangesQuery>,
) -> Json<ChangeFeed> {
    let changes = state
        .repository
        .latest_changes(&TemplateId::from(template_id), query.since)
        .await;
    Json(ChangeFeed { changes })
}

async fn notify_change(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    Json(change): Json<NewChangeNotification>,
) -> Result<(StatusCode, Json<ChangeNotification>), AppError> {
    let template_id = TemplateId::from(template_id);
    let notification = state.repository.record_change(&template_id, change).await?;
    tracing::debug!(
        endpoint = "notify_change",
        template = %template_id,
        change_type = ?notification.change_type,
        device = %notification.device_id,
        "Recorded change notification"
    );
    Ok((StatusCode::CREATED, Json(notification)))
}
