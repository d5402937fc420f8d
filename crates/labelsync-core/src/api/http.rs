//! JSON-over-HTTP client for the template service.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    ChangeFeed, RestoreVersionRequest, SaveVersionRequest, SyncRequest, SyncResponse,
    TemplateApi, VersionList,
};
use crate::config::{normalize_base_url, ClientConfig};
use crate::error::{Error, Result};
use crate::models::{
    ChangeNotification, NewChangeNotification, RemoteSyncStatus, TemplateId, Version,
    VersionNumber,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct HttpTemplateClient {
    base_url: String,
    access_token: Option<String>,
    client: Client,
}

impl fmt::Debug for HttpTemplateClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpTemplateClient")
            .field("base_url", &self.base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpTemplateClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::build(base_url.into(), None, DEFAULT_TIMEOUT)
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::build(
            config.api_base_url.clone(),
            config.access_token.clone(),
            config.request_timeout,
        )
    }

    fn build(base_url: String, access_token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(&base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            access_token,
            client,
        })
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn template_url(&self, template_id: &TemplateId, suffix: &str) -> String {
        format!(
            "{}/v1/templates/{}/{suffix}",
            self.base_url,
            urlencoding::encode(template_id.as_str())
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, "application/json");
        match self.access_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl TemplateApi for HttpTemplateClient {
    async fn get_template_versions(
        &self,
        template_id: &TemplateId,
        limit: usize,
    ) -> Result<Vec<Version>> {
        let request = self
            .client
            .get(self.template_url(template_id, "versions"))
            .query(&[("limit", limit)]);
        let list: VersionList = read_json(self.authorize(request).send().await?).await?;
        Ok(list.versions)
    }

    async fn save_template_version(
        &self,
        template_id: &TemplateId,
        request: &SaveVersionRequest,
    ) -> Result<Version> {
        let request = self
            .client
            .post(self.template_url(template_id, "versions"))
            .json(request);
        read_json(self.authorize(request).send().await?).await
    }

    async fn restore_template_version(
        &self,
        template_id: &TemplateId,
        version_number: VersionNumber,
        user_id: &str,
    ) -> Result<Version> {
        let body = RestoreVersionRequest {
            user_id: user_id.to_string(),
        };
        let request = self
            .client
            .post(self.template_url(template_id, &format!("versions/{version_number}/restore")))
            .json(&body);
        let response = self.authorize(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Version {version_number}")));
        }
        read_json(response).await
    }

    async fn sync_template(
        &self,
        template_id: &TemplateId,
        request: &SyncRequest,
    ) -> Result<SyncResponse> {
        let request = self
            .client
            .post(self.template_url(template_id, "sync"))
            .json(request);
        read_json(self.authorize(request).send().await?).await
    }

    async fn get_sync_state(
        &self,
        template_id: &TemplateId,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<RemoteSyncStatus>> {
        let request = self
            .client
            .get(self.template_url(template_id, "sync-state"))
            .query(&[("userId", user_id), ("deviceId", device_id)]);
        let response = self.authorize(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response).await
    }

    async fn get_latest_changes(
        &self,
        template_id: &TemplateId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangeNotification>> {
        let mut request = self.client.get(self.template_url(template_id, "changes"));
        if let Some(since) = since {
            let since = since.to_rfc3339_opts(SecondsFormat::Nanos, true);
            request = request.query(&[("since", since)]);
        }
        let feed: ChangeFeed = read_json(self.authorize(request).send().await?).await?;
        Ok(feed.changes)
    }

    async fn notify_change(
        &self,
        template_id: &TemplateId,
        change: &NewChangeNotification,
    ) -> Result<()> {
        let request = self
            .client
            .post(self.template_url(template_id, "changes"))
            .json(change);
        ensure_success(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Plain-text error bodies are cut to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 180;

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}
