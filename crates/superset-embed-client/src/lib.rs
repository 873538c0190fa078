//! HTTP client for the chat backend's Superset endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use superset_embed_core::{
    ApiError, DashboardListRequest, DashboardRef, EnvelopeError, GuestTokenRequest,
    PushChartRequest, SupersetApi, decode_dashboards, decode_push_ack, error_body_text,
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_ATTEMPTS: usize = 2;
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:9080";
pub const DEFAULT_API_PREFIX: &str = "/api/chat/superset";
pub const ENV_API_BASE_URL: &str = "SUPERSET_EMBED_API_BASE_URL";
pub const ENV_API_TOKEN: &str = "SUPERSET_EMBED_API_TOKEN";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct SupersetClientConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub timeout_ms: u64,
    pub request_attempts: usize,
    pub bearer_token: Option<String>,
}

impl SupersetClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
            bearer_token: None,
        }
    }

    /// Base URL and bearer token from the environment, falling back to the
    /// local backend.
    pub fn from_env() -> Result<Self, SupersetClientError> {
        let (base_url, source) = resolve_api_base_url()?;
        debug!(source, base_url = %base_url, "resolved superset api base url");
        let mut config = Self::new(base_url);
        config.bearer_token = env_non_empty(ENV_API_TOKEN);
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum SupersetClientError {
    #[error("superset_client_base_url_missing")]
    BaseUrlMissing,
    #[error("superset_client_base_url_invalid")]
    InvalidBaseUrl,
    #[error("superset_client_invalid_path")]
    InvalidPath,
    #[error("superset_request_failed:{message}")]
    Request { message: String },
    #[error("superset_read_failed:{message}")]
    Read { message: String },
    #[error("superset_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("superset_json_decode_failed:{message}")]
    Decode { message: String },
    #[error("superset_rejected_{code}:{message}")]
    Rejected { code: String, message: String },
}

impl From<EnvelopeError> for SupersetClientError {
    fn from(error: EnvelopeError) -> Self {
        match error {
            EnvelopeError::Rejected { code, message } => Self::Rejected { code, message },
            EnvelopeError::Decode { message } => Self::Decode { message },
        }
    }
}

impl From<SupersetClientError> for ApiError {
    fn from(error: SupersetClientError) -> Self {
        let message = error.to_string();
        match error {
            SupersetClientError::Http { status, .. } => ApiError::new(status.as_u16(), message),
            SupersetClientError::Request { .. } | SupersetClientError::Read { .. } => {
                ApiError::network(message)
            }
            SupersetClientError::Rejected { code, .. } => ApiError::new(200, message).with_code(code),
            SupersetClientError::Decode { .. } => ApiError::new(0, message).with_code("decode_error"),
            SupersetClientError::BaseUrlMissing
            | SupersetClientError::InvalidBaseUrl
            | SupersetClientError::InvalidPath => ApiError::new(0, message).with_code("config_error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupersetClient {
    base_url: String,
    api_prefix: String,
    timeout: Duration,
    request_attempts: usize,
    bearer_token: Option<String>,
    http: reqwest::Client,
}

impl SupersetClient {
    pub fn new(config: SupersetClientConfig) -> Result<Self, SupersetClientError> {
        let base_url = normalize_base_url(&config.base_url)?;
        let api_prefix = format!("/{}", config.api_prefix.trim().trim_matches('/'));
        Ok(Self {
            base_url,
            api_prefix,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            request_attempts: config.request_attempts.max(1),
            bearer_token: config.bearer_token.and_then(non_empty_string),
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim().trim_start_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        Some(format!("{}{}/{}", self.base_url, self.api_prefix, trimmed))
    }

    #[must_use]
    pub fn guest_token_path() -> &'static str {
        "guest-token"
    }

    #[must_use]
    pub fn dashboards_path() -> &'static str {
        "dashboards"
    }

    #[must_use]
    pub fn dashboard_push_path() -> &'static str {
        "dashboard/push"
    }

    /// Raw guest-token payload; the credential cache tolerates its shapes.
    pub async fn guest_token(&self, request: &GuestTokenRequest) -> Result<Value, SupersetClientError> {
        self.post_json(Self::guest_token_path(), request).await
    }

    pub async fn dashboards(
        &self,
        request: &DashboardListRequest,
    ) -> Result<Vec<DashboardRef>, SupersetClientError> {
        let payload: Value = self.post_json(Self::dashboards_path(), request).await?;
        Ok(decode_dashboards(payload)?)
    }

    pub async fn push_chart(&self, request: &PushChartRequest) -> Result<(), SupersetClientError> {
        let payload: Value = self.post_json(Self::dashboard_push_path(), request).await?;
        Ok(decode_push_ack(payload)?)
    }

    pub async fn post_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, SupersetClientError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(SupersetClientError::InvalidPath)?;
        let mut last_error: Option<String> = None;

        for attempt in 0..self.request_attempts {
            let request_id = format!("req_{}", Uuid::new_v4().simple());
            let mut request = self
                .http
                .post(url.as_str())
                .header(REQUEST_ID_HEADER, request_id.as_str())
                .timeout(self.timeout)
                .json(payload);
            if let Some(token) = &self.bearer_token {
                request = request.bearer_auth(token);
            }

            debug!(url = %url, request_id = %request_id, attempt, "superset request");
            match request.send().await {
                Ok(response) => return decode_json_response(response).await,
                Err(error) => {
                    debug!(url = %url, attempt, %error, "superset request failed");
                    last_error = Some(error.to_string());
                    if attempt + 1 >= self.request_attempts {
                        break;
                    }
                }
            }
        }

        Err(SupersetClientError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait(?Send)]
impl SupersetApi for SupersetClient {
    async fn fetch_guest_token(&self, request: GuestTokenRequest) -> Result<Value, ApiError> {
        self.guest_token(&request).await.map_err(ApiError::from)
    }

    async fn fetch_dashboards(
        &self,
        request: DashboardListRequest,
    ) -> Result<Vec<DashboardRef>, ApiError> {
        self.dashboards(&request).await.map_err(ApiError::from)
    }

    async fn push_chart_to_dashboard(&self, request: PushChartRequest) -> Result<(), ApiError> {
        self.push_chart(&request).await.map_err(ApiError::from)
    }
}

pub fn resolve_api_base_url() -> Result<(String, &'static str), SupersetClientError> {
    if let Some(base_url) = env_non_empty(ENV_API_BASE_URL) {
        return normalize_base_url(&base_url).map(|normalized| (normalized, ENV_API_BASE_URL));
    }
    normalize_base_url(DEFAULT_API_BASE_URL).map(|normalized| (normalized, "default_local"))
}

pub fn normalize_base_url(raw: &str) -> Result<String, SupersetClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SupersetClientError::BaseUrlMissing);
    }
    let Some((scheme, remainder)) = trimmed.split_once("://") else {
        return Err(SupersetClientError::InvalidBaseUrl);
    };
    if !matches!(scheme, "http" | "https") || remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(SupersetClientError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> SupersetClientError {
    let body = error_body_text(&String::from_utf8_lossy(body));
    SupersetClientError::Http { status, body }
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, SupersetClientError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| SupersetClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| SupersetClientError::Decode {
        message: error.to_string(),
    })
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(non_empty_string)
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
