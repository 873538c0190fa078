use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::response::DashboardRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestTokenRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<i64>,
    pub embedded_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardListRequest {
    pub plugin_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushChartRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<i64>,
    pub dashboard_id: i64,
    pub chart_id: i64,
}

/// Failure read out of a backend reply that arrived with a success status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("superset_rejected_{code}:{message}")]
    Rejected { code: String, message: String },
    #[error("superset_json_decode_failed:{message}")]
    Decode { message: String },
}

impl From<EnvelopeError> for ApiError {
    fn from(error: EnvelopeError) -> Self {
        let message = error.to_string();
        match error {
            EnvelopeError::Rejected { code, .. } => ApiError::new(200, message).with_code(code),
            EnvelopeError::Decode { .. } => ApiError::new(200, message).with_code("decode_failed"),
        }
    }
}

/// Strips the backend's `{code, msg, data}` wrapper. Payloads without the
/// wrapper pass through untouched; codes other than `0`/`200` are rejections.
pub fn unwrap_envelope(payload: Value) -> Result<Value, EnvelopeError> {
    let Value::Object(mut map) = payload else {
        return Ok(payload);
    };
    let is_envelope = map.contains_key("code") && (map.contains_key("data") || map.contains_key("msg"));
    if !is_envelope {
        return Ok(Value::Object(map));
    }

    let code = match map.get("code") {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) => text.trim().to_string(),
        _ => String::new(),
    };
    if !matches!(code.as_str(), "0" | "200") {
        let message = map
            .get("msg")
            .and_then(Value::as_str)
            .map_or_else(|| EMPTY_BODY.to_string(), ToString::to_string);
        return Err(EnvelopeError::Rejected { code, message });
    }
    Ok(map.remove("data").unwrap_or(Value::Null))
}

/// Dashboard list reply; a null `data` is an empty list.
pub fn decode_dashboards(payload: Value) -> Result<Vec<DashboardRef>, EnvelopeError> {
    match unwrap_envelope(payload)? {
        Value::Null => Ok(Vec::new()),
        data => serde_json::from_value(data).map_err(|error| EnvelopeError::Decode {
            message: error.to_string(),
        }),
    }
}

/// Push reply; only an explicit `false` counts as a refusal.
pub fn decode_push_ack(payload: Value) -> Result<(), EnvelopeError> {
    match unwrap_envelope(payload)? {
        Value::Bool(false) => Err(EnvelopeError::Rejected {
            code: "false".to_string(),
            message: "push rejected".to_string(),
        }),
        _ => Ok(()),
    }
}

const EMPTY_BODY: &str = "<empty>";

/// Body text quoted in HTTP error messages.
#[must_use]
pub fn error_body_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        EMPTY_BODY.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Backend endpoints the session depends on.
///
/// `fetch_guest_token` returns the raw payload: upstreams answer with a bare
/// string, `{token}` or `{data: {token}}`, and the credential cache decides.
#[async_trait(?Send)]
pub trait SupersetApi {
    async fn fetch_guest_token(&self, request: GuestTokenRequest) -> Result<Value, ApiError>;

    async fn fetch_dashboards(
        &self,
        request: DashboardListRequest,
    ) -> Result<Vec<DashboardRef>, ApiError>;

    async fn push_chart_to_dashboard(&self, request: PushChartRequest) -> Result<(), ApiError>;
}
