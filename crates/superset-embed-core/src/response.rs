use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const PARAM_TYPE_FORWARD: &str = "FORWARD";

/// The backend serializes unset strings and flags as `null`; read those as
/// the type's default instead of rejecting the whole payload.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identity of the chat message (or chart) that owns a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for SubjectId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VizCandidate {
    #[serde(default, deserialize_with = "null_as_default")]
    pub viz_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viz_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superset_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

impl ParamOption {
    #[must_use]
    pub fn is_forward(&self) -> bool {
        self.param_type.as_deref() == Some(PARAM_TYPE_FORWARD)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<ParamOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_options: Option<Vec<ParamOption>>,
}

impl WebPage {
    /// `params` wins whenever present, even when empty.
    #[must_use]
    pub fn effective_params(&self) -> &[ParamOption] {
        self.params
            .as_deref()
            .or(self.param_options.as_deref())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRef {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
}

/// Payload of a Superset chat answer, as delivered by the chat backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupersetChartResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_page: Option<WebPage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viz_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superset_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viz_type_candidates: Option<Vec<Option<VizCandidate>>>,
    /// `None` means the field was absent (or null) and the list must be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboards: Option<Vec<DashboardRef>>,
}

impl SupersetChartResponse {
    #[must_use]
    pub fn params(&self) -> &[ParamOption] {
        match &self.web_page {
            Some(page) => page.effective_params(),
            None => &[],
        }
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}
