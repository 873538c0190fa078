//! The external frame: what to embed, how the embed SDK is driven, and the
//! lifecycle of the single live instance.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::credential::GuestTokenProvider;
use crate::error::EmbedError;
use crate::geometry::ThemeMode;
use crate::host::{FrameStyle, MountPoint};
use crate::response::{ParamOption, SupersetChartResponse, VizCandidate, non_empty};

pub const GUEST_TOKEN_PARAM_KEY: &str = "guestToken";

/// Addressable identity of one embeddable dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedTarget {
    pub embed_id: String,
    pub domain: String,
}

impl EmbedTarget {
    /// Target of the active candidate, or of the legacy response fields when
    /// there is no candidate. Both id and domain must be non-empty.
    #[must_use]
    pub fn resolve(
        active: Option<&VizCandidate>,
        response: &SupersetChartResponse,
    ) -> Option<Self> {
        let (embed_id, domain) = match active {
            Some(candidate) => (
                candidate.embedded_id.as_deref(),
                candidate.superset_domain.as_deref(),
            ),
            None => (
                response.embedded_id.as_deref(),
                response.superset_domain.as_deref(),
            ),
        };
        Some(Self {
            embed_id: non_empty(embed_id)?.to_string(),
            domain: non_empty(domain)?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterUiConfig {
    pub visible: bool,
    pub expanded: bool,
}

/// Display options passed to the embed SDK (`dashboardUiConfig`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardUiConfig {
    pub hide_title: bool,
    pub hide_tab: bool,
    pub hide_chart_controls: bool,
    pub filters: FilterUiConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_params: Option<BTreeMap<String, String>>,
}

impl DashboardUiConfig {
    #[must_use]
    pub fn new(hide_chart_controls: bool, params: &[ParamOption]) -> Self {
        let url_params = build_url_params(params);
        Self {
            hide_title: true,
            hide_tab: true,
            hide_chart_controls,
            filters: FilterUiConfig {
                visible: false,
                expanded: false,
            },
            url_params: if url_params.is_empty() {
                None
            } else {
                Some(url_params)
            },
        }
    }
}

/// URL overrides from every non-forwarded parameter except `guestToken`.
#[must_use]
pub fn build_url_params(params: &[ParamOption]) -> BTreeMap<String, String> {
    params
        .iter()
        .filter(|option| !option.is_forward() && option.key != GUEST_TOKEN_PARAM_KEY)
        .map(|option| (option.key.clone(), param_value_text(&option.value)))
        .collect()
}

fn param_value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub target: EmbedTarget,
    pub mount_point_id: String,
    pub iframe_title: String,
    pub ui_config: DashboardUiConfig,
    pub guest_token: GuestTokenProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentSize {
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
}

/// Optional capability: the frame can report its scroll size.
#[async_trait(?Send)]
pub trait ContentSizeProbe {
    async fn content_size(&self) -> Result<ContentSize, EmbedError>;
}

/// Optional capability: the frame accepts a light/dark mode.
#[async_trait(?Send)]
pub trait ThemeModeSetter {
    async fn set_theme_mode(&self, mode: ThemeMode) -> Result<(), EmbedError>;
}

/// A mounted external frame. Capabilities are discovered per instance.
pub trait EmbedInstance {
    fn unmount(&self);

    fn content_size_probe(&self) -> Option<&dyn ContentSizeProbe> {
        None
    }

    fn theme_setter(&self) -> Option<&dyn ThemeModeSetter> {
        None
    }
}

#[async_trait(?Send)]
pub trait EmbedDriver {
    async fn embed(&self, request: EmbedRequest) -> Result<Rc<dyn EmbedInstance>, EmbedError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedPhase {
    #[default]
    Idle,
    Mounting,
    Mounted,
    Error,
}

/// Handle for one mount attempt; stale once another attempt begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountTicket {
    generation: u64,
}

impl MountTicket {
    #[must_use]
    pub fn generation(self) -> u64 {
        self.generation
    }
}

pub enum MountOutcome {
    Mounted(Rc<dyn EmbedInstance>),
    Failed(EmbedError),
    /// A newer attempt or teardown happened while this one was in flight.
    Superseded,
}

impl std::fmt::Debug for MountOutcome {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mounted(_) => formatter.write_str("Mounted"),
            Self::Failed(error) => formatter.debug_tuple("Failed").field(error).finish(),
            Self::Superseded => formatter.write_str("Superseded"),
        }
    }
}

#[derive(Default)]
struct SessionSlot {
    generation: u64,
    phase: EmbedPhase,
    target: Option<EmbedTarget>,
    instance: Option<Rc<dyn EmbedInstance>>,
    last_error: Option<String>,
    torn_down: bool,
}

/// Owns the live frame instance and its mount point. At most one instance
/// is alive; every attempt is tagged with a generation and results from
/// older generations are unmounted on arrival.
pub struct EmbedSessionManager {
    driver: Rc<dyn EmbedDriver>,
    mount_point: Rc<dyn MountPoint>,
    slot: RefCell<SessionSlot>,
}

impl EmbedSessionManager {
    pub fn new(driver: Rc<dyn EmbedDriver>, mount_point: Rc<dyn MountPoint>) -> Self {
        Self {
            driver,
            mount_point,
            slot: RefCell::new(SessionSlot::default()),
        }
    }

    #[must_use]
    pub fn phase(&self) -> EmbedPhase {
        self.slot.borrow().phase
    }

    #[must_use]
    pub fn target(&self) -> Option<EmbedTarget> {
        self.slot.borrow().target.clone()
    }

    #[must_use]
    pub fn instance(&self) -> Option<Rc<dyn EmbedInstance>> {
        self.slot.borrow().instance.clone()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.slot.borrow().last_error.clone()
    }

    #[must_use]
    pub fn mount_point_id(&self) -> String {
        self.mount_point.id().to_string()
    }

    #[must_use]
    pub fn is_current(&self, ticket: MountTicket) -> bool {
        let slot = self.slot.borrow();
        !slot.torn_down && slot.generation == ticket.generation
    }

    /// Ticket of the latest attempt, unless the session is torn down.
    #[must_use]
    pub fn current_ticket(&self) -> Option<MountTicket> {
        let slot = self.slot.borrow();
        (!slot.torn_down).then_some(MountTicket {
            generation: slot.generation,
        })
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.slot.borrow().torn_down
    }

    /// Starts a new attempt: the previous instance is unmounted and the
    /// container emptied before this returns, and any in-flight attempt
    /// becomes stale.
    pub fn begin(&self, target: EmbedTarget) -> Option<MountTicket> {
        let previous = {
            let mut slot = self.slot.borrow_mut();
            if slot.torn_down {
                return None;
            }
            slot.generation += 1;
            slot.phase = EmbedPhase::Mounting;
            slot.target = Some(target);
            slot.last_error = None;
            slot.instance.take()
        };
        if let Some(previous) = previous {
            previous.unmount();
        }
        self.mount_point.clear();

        let generation = self.slot.borrow().generation;
        debug!(generation, "embed mount started");
        Some(MountTicket { generation })
    }

    /// Runs the embed call for `ticket` and applies its result only if the
    /// ticket is still current.
    pub async fn mount(&self, ticket: MountTicket, request: EmbedRequest) -> MountOutcome {
        let embed_id = request.target.embed_id.clone();
        let result = self.driver.embed(request).await;
        self.complete(ticket, &embed_id, result)
    }

    fn complete(
        &self,
        ticket: MountTicket,
        embed_id: &str,
        result: Result<Rc<dyn EmbedInstance>, EmbedError>,
    ) -> MountOutcome {
        let current = self.is_current(ticket);
        match result {
            Ok(instance) if current => {
                let mut slot = self.slot.borrow_mut();
                slot.instance = Some(Rc::clone(&instance));
                slot.phase = EmbedPhase::Mounted;
                info!(embed_id, generation = ticket.generation, "embed mounted");
                MountOutcome::Mounted(instance)
            }
            Ok(instance) => {
                debug!(embed_id, generation = ticket.generation, "discarding superseded embed");
                instance.unmount();
                MountOutcome::Superseded
            }
            Err(error) if current => {
                warn!(embed_id, generation = ticket.generation, %error, "embed mount failed");
                let mut slot = self.slot.borrow_mut();
                slot.phase = EmbedPhase::Error;
                slot.last_error = Some(error.to_string());
                MountOutcome::Failed(error)
            }
            Err(error) => {
                debug!(embed_id, %error, "ignoring failure of superseded embed");
                MountOutcome::Superseded
            }
        }
    }

    /// Unmounts the live instance (if any) and invalidates in-flight
    /// attempts. Safe to call repeatedly.
    pub fn unmount(&self) {
        let previous = {
            let mut slot = self.slot.borrow_mut();
            slot.generation += 1;
            slot.phase = EmbedPhase::Idle;
            slot.target = None;
            slot.instance.take()
        };
        if let Some(previous) = previous {
            previous.unmount();
            self.mount_point.clear();
        }
    }

    /// Final unmount; later attempts are refused and late results unmounted.
    pub fn teardown(&self) {
        self.unmount();
        self.slot.borrow_mut().torn_down = true;
    }

    pub fn style_frame(&self, style: &FrameStyle) {
        if self.slot.borrow().instance.is_some() {
            self.mount_point.style_frame(style);
        }
    }

    pub fn set_frame_background(&self, color: &str) {
        if self.slot.borrow().instance.is_some() {
            self.mount_point.set_frame_background(color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param(param_type: Option<&str>, key: &str, value: Value) -> ParamOption {
        ParamOption {
            param_type: param_type.map(ToString::to_string),
            key: key.to_string(),
            value,
        }
    }

    #[test]
    fn target_requires_both_id_and_domain() {
        let response = SupersetChartResponse {
            embedded_id: Some("legacy".to_string()),
            superset_domain: Some("https://bi".to_string()),
            ..SupersetChartResponse::default()
        };
        assert_eq!(
            EmbedTarget::resolve(None, &response),
            Some(EmbedTarget {
                embed_id: "legacy".to_string(),
                domain: "https://bi".to_string(),
            })
        );

        let candidate = VizCandidate {
            embedded_id: Some("embed-1".to_string()),
            superset_domain: None,
            ..VizCandidate::default()
        };
        assert_eq!(EmbedTarget::resolve(Some(&candidate), &response), None);

        let blank_domain = SupersetChartResponse {
            embedded_id: Some("legacy".to_string()),
            superset_domain: Some(String::new()),
            ..SupersetChartResponse::default()
        };
        assert_eq!(EmbedTarget::resolve(None, &blank_domain), None);
    }

    #[test]
    fn url_params_skip_forwarded_and_guest_token() {
        let params = vec![
            param(Some("FORWARD"), "height", json!(600)),
            param(Some("CUSTOM"), "guestToken", json!("secret")),
            param(Some("CUSTOM"), "region", json!("east")),
            param(None, "limit", json!(10)),
            param(None, "filters", json!({ "a": [1, 2] })),
            param(None, "empty", Value::Null),
        ];
        let url_params = build_url_params(&params);
        let expected = [
            ("empty", ""),
            ("filters", r#"{"a":[1,2]}"#),
            ("limit", "10"),
            ("region", "east"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect::<BTreeMap<_, _>>();
        assert_eq!(url_params, expected);
    }

    #[test]
    fn ui_config_omits_empty_url_params() {
        let config = DashboardUiConfig::new(false, &[param(Some("FORWARD"), "height", json!(1))]);
        let value = serde_json::to_value(&config).expect("ui config json");
        assert_eq!(
            value,
            json!({
                "hideTitle": true,
                "hideTab": true,
                "hideChartControls": false,
                "filters": { "visible": false, "expanded": false }
            })
        );
    }
}
