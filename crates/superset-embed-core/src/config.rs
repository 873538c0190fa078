use serde::{Deserialize, Serialize};

pub const DEFAULT_HEIGHT: f64 = 800.0;
pub const DEFAULT_FRAME_PADDING: f64 = 24.0;
pub const DEFAULT_EXPIRY_SKEW_MS: u64 = 60_000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 16;
pub const DEFAULT_HEALTH_CHECK_DELAY_MS: u64 = 200;
pub const DEFAULT_IFRAME_TITLE: &str = "supersetIframe";
pub const DEFAULT_TEMPORARY_DASHBOARD_PREFIX: &str = "supersonic_";

pub const ENV_DEFAULT_HEIGHT: &str = "SUPERSET_EMBED_DEFAULT_HEIGHT";
pub const ENV_FRAME_PADDING: &str = "SUPERSET_EMBED_FRAME_PADDING";
pub const ENV_EXPIRY_SKEW_MS: &str = "SUPERSET_EMBED_EXPIRY_SKEW_MS";
pub const ENV_HIDE_CHART_CONTROLS: &str = "SUPERSET_EMBED_HIDE_CHART_CONTROLS";
pub const ENV_PUSH_TARGET: &str = "SUPERSET_EMBED_PUSH_TARGET";

/// Which chart identity a push sends when several candidates exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PushTarget {
    /// The chart of the candidate currently shown in the frame.
    #[default]
    ActiveCandidate,
    /// The chart id the response was loaded with, regardless of switching.
    LoadedChart,
}

impl PushTarget {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActiveCandidate => "active_candidate",
            Self::LoadedChart => "loaded_chart",
        }
    }
}

#[must_use]
pub fn parse_push_target(raw: &str) -> Option<PushTarget> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "active_candidate" | "active-candidate" | "activecandidate" | "active" => {
            Some(PushTarget::ActiveCandidate)
        }
        "loaded_chart" | "loaded-chart" | "loadedchart" | "loaded" | "fixed" => {
            Some(PushTarget::LoadedChart)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedConfig {
    pub default_height: f64,
    pub frame_padding: f64,
    pub expiry_skew_ms: u64,
    pub settle_delay_ms: u64,
    pub health_check_delay_ms: u64,
    pub iframe_title: String,
    pub temporary_dashboard_prefix: String,
    pub hide_chart_controls: bool,
    pub push_target: PushTarget,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            default_height: DEFAULT_HEIGHT,
            frame_padding: DEFAULT_FRAME_PADDING,
            expiry_skew_ms: DEFAULT_EXPIRY_SKEW_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            health_check_delay_ms: DEFAULT_HEALTH_CHECK_DELAY_MS,
            iframe_title: DEFAULT_IFRAME_TITLE.to_string(),
            temporary_dashboard_prefix: DEFAULT_TEMPORARY_DASHBOARD_PREFIX.to_string(),
            hide_chart_controls: false,
            push_target: PushTarget::ActiveCandidate,
        }
    }
}

/// Config plus a note per overridden key describing where its value came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEmbedConfig {
    pub config: EmbedConfig,
    pub sources: Vec<String>,
}

impl EmbedConfig {
    /// Overlays `SUPERSET_EMBED_*` variables on the defaults. Unparseable
    /// values keep the default and are recorded as `KEY:invalid(raw)`.
    #[must_use]
    pub fn from_env() -> ResolvedEmbedConfig {
        let mut config = Self::default();
        let mut sources = Vec::new();

        if let Some(raw) = env_non_empty(ENV_DEFAULT_HEIGHT) {
            match parse_positive_f64(&raw) {
                Some(value) => {
                    config.default_height = value;
                    sources.push(ENV_DEFAULT_HEIGHT.to_string());
                }
                None => sources.push(format!("{ENV_DEFAULT_HEIGHT}:invalid({raw})")),
            }
        }

        if let Some(raw) = env_non_empty(ENV_FRAME_PADDING) {
            match raw.parse::<f64>().ok().filter(|value| value.is_finite() && *value >= 0.0) {
                Some(value) => {
                    config.frame_padding = value;
                    sources.push(ENV_FRAME_PADDING.to_string());
                }
                None => sources.push(format!("{ENV_FRAME_PADDING}:invalid({raw})")),
            }
        }

        if let Some(raw) = env_non_empty(ENV_EXPIRY_SKEW_MS) {
            match raw.parse::<u64>() {
                Ok(value) => {
                    config.expiry_skew_ms = value;
                    sources.push(ENV_EXPIRY_SKEW_MS.to_string());
                }
                Err(_) => sources.push(format!("{ENV_EXPIRY_SKEW_MS}:invalid({raw})")),
            }
        }

        if let Some(raw) = env_non_empty(ENV_HIDE_CHART_CONTROLS) {
            match parse_bool(&raw) {
                Some(value) => {
                    config.hide_chart_controls = value;
                    sources.push(ENV_HIDE_CHART_CONTROLS.to_string());
                }
                None => sources.push(format!("{ENV_HIDE_CHART_CONTROLS}:invalid({raw})")),
            }
        }

        if let Some(raw) = env_non_empty(ENV_PUSH_TARGET) {
            match parse_push_target(&raw) {
                Some(value) => {
                    config.push_target = value;
                    sources.push(ENV_PUSH_TARGET.to_string());
                }
                None => sources.push(format!(
                    "{ENV_PUSH_TARGET}:invalid({raw})->{}",
                    config.push_target.as_str()
                )),
            }
        }

        ResolvedEmbedConfig { config, sources }
    }
}

fn parse_positive_f64(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const ALL_KEYS: [&str; 5] = [
        ENV_DEFAULT_HEIGHT,
        ENV_FRAME_PADDING,
        ENV_EXPIRY_SKEW_MS,
        ENV_HIDE_CHART_CONTROLS,
        ENV_PUSH_TARGET,
    ];

    fn with_env<T>(overrides: &[(&str, Option<&str>)], test: impl FnOnce() -> T) -> T {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = ALL_KEYS
            .iter()
            .map(|key| (*key, std::env::var(key).ok()))
            .collect::<Vec<_>>();

        for key in ALL_KEYS {
            unsafe { std::env::remove_var(key) };
        }
        for (key, value) in overrides {
            if let Some(value) = value {
                unsafe { std::env::set_var(key, value) };
            }
        }

        let result = test();

        for (key, value) in previous {
            if let Some(value) = value {
                unsafe { std::env::set_var(key, value) };
            } else {
                unsafe { std::env::remove_var(key) };
            }
        }

        result
    }

    #[test]
    fn defaults_without_env() {
        with_env(&[], || {
            let resolved = EmbedConfig::from_env();
            assert_eq!(resolved.config, EmbedConfig::default());
            assert!(resolved.sources.is_empty());
        });
    }

    #[test]
    fn env_overrides_are_applied_and_recorded() {
        with_env(
            &[
                (ENV_DEFAULT_HEIGHT, Some(" 640 ")),
                (ENV_HIDE_CHART_CONTROLS, Some("yes")),
                (ENV_PUSH_TARGET, Some("loaded-chart")),
            ],
            || {
                let resolved = EmbedConfig::from_env();
                assert_eq!(resolved.config.default_height, 640.0);
                assert!(resolved.config.hide_chart_controls);
                assert_eq!(resolved.config.push_target, PushTarget::LoadedChart);
                assert_eq!(
                    resolved.sources,
                    vec![
                        ENV_DEFAULT_HEIGHT.to_string(),
                        ENV_HIDE_CHART_CONTROLS.to_string(),
                        ENV_PUSH_TARGET.to_string(),
                    ]
                );
            },
        );
    }

    #[test]
    fn invalid_env_values_keep_defaults() {
        with_env(
            &[
                (ENV_DEFAULT_HEIGHT, Some("-5")),
                (ENV_PUSH_TARGET, Some("sideways")),
            ],
            || {
                let resolved = EmbedConfig::from_env();
                assert_eq!(resolved.config.default_height, DEFAULT_HEIGHT);
                assert_eq!(resolved.config.push_target, PushTarget::ActiveCandidate);
                assert_eq!(
                    resolved.sources,
                    vec![
                        format!("{ENV_DEFAULT_HEIGHT}:invalid(-5)"),
                        format!("{ENV_PUSH_TARGET}:invalid(sideways)->active_candidate"),
                    ]
                );
            },
        );
    }

    #[test]
    fn config_deserializes_partial_camel_case_json() {
        let config: EmbedConfig = serde_json::from_value(serde_json::json!({
            "defaultHeight": 500,
            "pushTarget": "loadedChart"
        }))
        .expect("config json");
        assert_eq!(config.default_height, 500.0);
        assert_eq!(config.push_target, PushTarget::LoadedChart);
        assert_eq!(config.iframe_title, DEFAULT_IFRAME_TITLE);
        assert_eq!(config.health_check_delay_ms, DEFAULT_HEALTH_CHECK_DELAY_MS);
    }
}
