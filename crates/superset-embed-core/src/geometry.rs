//! Frame height and theme reconciliation against the host page.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::response::ParamOption;

pub const HEIGHT_PARAM_KEY: &str = "height";
pub const FALLBACK_BACKGROUND: &str = "#ffffff";
pub const BACKGROUND_CSS_VARIABLES: [&str; 3] = [
    "--component-background",
    "--body-background",
    "--light-background",
];
/// Host attributes whose mutation may change the theme.
pub const THEME_ATTRIBUTE_FILTER: [&str; 3] = ["data-theme", "class", "style"];
pub const DARK_SCHEME_MEDIA_QUERY: &str = "(prefers-color-scheme: dark)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Theme hints read from the host document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeMarkers {
    /// `data-theme` attribute of the document element.
    pub theme_attribute: Option<String>,
    /// `dataset.theme` of the document element.
    pub dataset_theme: Option<String>,
    pub body_class: Option<String>,
    /// `None` when the host cannot evaluate media queries.
    pub prefers_dark: Option<bool>,
}

#[must_use]
pub fn resolve_theme_mode(markers: &ThemeMarkers) -> ThemeMode {
    let attribute = markers
        .theme_attribute
        .as_deref()
        .filter(|value| !value.is_empty())
        .or(markers.dataset_theme.as_deref())
        .unwrap_or_default()
        .to_lowercase();
    if attribute.contains("dark") {
        return ThemeMode::Dark;
    }
    if attribute.contains("light") {
        return ThemeMode::Light;
    }

    let body_class = markers.body_class.as_deref().unwrap_or_default();
    if body_class.contains("dark") {
        return ThemeMode::Dark;
    }
    if body_class.contains("light") {
        return ThemeMode::Light;
    }

    if markers.prefers_dark == Some(true) {
        ThemeMode::Dark
    } else {
        ThemeMode::Light
    }
}

/// First non-blank candidate, trimmed; white otherwise.
#[must_use]
pub fn resolve_background<S: AsRef<str>>(candidates: &[S]) -> String {
    candidates
        .iter()
        .map(|candidate| candidate.as_ref().trim())
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(FALLBACK_BACKGROUND)
        .to_string()
}

/// Minimum frame height from the forwarded `height` parameter.
#[must_use]
pub fn resolve_min_height(params: &[ParamOption], default_height: f64) -> f64 {
    let value = params
        .iter()
        .find(|option| option.is_forward() && option.key == HEIGHT_PARAM_KEY)
        .map(|option| &option.value);
    let numeric = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    numeric
        .filter(|height| height.is_finite() && *height > 0.0)
        .unwrap_or(default_height)
}

/// Height left between the container top and the viewport bottom, never
/// below `min_height`.
#[must_use]
pub fn compute_available_height(
    viewport_height: Option<f64>,
    container_top: Option<f64>,
    padding: f64,
    min_height: f64,
) -> f64 {
    let viewport = viewport_height
        .filter(|height| height.is_finite() && *height > 0.0)
        .unwrap_or(min_height);
    let top = container_top
        .filter(|top| top.is_finite())
        .map_or(0.0, |top| top.max(0.0));
    (viewport - top - padding).max(min_height)
}

/// Grows the computed height to the frame's reported content height.
#[must_use]
pub fn reconcile_height(base_height: f64, reported_height: Option<f64>) -> f64 {
    match reported_height {
        Some(reported) if reported.is_finite() && reported > base_height => reported,
        _ => base_height,
    }
}

/// Last values written to the host, so unchanged values are not re-applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryState {
    height: Option<f64>,
    background: Option<String>,
    theme: Option<ThemeMode>,
}

impl GeometryState {
    #[must_use]
    pub fn height(&self) -> Option<f64> {
        self.height
    }

    #[must_use]
    pub fn background(&self) -> Option<&str> {
        self.background.as_deref()
    }

    #[must_use]
    pub fn theme(&self) -> Option<ThemeMode> {
        self.theme
    }

    pub fn update_height(&mut self, height: f64) -> bool {
        if self.height.is_some_and(|current| current.to_bits() == height.to_bits()) {
            return false;
        }
        self.height = Some(height);
        true
    }

    pub fn update_background(&mut self, background: &str) -> bool {
        if self.background.as_deref() == Some(background) {
            return false;
        }
        self.background = Some(background.to_string());
        true
    }

    pub fn update_theme(&mut self, theme: ThemeMode) -> bool {
        if self.theme == Some(theme) {
            return false;
        }
        self.theme = Some(theme);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forward(key: &str, value: Value) -> ParamOption {
        ParamOption {
            param_type: Some("FORWARD".to_string()),
            key: key.to_string(),
            value,
        }
    }

    #[test]
    fn theme_attribute_wins_over_body_class_and_media() {
        let markers = ThemeMarkers {
            theme_attribute: Some("Dark-Blue".to_string()),
            dataset_theme: None,
            body_class: Some("light".to_string()),
            prefers_dark: Some(false),
        };
        assert_eq!(resolve_theme_mode(&markers), ThemeMode::Dark);
    }

    #[test]
    fn dataset_is_consulted_when_attribute_is_blank() {
        let markers = ThemeMarkers {
            theme_attribute: Some(String::new()),
            dataset_theme: Some("light".to_string()),
            body_class: Some("app dark".to_string()),
            prefers_dark: Some(true),
        };
        assert_eq!(resolve_theme_mode(&markers), ThemeMode::Light);
    }

    #[test]
    fn body_class_then_media_query_decide() {
        let markers = ThemeMarkers {
            body_class: Some("layout theme-dark".to_string()),
            ..ThemeMarkers::default()
        };
        assert_eq!(resolve_theme_mode(&markers), ThemeMode::Dark);

        let markers = ThemeMarkers {
            prefers_dark: Some(true),
            ..ThemeMarkers::default()
        };
        assert_eq!(resolve_theme_mode(&markers), ThemeMode::Dark);
        assert_eq!(resolve_theme_mode(&ThemeMarkers::default()), ThemeMode::Light);
    }

    #[test]
    fn background_takes_first_non_blank_candidate() {
        assert_eq!(resolve_background(&["", "  #1f1f1f ", "#fff"]), "#1f1f1f");
        assert_eq!(resolve_background::<&str>(&[]), FALLBACK_BACKGROUND);
        assert_eq!(resolve_background(&[" ", ""]), FALLBACK_BACKGROUND);
    }

    #[test]
    fn min_height_reads_forward_height_param() {
        let params = vec![
            ParamOption {
                param_type: Some("CUSTOM".to_string()),
                key: "height".to_string(),
                value: json!(300),
            },
            forward("height", json!("640")),
        ];
        assert_eq!(resolve_min_height(&params, 800.0), 640.0);
        assert_eq!(resolve_min_height(&[forward("height", json!(-1))], 800.0), 800.0);
        assert_eq!(resolve_min_height(&[forward("height", json!("tall"))], 800.0), 800.0);
        assert_eq!(resolve_min_height(&[], 800.0), 800.0);
    }

    #[test]
    fn available_height_subtracts_offset_and_padding() {
        assert_eq!(
            compute_available_height(Some(1200.0), Some(100.0), 24.0, 800.0),
            1076.0
        );
        assert_eq!(
            compute_available_height(Some(900.0), Some(300.0), 24.0, 800.0),
            800.0
        );
        assert_eq!(
            compute_available_height(Some(1200.0), Some(-50.0), 24.0, 400.0),
            1176.0
        );
        assert_eq!(compute_available_height(None, None, 24.0, 800.0), 800.0);
    }

    #[test]
    fn reported_content_height_only_grows_the_frame() {
        assert_eq!(reconcile_height(900.0, Some(1400.0)), 1400.0);
        assert_eq!(reconcile_height(900.0, Some(500.0)), 900.0);
        assert_eq!(reconcile_height(900.0, Some(f64::NAN)), 900.0);
        assert_eq!(reconcile_height(900.0, None), 900.0);
    }

    #[test]
    fn geometry_state_reports_only_real_changes() {
        let mut state = GeometryState::default();
        assert!(state.update_height(800.0));
        assert!(!state.update_height(800.0));
        assert!(state.update_height(820.0));
        assert!(state.update_background("#fff"));
        assert!(!state.update_background("#fff"));
        assert!(state.update_theme(ThemeMode::Dark));
        assert!(!state.update_theme(ThemeMode::Dark));
        assert_eq!(state.height(), Some(820.0));
    }
}
