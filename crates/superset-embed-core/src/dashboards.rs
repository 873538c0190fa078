//! Push destinations: supplied by the response or fetched lazily per plugin.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::api::{DashboardListRequest, SupersetApi};
use crate::error::ApiError;
use crate::response::{DashboardRef, SupersetChartResponse};

pub const EMPTY_MENU_KEY: &str = "empty";
pub const EMPTY_MENU_LABEL: &str = "No dashboards";

/// Drops dashboards created internally for single-chart embedding, whose
/// titles start with `{prefix}{subject_name}_`.
#[must_use]
pub fn filter_temporary_dashboards(
    dashboards: &[DashboardRef],
    subject_name: Option<&str>,
    prefix: &str,
) -> Vec<DashboardRef> {
    let Some(name) = subject_name.filter(|name| !name.is_empty()) else {
        return dashboards.to_vec();
    };
    let reserved = format!("{prefix}{name}_");
    dashboards
        .iter()
        .filter(|dashboard| !dashboard.title.starts_with(&reserved))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMenuItem {
    pub key: String,
    pub label: String,
    pub disabled: bool,
}

#[must_use]
pub fn dashboard_menu(dashboards: &[DashboardRef]) -> Vec<DashboardMenuItem> {
    if dashboards.is_empty() {
        return vec![DashboardMenuItem {
            key: EMPTY_MENU_KEY.to_string(),
            label: EMPTY_MENU_LABEL.to_string(),
            disabled: true,
        }];
    }
    dashboards
        .iter()
        .map(|dashboard| DashboardMenuItem {
            key: dashboard.id.to_string(),
            label: if dashboard.title.is_empty() {
                format!("Dashboard {}", dashboard.id)
            } else {
                dashboard.title.clone()
            },
            disabled: false,
        })
        .collect()
}

#[must_use]
pub fn parse_menu_key(key: &str) -> Option<i64> {
    key.trim().parse::<i64>().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DashboardSupply {
    /// No list and nothing to fetch from.
    #[default]
    Unavailable,
    /// Delivered with the response; final even when empty.
    Provided(Vec<DashboardRef>),
    Loading { plugin_id: i64 },
    Loaded {
        plugin_id: i64,
        dashboards: Vec<DashboardRef>,
    },
    Failed { plugin_id: i64 },
}

impl DashboardSupply {
    #[must_use]
    pub fn dashboards(&self) -> &[DashboardRef] {
        match self {
            Self::Provided(dashboards) | Self::Loaded { dashboards, .. } => dashboards,
            _ => &[],
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    fn plugin_id(&self) -> Option<i64> {
        match self {
            Self::Loading { plugin_id }
            | Self::Loaded { plugin_id, .. }
            | Self::Failed { plugin_id } => Some(*plugin_id),
            _ => None,
        }
    }
}

/// Tracks where the push-destination list comes from.
pub struct DashboardDirectory {
    api: Rc<dyn SupersetApi>,
    supply: RefCell<DashboardSupply>,
}

impl DashboardDirectory {
    pub fn new(api: Rc<dyn SupersetApi>) -> Self {
        Self {
            api,
            supply: RefCell::new(DashboardSupply::Unavailable),
        }
    }

    #[must_use]
    pub fn supply(&self) -> DashboardSupply {
        self.supply.borrow().clone()
    }

    /// Applies a response. Returns the plugin id to fetch for when the list
    /// is absent and nothing for that plugin is loaded or loading yet.
    pub fn apply_response(&self, response: &SupersetChartResponse) -> Option<i64> {
        let mut supply = self.supply.borrow_mut();
        if let Some(dashboards) = &response.dashboards {
            *supply = DashboardSupply::Provided(dashboards.clone());
            return None;
        }
        let Some(plugin_id) = response.plugin_id else {
            *supply = DashboardSupply::Unavailable;
            return None;
        };
        if supply.plugin_id() == Some(plugin_id) && !matches!(*supply, DashboardSupply::Failed { .. }) {
            return None;
        }
        *supply = DashboardSupply::Loading { plugin_id };
        Some(plugin_id)
    }

    /// Fetches the list for `plugin_id`. A result for a plugin that is no
    /// longer the one being loaded is dropped.
    pub async fn load(&self, plugin_id: i64) -> Result<(), ApiError> {
        debug!(plugin_id, "fetching dashboards");
        let result = self
            .api
            .fetch_dashboards(DashboardListRequest { plugin_id })
            .await;

        let mut supply = self.supply.borrow_mut();
        if *supply != (DashboardSupply::Loading { plugin_id }) {
            debug!(plugin_id, "dropping stale dashboard list");
            return Ok(());
        }
        match result {
            Ok(dashboards) => {
                *supply = DashboardSupply::Loaded {
                    plugin_id,
                    dashboards,
                };
                Ok(())
            }
            Err(error) => {
                warn!(plugin_id, %error, "dashboard list failed");
                *supply = DashboardSupply::Failed { plugin_id };
                Err(error)
            }
        }
    }
}
