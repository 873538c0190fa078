//! Seams between the session and the page that hosts it.

use std::time::Duration;

use futures::future::LocalBoxFuture;
use serde::Serialize;

use crate::geometry::ThemeMarkers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient, non-blocking message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    EmbedFailed { detail: String },
    CredentialMissing { detail: String },
    DashboardListFailed { detail: String },
    MissingChart,
    PushSucceeded,
    PushFailed { detail: String },
}

impl Notice {
    #[must_use]
    pub fn level(&self) -> NoticeLevel {
        match self {
            Self::PushSucceeded => NoticeLevel::Success,
            _ => NoticeLevel::Error,
        }
    }

    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::EmbedFailed { .. } => "Superset embedding failed",
            Self::CredentialMissing { .. } => "Superset guest token is unavailable",
            Self::DashboardListFailed { .. } => "Failed to load dashboards",
            Self::MissingChart => "Chart information is missing",
            Self::PushSucceeded => "Pushed to dashboard",
            Self::PushFailed { .. } => "Push failed",
        }
    }
}

pub trait Notifier {
    fn notify(&self, notice: Notice);
}

/// Read access to the host page plus the session's visible outputs.
pub trait HostSurface: Notifier {
    fn viewport_height(&self) -> Option<f64>;

    /// Distance from the viewport top to the mount point container.
    fn container_top(&self) -> Option<f64>;

    fn theme_markers(&self) -> ThemeMarkers;

    /// Background colour candidates in priority order (CSS custom
    /// properties first, then the resolved body background). Empty strings
    /// are allowed and skipped.
    fn background_candidates(&self) -> Vec<String>;

    fn apply_height(&self, height: f64);

    fn apply_background(&self, color: &str);

    /// Toggles the terminal "embed info missing" placeholder.
    fn show_missing_embed_info(&self, missing: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStyle {
    pub title: String,
    pub background: Option<String>,
}

/// The container element the external frame is mounted into. Only the
/// embed session manager writes to it.
pub trait MountPoint {
    fn id(&self) -> &str;

    /// Removes every child, including a frame left behind by an unmount.
    fn clear(&self);

    /// Styles the mounted frame (full size, borderless, block, titled).
    fn style_frame(&self, style: &FrameStyle);

    fn set_frame_background(&self, color: &str);
}

/// Cooperative task runtime of the host (browser event loop, test pool).
pub trait TaskHost {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;

    /// Resolves after the next layout/paint opportunity.
    fn next_frame(&self) -> LocalBoxFuture<'static, ()> {
        self.sleep(Duration::from_millis(0))
    }
}
