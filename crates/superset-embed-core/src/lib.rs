//! Session controller for Superset dashboards embedded in a chat host page.
//!
//! The crate is host-agnostic: the page, the embed SDK, the HTTP backend and
//! the task runtime all come in through traits, so the same session runs in
//! the browser shell and under a `LocalPool` in tests.

pub mod api;
pub mod candidate;
pub mod config;
pub mod credential;
pub mod dashboards;
pub mod embed;
pub mod error;
pub mod geometry;
pub mod host;
pub mod push;
pub mod response;
pub mod session;

pub use api::{
    DashboardListRequest, EnvelopeError, GuestTokenRequest, PushChartRequest, SupersetApi,
    decode_dashboards, decode_push_ack, error_body_text, unwrap_envelope,
};
pub use candidate::{CandidateOption, CandidateSelection, candidate_options, resolve_candidates};
pub use config::{EmbedConfig, PushTarget, ResolvedEmbedConfig};
pub use credential::{Credential, CredentialCache, GuestTokenProvider, extract_guest_token};
pub use dashboards::{DashboardDirectory, DashboardMenuItem, DashboardSupply};
pub use embed::{
    ContentSize, ContentSizeProbe, DashboardUiConfig, EmbedDriver, EmbedInstance, EmbedPhase,
    EmbedRequest, EmbedSessionManager, EmbedTarget, ThemeModeSetter,
};
pub use error::{ApiError, CredentialError, EmbedError, SessionFailure};
pub use geometry::{ThemeMarkers, ThemeMode};
pub use host::{FrameStyle, HostSurface, MountPoint, Notice, NoticeLevel, Notifier, TaskHost};
pub use push::{PushController, PushOutcome};
pub use response::{DashboardRef, ParamOption, SubjectId, SupersetChartResponse, VizCandidate, WebPage};
pub use session::{SessionCollaborators, SessionView, SupersetChartSession};
