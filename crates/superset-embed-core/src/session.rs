//! The session orchestrator: one embedded chart bound to one subject.
//!
//! Every trigger (new input, candidate switch, resize, theme mutation,
//! refresh, push) funnels into a few reconciliation routines on
//! the session internals. Async work runs on the host's [`TaskHost`] and checks
//! the mount ticket before touching shared state.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, info};

use crate::api::SupersetApi;
use crate::candidate::{CandidateOption, CandidateSelection, candidate_options, resolve_candidates};
use crate::config::EmbedConfig;
use crate::credential::{CredentialCache, GuestTokenProvider};
use crate::dashboards::{
    DashboardDirectory, DashboardMenuItem, dashboard_menu, filter_temporary_dashboards,
    parse_menu_key,
};
use crate::embed::{
    DashboardUiConfig, EmbedDriver, EmbedPhase, EmbedRequest, EmbedSessionManager,
    EmbedTarget, MountOutcome, MountTicket,
};
use crate::error::SessionFailure;
use crate::geometry::{
    GeometryState, ThemeMode, compute_available_height, reconcile_height, resolve_background,
    resolve_min_height, resolve_theme_mode,
};
use crate::host::{FrameStyle, HostSurface, MountPoint, Notice, Notifier, TaskHost};
use crate::push::{PushController, PushOutcome, push_chart_id};
use crate::response::{SubjectId, SupersetChartResponse, VizCandidate};

/// Everything a session talks to.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub api: Rc<dyn SupersetApi>,
    pub driver: Rc<dyn EmbedDriver>,
    pub mount_point: Rc<dyn MountPoint>,
    pub host: Rc<dyn HostSurface>,
    pub tasks: Rc<dyn TaskHost>,
}

/// Render model for the host chrome around the frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub phase: EmbedPhase,
    pub height: f64,
    pub background: Option<String>,
    pub theme: Option<ThemeMode>,
    pub missing_embed_info: bool,
    pub candidates: Vec<CandidateOption>,
    pub active_candidate: usize,
    pub show_candidate_switch: bool,
    pub show_push: bool,
    pub dashboard_menu: Vec<DashboardMenuItem>,
    pub dashboards_loading: bool,
    pub push_loading: bool,
    pub last_failure: Option<String>,
}

/// Inputs of the mount that is live or in flight.
#[derive(Debug, Clone, PartialEq)]
struct AppliedEmbed {
    target: EmbedTarget,
    ui_config: DashboardUiConfig,
}

#[derive(Default)]
struct SessionState {
    subject: Option<SubjectId>,
    response: SupersetChartResponse,
    candidates: Vec<VizCandidate>,
    selection: CandidateSelection,
    min_height: f64,
    geometry: GeometryState,
    applied: Option<AppliedEmbed>,
    missing_embed_info: bool,
    last_failure: Option<String>,
    height_sequence: u64,
}

impl SessionState {
    fn active(&self) -> Option<&VizCandidate> {
        self.selection.active(&self.candidates)
    }

    fn initial_token(&self) -> Option<String> {
        match self.active() {
            Some(candidate) => candidate.guest_token.clone(),
            None => self.response.guest_token.clone(),
        }
    }
}

struct HostNotifier(Rc<dyn HostSurface>);

impl Notifier for HostNotifier {
    fn notify(&self, notice: Notice) {
        self.0.notify(notice);
    }
}

struct SessionInner {
    config: EmbedConfig,
    host: Rc<dyn HostSurface>,
    tasks: Rc<dyn TaskHost>,
    credentials: Rc<CredentialCache>,
    embed: EmbedSessionManager,
    dashboards: DashboardDirectory,
    pusher: PushController,
    state: RefCell<SessionState>,
}

/// Owning handle of a session. Dropping it tears the session down.
pub struct SupersetChartSession {
    inner: Rc<SessionInner>,
}

impl SupersetChartSession {
    pub fn new(config: EmbedConfig, collaborators: SessionCollaborators) -> Self {
        let SessionCollaborators {
            api,
            driver,
            mount_point,
            host,
            tasks,
        } = collaborators;
        let credentials =
            Rc::new(CredentialCache::new(Rc::clone(&api)).with_skew_ms(config.expiry_skew_ms));
        let notifier: Rc<dyn Notifier> = Rc::new(HostNotifier(Rc::clone(&host)));
        let state = SessionState {
            min_height: config.default_height,
            ..SessionState::default()
        };
        Self {
            inner: Rc::new(SessionInner {
                embed: EmbedSessionManager::new(driver, mount_point),
                dashboards: DashboardDirectory::new(Rc::clone(&api)),
                pusher: PushController::new(api, notifier),
                credentials,
                host,
                tasks,
                config,
                state: RefCell::new(state),
            }),
        }
    }

    /// Feeds a (possibly new) response for `subject`. A subject change resets
    /// the candidate selection and every cached credential.
    pub fn set_input(&self, subject: SubjectId, response: SupersetChartResponse) {
        self.inner.set_input(subject, response);
    }

    pub fn select_candidate(&self, index: usize) {
        self.inner.select_candidate(index);
    }

    /// Re-evaluates the embed even when its inputs are unchanged; the only
    /// way to retry a failed mount for the same target.
    pub fn refresh(&self) {
        self.inner.reconcile(true);
    }

    /// Window resize or an explicit resize request from the host.
    pub fn resize(&self) {
        self.inner.request_height_sync();
    }

    /// Host theme attributes or the OS colour scheme changed.
    pub fn theme_changed(&self) {
        let inner = Rc::clone(&self.inner);
        self.inner
            .tasks
            .spawn_local(async move { inner.sync_theme().await }.boxed_local());
    }

    pub async fn push(&self, dashboard_id: Option<i64>) -> PushOutcome {
        self.inner.push(dashboard_id).await
    }

    /// Push triggered from a dashboard menu item; placeholder keys do nothing.
    pub async fn push_menu_key(&self, key: &str) -> PushOutcome {
        match parse_menu_key(key) {
            Some(dashboard_id) => self.inner.push(Some(dashboard_id)).await,
            None => PushOutcome::Skipped,
        }
    }

    pub fn teardown(&self) {
        self.inner.teardown();
    }

    #[must_use]
    pub fn phase(&self) -> EmbedPhase {
        self.inner.embed.phase()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionView {
        self.inner.snapshot()
    }
}

impl Drop for SupersetChartSession {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl SessionInner {
    fn set_input(self: &Rc<Self>, subject: SubjectId, response: SupersetChartResponse) {
        if self.embed.is_torn_down() {
            return;
        }

        let candidates = resolve_candidates(&response);
        let min_height = resolve_min_height(response.params(), self.config.default_height);
        let plugin_id = response.plugin_id;
        let (subject_changed, min_height_changed) = {
            let mut state = self.state.borrow_mut();
            let subject_changed = state.subject.as_ref() != Some(&subject);
            if subject_changed {
                state.applied = None;
                state.last_failure = None;
            }
            state.selection.sync(&subject, candidates.len());
            let min_height_changed = state.min_height.to_bits() != min_height.to_bits();
            state.subject = Some(subject);
            state.candidates = candidates;
            state.min_height = min_height;
            (subject_changed, min_height_changed)
        };
        if subject_changed {
            info!(plugin_id = ?plugin_id, "session subject changed");
            self.credentials.reset();
        }
        self.credentials.set_plugin_id(plugin_id);

        if let Some(plugin_id) = self.dashboards.apply_response(&response) {
            self.spawn_dashboard_load(plugin_id);
        }
        self.state.borrow_mut().response = response;
        self.seed_active_token();
        self.reconcile(false);

        if min_height_changed && self.embed.instance().is_some() {
            self.request_height_sync();
        }
    }

    fn select_candidate(self: &Rc<Self>, index: usize) {
        let moved = self.state.borrow_mut().selection.select(index);
        if !moved {
            return;
        }
        debug!(index, "candidate switched");
        self.seed_active_token();
        self.reconcile(false);
    }

    fn seed_active_token(&self) {
        let seed = {
            let state = self.state.borrow();
            EmbedTarget::resolve(state.active(), &state.response)
                .map(|target| (target.embed_id, state.initial_token()))
        };
        if let Some((embed_id, token)) = seed {
            self.credentials.seed_initial(&embed_id, token.as_deref());
        }
    }

    fn desired_embed(&self) -> Option<AppliedEmbed> {
        let state = self.state.borrow();
        let target = EmbedTarget::resolve(state.active(), &state.response)?;
        let ui_config =
            DashboardUiConfig::new(self.config.hide_chart_controls, state.response.params());
        Some(AppliedEmbed { target, ui_config })
    }

    /// Brings the live frame in line with the current inputs. Unchanged
    /// inputs are a no-op unless `force` is set or nothing is mounted.
    fn reconcile(self: &Rc<Self>, force: bool) {
        if self.embed.is_torn_down() {
            return;
        }

        let Some(desired) = self.desired_embed() else {
            self.state.borrow_mut().applied = None;
            self.embed.unmount();
            self.set_missing_embed_info(true);
            return;
        };
        self.set_missing_embed_info(false);

        {
            let mut state = self.state.borrow_mut();
            let unchanged = state.applied.as_ref() == Some(&desired);
            if unchanged && !force && self.embed.phase() != EmbedPhase::Idle {
                return;
            }
            state.applied = Some(desired.clone());
            state.last_failure = None;
        }

        let AppliedEmbed { target, ui_config } = desired;
        let Some(ticket) = self.embed.begin(target.clone()) else {
            return;
        };
        info!(embed_id = %target.embed_id, domain = %target.domain, generation = ticket.generation(), "mounting superset embed");
        let request = EmbedRequest {
            mount_point_id: self.embed.mount_point_id(),
            iframe_title: self.config.iframe_title.clone(),
            ui_config,
            guest_token: GuestTokenProvider::new(Rc::clone(&self.credentials), target.clone()),
            target,
        };
        let inner = Rc::clone(self);
        self.tasks
            .spawn_local(async move { inner.run_mount(ticket, request).await }.boxed_local());
    }

    fn set_missing_embed_info(&self, missing: bool) {
        let changed = {
            let mut state = self.state.borrow_mut();
            let changed = state.missing_embed_info != missing;
            state.missing_embed_info = missing;
            changed
        };
        if changed {
            if missing {
                debug!(failure = %SessionFailure::MissingEmbedTarget, "no embeddable target");
            }
            self.host.show_missing_embed_info(missing);
        }
    }

    async fn run_mount(self: Rc<Self>, ticket: MountTicket, request: EmbedRequest) {
        match self.embed.mount(ticket, request).await {
            MountOutcome::Mounted(_) => self.after_mount(ticket).await,
            MountOutcome::Failed(error) => self.report(SessionFailure::from_mount_error(error)),
            MountOutcome::Superseded => {}
        }
    }

    async fn after_mount(&self, ticket: MountTicket) {
        self.sync_theme().await;
        if !self.embed.is_current(ticket) {
            return;
        }
        let background = self.state.borrow().geometry.background().map(ToString::to_string);
        self.embed.style_frame(&FrameStyle {
            title: self.config.iframe_title.clone(),
            background,
        });
        self.sync_height(ticket).await;

        self.tasks.next_frame().await;
        self.tasks
            .sleep(Duration::from_millis(self.config.settle_delay_ms))
            .await;
        if !self.embed.is_current(ticket) {
            return;
        }
        self.sync_height(ticket).await;

        self.tasks
            .sleep(Duration::from_millis(self.config.health_check_delay_ms))
            .await;
        if !self.embed.is_current(ticket) {
            return;
        }
        self.sync_height(ticket).await;
    }

    fn request_height_sync(self: &Rc<Self>) {
        if self.state.borrow().applied.is_none() {
            return;
        }
        let Some(ticket) = self.embed.current_ticket() else {
            return;
        };
        let inner = Rc::clone(self);
        self.tasks
            .spawn_local(async move { inner.sync_height(ticket).await }.boxed_local());
    }

    /// Recomputes the frame height for the mount behind `ticket`. Overlapping
    /// calls are coalesced: only the most recently started one writes, and
    /// nothing is written once the ticket is stale or the session torn down.
    async fn sync_height(&self, ticket: MountTicket) {
        if !self.embed.is_current(ticket) {
            return;
        }
        let (sequence, min_height) = {
            let mut state = self.state.borrow_mut();
            state.height_sequence += 1;
            (state.height_sequence, state.min_height)
        };
        let base = compute_available_height(
            self.host.viewport_height(),
            self.host.container_top(),
            self.config.frame_padding,
            min_height,
        );

        let instance = self.embed.instance();
        let size_query = instance
            .as_deref()
            .and_then(|instance| instance.content_size_probe());
        let reported = match size_query {
            Some(query) => match query.content_size().await {
                Ok(size) => size.height,
                Err(error) => {
                    let failure = SessionFailure::GeometryQueryFailure(error);
                    debug!(%failure, "falling back to computed height");
                    None
                }
            },
            None => None,
        };

        if !self.embed.is_current(ticket) {
            debug!(generation = ticket.generation(), "dropping stale height sync");
            return;
        }
        let height = reconcile_height(base, reported);
        let changed = {
            let mut state = self.state.borrow_mut();
            if state.height_sequence != sequence {
                return;
            }
            state.geometry.update_height(height)
        };
        if changed {
            debug!(height, "frame height updated");
            self.host.apply_height(height);
        }
    }

    async fn sync_theme(&self) {
        if self.embed.is_torn_down() {
            return;
        }
        let mode = resolve_theme_mode(&self.host.theme_markers());
        let background = resolve_background(&self.host.background_candidates());
        let background_changed = {
            let mut state = self.state.borrow_mut();
            if state.geometry.update_theme(mode) {
                debug!(mode = mode.as_str(), "host theme resolved");
            }
            state.geometry.update_background(&background)
        };
        if background_changed {
            self.host.apply_background(&background);
        }
        self.embed.set_frame_background(&background);

        let Some(instance) = self.embed.instance() else {
            return;
        };
        let Some(setter) = instance.theme_setter() else {
            return;
        };
        if let Err(error) = setter.set_theme_mode(mode).await {
            let failure = SessionFailure::ThemeApplyFailure(error);
            debug!(%failure, "theme sync skipped");
        }
    }

    fn spawn_dashboard_load(self: &Rc<Self>, plugin_id: i64) {
        let inner = Rc::clone(self);
        self.tasks.spawn_local(
            async move {
                let result = inner.dashboards.load(plugin_id).await;
                if let Err(error) = result {
                    if !inner.embed.is_torn_down() {
                        inner.report(SessionFailure::DashboardListFailure(error));
                    }
                }
            }
            .boxed_local(),
        );
    }

    fn report(&self, failure: SessionFailure) {
        let notice = match &failure {
            SessionFailure::CredentialMissing(error) => Some(Notice::CredentialMissing {
                detail: error.to_string(),
            }),
            SessionFailure::MountFailure(error) => Some(Notice::EmbedFailed {
                detail: error.to_string(),
            }),
            SessionFailure::DashboardListFailure(error) => Some(Notice::DashboardListFailed {
                detail: error.to_string(),
            }),
            SessionFailure::PushFailure(error) => Some(Notice::PushFailed {
                detail: error.to_string(),
            }),
            SessionFailure::MissingEmbedTarget
            | SessionFailure::GeometryQueryFailure(_)
            | SessionFailure::ThemeApplyFailure(_) => None,
        };
        self.state.borrow_mut().last_failure = Some(failure.to_string());
        if let Some(notice) = notice.filter(|_| failure.is_user_visible()) {
            self.host.notify(notice);
        }
    }

    async fn push(&self, dashboard_id: Option<i64>) -> PushOutcome {
        let (plugin_id, chart_id) = {
            let state = self.state.borrow();
            (
                state.response.plugin_id,
                push_chart_id(self.config.push_target, state.active(), &state.response),
            )
        };
        match self.pusher.push(plugin_id, dashboard_id, chart_id).await {
            Ok(outcome) => outcome,
            Err(error) => {
                if !self.embed.is_torn_down() {
                    self.report(SessionFailure::PushFailure(error));
                }
                PushOutcome::Failed
            }
        }
    }

    fn teardown(&self) {
        if self.embed.is_torn_down() {
            return;
        }
        info!("superset session torn down");
        self.embed.teardown();
        self.state.borrow_mut().applied = None;
    }

    fn snapshot(&self) -> SessionView {
        let state = self.state.borrow();
        let chart_id = push_chart_id(self.config.push_target, state.active(), &state.response);
        let supply = self.dashboards.supply();
        let dashboards = filter_temporary_dashboards(
            supply.dashboards(),
            state.response.name.as_deref(),
            &self.config.temporary_dashboard_prefix,
        );
        SessionView {
            phase: self.embed.phase(),
            height: state.geometry.height().unwrap_or(state.min_height),
            background: state.geometry.background().map(ToString::to_string),
            theme: state.geometry.theme(),
            missing_embed_info: state.missing_embed_info,
            candidates: candidate_options(&state.candidates),
            active_candidate: state.selection.index(),
            show_candidate_switch: state.candidates.len() > 1,
            show_push: !state.response.fallback
                && state.response.plugin_id.is_some()
                && chart_id.is_some(),
            dashboard_menu: dashboard_menu(&dashboards),
            dashboards_loading: supply.is_loading(),
            push_loading: self.pusher.is_loading(),
            last_failure: state.last_failure.clone(),
        }
    }
}
