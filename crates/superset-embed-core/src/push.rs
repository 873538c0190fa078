use std::cell::Cell;
use std::rc::Rc;

use tracing::{info, warn};

use crate::api::{PushChartRequest, SupersetApi};
use crate::config::PushTarget;
use crate::error::ApiError;
use crate::host::{Notice, Notifier};
use crate::response::{SupersetChartResponse, VizCandidate};

/// Chart id a push should send under `policy`.
#[must_use]
pub fn push_chart_id(
    policy: PushTarget,
    active: Option<&VizCandidate>,
    response: &SupersetChartResponse,
) -> Option<i64> {
    match (policy, active) {
        (PushTarget::ActiveCandidate, Some(candidate)) => candidate.chart_id,
        (PushTarget::ActiveCandidate, None) => response.chart_id,
        (PushTarget::LoadedChart, active) => response
            .chart_id
            .or_else(|| active.and_then(|candidate| candidate.chart_id)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// No dashboard chosen; nothing happened.
    Skipped,
    MissingChart,
    Pushed,
    Failed,
}

/// Sends the active chart to a dashboard. Has its own loading flag so a push
/// never blocks embedding or the dashboard list. A rejected push comes back
/// as the error for the caller to report.
pub struct PushController {
    api: Rc<dyn SupersetApi>,
    notifier: Rc<dyn Notifier>,
    loading: Cell<bool>,
}

impl PushController {
    pub fn new(api: Rc<dyn SupersetApi>, notifier: Rc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            loading: Cell::new(false),
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    pub async fn push(
        &self,
        plugin_id: Option<i64>,
        dashboard_id: Option<i64>,
        chart_id: Option<i64>,
    ) -> Result<PushOutcome, ApiError> {
        let Some(dashboard_id) = dashboard_id.filter(|id| *id != 0) else {
            return Ok(PushOutcome::Skipped);
        };
        let Some(chart_id) = chart_id.filter(|id| *id != 0) else {
            self.notifier.notify(Notice::MissingChart);
            return Ok(PushOutcome::MissingChart);
        };

        self.loading.set(true);
        let result = self
            .api
            .push_chart_to_dashboard(PushChartRequest {
                plugin_id,
                dashboard_id,
                chart_id,
            })
            .await;
        self.loading.set(false);

        match result {
            Ok(()) => {
                info!(dashboard_id, chart_id, "chart pushed to dashboard");
                self.notifier.notify(Notice::PushSucceeded);
                Ok(PushOutcome::Pushed)
            }
            Err(error) => {
                warn!(dashboard_id, chart_id, %error, "chart push failed");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DashboardListRequest, GuestTokenRequest};
    use crate::response::DashboardRef;
    use async_trait::async_trait;
    use futures::executor::block_on;
    use serde_json::Value;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingApi {
        pushes: RefCell<Vec<PushChartRequest>>,
        fail: bool,
    }

    #[async_trait(?Send)]
    impl SupersetApi for RecordingApi {
        async fn fetch_guest_token(&self, _request: GuestTokenRequest) -> Result<Value, ApiError> {
            Ok(Value::Null)
        }

        async fn fetch_dashboards(
            &self,
            _request: DashboardListRequest,
        ) -> Result<Vec<DashboardRef>, ApiError> {
            Ok(Vec::new())
        }

        async fn push_chart_to_dashboard(&self, request: PushChartRequest) -> Result<(), ApiError> {
            self.pushes.borrow_mut().push(request);
            if self.fail {
                Err(ApiError::new(500, "dashboard locked"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct Notices(RefCell<Vec<Notice>>);

    impl Notifier for Notices {
        fn notify(&self, notice: Notice) {
            self.0.borrow_mut().push(notice);
        }
    }

    fn controller(fail: bool) -> (PushController, Rc<RecordingApi>, Rc<Notices>) {
        let api = Rc::new(RecordingApi {
            fail,
            ..RecordingApi::default()
        });
        let notices = Rc::new(Notices::default());
        let controller = PushController::new(api.clone(), notices.clone());
        (controller, api, notices)
    }

    #[test]
    fn missing_chart_skips_network_and_notifies() {
        let (controller, api, notices) = controller(false);
        let outcome = block_on(controller.push(Some(1), Some(5), None));
        assert_eq!(outcome, Ok(PushOutcome::MissingChart));
        assert!(api.pushes.borrow().is_empty());
        assert_eq!(notices.0.borrow().as_slice(), [Notice::MissingChart]);
    }

    #[test]
    fn missing_dashboard_is_a_silent_no_op() {
        let (controller, api, notices) = controller(false);
        assert_eq!(block_on(controller.push(Some(1), None, Some(9))), Ok(PushOutcome::Skipped));
        assert!(api.pushes.borrow().is_empty());
        assert!(notices.0.borrow().is_empty());
    }

    #[test]
    fn push_sends_identity_and_reports_result() {
        let (controller, api, notices) = controller(false);
        assert_eq!(
            block_on(controller.push(Some(3), Some(5), Some(22))),
            Ok(PushOutcome::Pushed)
        );
        assert_eq!(
            api.pushes.borrow().as_slice(),
            [PushChartRequest {
                plugin_id: Some(3),
                dashboard_id: 5,
                chart_id: 22,
            }]
        );
        assert_eq!(notices.0.borrow().as_slice(), [Notice::PushSucceeded]);
        assert!(!controller.is_loading());
    }

    #[test]
    fn failed_push_returns_the_error_and_clears_loading() {
        let (controller, _api, notices) = controller(true);
        assert_eq!(
            block_on(controller.push(Some(3), Some(5), Some(22))),
            Err(ApiError::new(500, "dashboard locked"))
        );
        assert!(notices.0.borrow().is_empty());
        assert!(!controller.is_loading());
    }

    #[test]
    fn push_target_policy_selects_chart_identity() {
        let response = SupersetChartResponse {
            chart_id: Some(11),
            ..SupersetChartResponse::default()
        };
        let switched = VizCandidate {
            chart_id: Some(22),
            ..VizCandidate::default()
        };
        assert_eq!(
            push_chart_id(PushTarget::ActiveCandidate, Some(&switched), &response),
            Some(22)
        );
        assert_eq!(
            push_chart_id(PushTarget::LoadedChart, Some(&switched), &response),
            Some(11)
        );
        assert_eq!(push_chart_id(PushTarget::ActiveCandidate, None, &response), Some(11));
    }
}
