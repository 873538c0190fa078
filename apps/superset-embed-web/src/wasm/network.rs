use super::*;

const REQUEST_ID_HEADER: &str = "x-request-id";
const GUEST_TOKEN_PATH: &str = "/guest-token";
const DASHBOARDS_PATH: &str = "/dashboards";
const DASHBOARD_PUSH_PATH: &str = "/dashboard/push";

/// Chat backend reached through `fetch`, same origin unless configured.
pub(super) struct BrowserApi {
    base_url: String,
    api_prefix: String,
    bearer_token: Option<String>,
    request_attempts: u32,
}

impl BrowserApi {
    pub(super) fn new(config: &BrowserConfig) -> Self {
        Self {
            base_url: config.api_base_url.trim().trim_end_matches('/').to_string(),
            api_prefix: config.api_prefix().trim_end_matches('/').to_string(),
            bearer_token: config
                .bearer_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(ToString::to_string),
            request_attempts: config
                .request_attempts
                .unwrap_or(DEFAULT_REQUEST_ATTEMPTS)
                .max(1),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}{path}", self.base_url, self.api_prefix)
    }

    async fn post_json<T: Serialize>(&self, path: &str, payload: &T) -> Result<Value, ApiError> {
        let body = serde_json::to_string(payload).map_err(|error| {
            ApiError::new(0, format!("failed to encode request: {error}")).with_code("encode_failed")
        })?;
        let url = self.endpoint(path);
        let mut last_error: Option<ApiError> = None;

        for attempt in 0..self.request_attempts {
            let request_id = generate_request_id();
            let mut request = Request::post(&url)
                .header("content-type", "application/json")
                .header(REQUEST_ID_HEADER, &request_id);
            if let Some(token) = self.bearer_token.as_deref() {
                request = request.header("authorization", &format!("Bearer {token}"));
            }
            let sent = match request.body(body.clone()) {
                Ok(request) => request.send().await,
                Err(error) => return Err(map_network_error(error)),
            };
            match sent {
                Ok(response) => {
                    debug!(path, %request_id, status = response.status(), "superset api response");
                    return decode_json_response(response).await;
                }
                Err(error) => {
                    warn!(path, %request_id, attempt, error = %error, "superset api send failed");
                    last_error = Some(map_network_error(error));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::network("request was not attempted")))
    }
}

#[async_trait(?Send)]
impl SupersetApi for BrowserApi {
    async fn fetch_guest_token(&self, request: GuestTokenRequest) -> Result<Value, ApiError> {
        self.post_json(GUEST_TOKEN_PATH, &request).await
    }

    async fn fetch_dashboards(
        &self,
        request: DashboardListRequest,
    ) -> Result<Vec<DashboardRef>, ApiError> {
        let payload = self.post_json(DASHBOARDS_PATH, &request).await?;
        decode_dashboards(payload).map_err(ApiError::from)
    }

    async fn push_chart_to_dashboard(&self, request: PushChartRequest) -> Result<(), ApiError> {
        let payload = self.post_json(DASHBOARD_PUSH_PATH, &request).await?;
        decode_push_ack(payload).map_err(ApiError::from)
    }
}

fn generate_request_id() -> String {
    let timestamp = js_sys::Date::now().floor() as u64;
    let random = (js_sys::Math::random() * 1_000_000.0).floor() as u64;
    format!("req_{timestamp}_{random:06}")
}

pub(super) fn map_network_error(error: gloo_net::Error) -> ApiError {
    ApiError::network(error.to_string())
}

pub(super) async fn decode_json_response(
    response: gloo_net::http::Response,
) -> Result<Value, ApiError> {
    let status = response.status();
    let raw = response.text().await.map_err(|error| {
        ApiError::new(status, error.to_string()).with_code("response_read_failed")
    })?;

    if !(200..=299).contains(&status) {
        return Err(ApiError::new(status, error_body_text(&raw)).with_code("http_error"));
    }
    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&raw).map_err(|error| {
        ApiError::new(status, format!("failed to decode response: {error}"))
            .with_code("decode_failed")
    })
}
