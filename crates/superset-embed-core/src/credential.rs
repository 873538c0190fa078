//! Guest-token handling: extraction from tolerant payload shapes, expiry
//! decoding, and the per-target cache that arbitrates one-time reuse of a
//! token delivered with the response.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{GuestTokenRequest, SupersetApi};
use crate::config::DEFAULT_EXPIRY_SKEW_MS;
use crate::embed::EmbedTarget;
use crate::error::{CredentialError, EmbedError};

/// `exp` values at or below this are seconds; above it, milliseconds.
const MILLISECOND_EPOCH_THRESHOLD: f64 = 1_000_000_000_000.0;

pub type Clock = Rc<dyn Fn() -> u64>;

#[must_use]
pub fn epoch_millis_now() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at_ms: Option<u64>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at_ms = decode_token_expiry(&token);
        Self {
            token,
            expires_at_ms,
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn into_token(self) -> String {
        self.token
    }

    #[must_use]
    pub fn expires_at_ms(&self) -> Option<u64> {
        self.expires_at_ms
    }

    /// Unknown expiry never counts as expiring.
    #[must_use]
    pub fn is_expiring_soon(&self, now_ms: u64, skew_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|expires_at| {
            i128::from(expires_at) - i128::from(now_ms) < i128::from(skew_ms)
        })
    }
}

/// Pulls the bearer string out of a guest-token payload. Accepts a bare
/// string, `{token}`, or `{data: {token}}`, in that order.
#[must_use]
pub fn extract_guest_token(payload: &Value) -> Option<String> {
    let non_empty = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
    };

    non_empty(Some(payload))
        .or_else(|| non_empty(payload.get("token")))
        .or_else(|| non_empty(payload.get("data").and_then(|data| data.get("token"))))
}

/// Expiry instant in epoch milliseconds from a JWT-style token's `exp` claim.
/// Anything that does not decode yields `None`.
#[must_use]
pub fn decode_token_expiry(token: &str) -> Option<u64> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;

    let normalized = payload
        .trim_end_matches('=')
        .replace('+', "-")
        .replace('/', "_");
    let bytes = URL_SAFE_NO_PAD.decode(normalized.as_bytes()).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_f64()?;
    if !exp.is_finite() || exp <= 0.0 {
        return None;
    }

    let millis = if exp > MILLISECOND_EPOCH_THRESHOLD {
        exp
    } else {
        exp * 1000.0
    };
    Some(millis as u64)
}

#[must_use]
pub fn is_token_expiring_soon(token: &str, now_ms: u64, skew_ms: u64) -> bool {
    Credential::new(token).is_expiring_soon(now_ms, skew_ms)
}

fn missing_credential(payload: &Value) -> CredentialError {
    let field = |name: &str| {
        payload.get(name).and_then(|value| match value {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
    };
    CredentialError::Missing {
        code: field("code"),
        message: field("msg").or_else(|| field("message")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InitialToken {
    Pending(String),
    Consumed,
}

type CredentialFlight = Shared<LocalBoxFuture<'static, Result<Credential, CredentialError>>>;

#[derive(Default)]
struct CacheState {
    initial: HashMap<String, InitialToken>,
    latest: HashMap<String, Credential>,
    in_flight: HashMap<String, CredentialFlight>,
}

/// Credential source for embed targets of one subject.
///
/// Refreshes are single-flight per embed id: concurrent resolves for the same
/// target await one request, different targets never wait on each other.
pub struct CredentialCache {
    api: Rc<dyn SupersetApi>,
    plugin_id: Cell<Option<i64>>,
    skew_ms: u64,
    clock: Clock,
    state: RefCell<CacheState>,
}

impl CredentialCache {
    pub fn new(api: Rc<dyn SupersetApi>) -> Self {
        Self {
            api,
            plugin_id: Cell::new(None),
            skew_ms: DEFAULT_EXPIRY_SKEW_MS,
            clock: Rc::new(epoch_millis_now),
            state: RefCell::new(CacheState::default()),
        }
    }

    #[must_use]
    pub fn with_skew_ms(mut self, skew_ms: u64) -> Self {
        self.skew_ms = skew_ms;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_plugin_id(&self, plugin_id: Option<i64>) {
        self.plugin_id.set(plugin_id);
    }

    /// Registers the token that arrived with the response for `embed_id`.
    /// Each target accepts one initial token for the lifetime of the subject.
    pub fn seed_initial(&self, embed_id: &str, token: Option<&str>) {
        let Some(token) = token.filter(|token| !token.is_empty()) else {
            return;
        };
        let mut state = self.state.borrow_mut();
        state
            .initial
            .entry(embed_id.to_string())
            .or_insert_with(|| InitialToken::Pending(token.to_string()));
    }

    /// Forgets everything; used when the owning subject changes.
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.initial.clear();
        state.latest.clear();
        state.in_flight.clear();
    }

    #[must_use]
    pub fn latest(&self, embed_id: &str) -> Option<Credential> {
        self.state.borrow().latest.get(embed_id).cloned()
    }

    #[must_use]
    pub fn has_pending_initial(&self, embed_id: &str) -> bool {
        matches!(
            self.state.borrow().initial.get(embed_id),
            Some(InitialToken::Pending(_))
        )
    }

    pub async fn resolve(&self, target: &EmbedTarget) -> Result<Credential, CredentialError> {
        if let Some(credential) = self.take_initial(&target.embed_id) {
            self.remember(&target.embed_id, &credential);
            return Ok(credential);
        }

        let flight = self.flight_for(target);
        let result = flight.clone().await;

        {
            let mut state = self.state.borrow_mut();
            let same_flight = state
                .in_flight
                .get(&target.embed_id)
                .is_some_and(|current| current.ptr_eq(&flight));
            if same_flight {
                state.in_flight.remove(&target.embed_id);
            }
        }

        match &result {
            Ok(credential) => self.remember(&target.embed_id, credential),
            Err(error) => warn!(embed_id = %target.embed_id, %error, "guest token refresh failed"),
        }
        result
    }

    fn take_initial(&self, embed_id: &str) -> Option<Credential> {
        let token = {
            let mut state = self.state.borrow_mut();
            let entry = state.initial.get_mut(embed_id)?;
            match std::mem::replace(entry, InitialToken::Consumed) {
                InitialToken::Pending(token) => token,
                InitialToken::Consumed => return None,
            }
        };

        let credential = Credential::new(token);
        if credential.is_expiring_soon((self.clock)(), self.skew_ms) {
            debug!(embed_id, "initial guest token is expiring, refreshing");
            return None;
        }
        debug!(embed_id, "using initial guest token");
        Some(credential)
    }

    fn flight_for(&self, target: &EmbedTarget) -> CredentialFlight {
        let mut state = self.state.borrow_mut();
        if let Some(existing) = state.in_flight.get(&target.embed_id) {
            debug!(embed_id = %target.embed_id, "joining in-flight guest token refresh");
            return existing.clone();
        }

        let api = Rc::clone(&self.api);
        let request = GuestTokenRequest {
            plugin_id: self.plugin_id.get(),
            embedded_id: target.embed_id.clone(),
        };
        debug!(embed_id = %target.embed_id, plugin_id = ?request.plugin_id, "requesting guest token");
        let flight = async move {
            let payload = api.fetch_guest_token(request).await?;
            extract_guest_token(&payload)
                .map(Credential::new)
                .ok_or_else(|| missing_credential(&payload))
        }
        .boxed_local()
        .shared();
        state
            .in_flight
            .insert(target.embed_id.clone(), flight.clone());
        flight
    }

    fn remember(&self, embed_id: &str, credential: &Credential) {
        self.state
            .borrow_mut()
            .latest
            .insert(embed_id.to_string(), credential.clone());
    }
}

/// Token callback handed to the embed driver, bound to one target.
///
/// Clones share the last failure, so a driver that only sees an opaque
/// rejection from the embed SDK can still tell a credential failure apart.
#[derive(Clone)]
pub struct GuestTokenProvider {
    cache: Rc<CredentialCache>,
    target: EmbedTarget,
    last_failure: Rc<RefCell<Option<CredentialError>>>,
}

impl GuestTokenProvider {
    pub fn new(cache: Rc<CredentialCache>, target: EmbedTarget) -> Self {
        Self {
            cache,
            target,
            last_failure: Rc::default(),
        }
    }

    #[must_use]
    pub fn target(&self) -> &EmbedTarget {
        &self.target
    }

    pub async fn fetch_guest_token(&self) -> Result<String, CredentialError> {
        let result = self
            .cache
            .resolve(&self.target)
            .await
            .map(Credential::into_token);
        *self.last_failure.borrow_mut() = result.as_ref().err().cloned();
        result
    }

    /// Takes the failure of the most recent fetch, if it failed.
    pub fn take_failure(&self) -> Option<CredentialError> {
        self.last_failure.borrow_mut().take()
    }

    /// Error for an embed call that rejected with `message`: the credential
    /// failure behind it when the token fetch failed, a mount failure
    /// otherwise.
    pub fn rejection(&self, message: impl Into<String>) -> EmbedError {
        match self.take_failure() {
            Some(failure) => EmbedError::Credential(failure),
            None => EmbedError::mount(message),
        }
    }
}

impl std::fmt::Debug for GuestTokenProvider {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("GuestTokenProvider")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
