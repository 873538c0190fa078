//! Browser binding of the Superset embed session.
//!
//! The host page creates one [`SupersetChartHandle`] per chat message that
//! carries a Superset chart, feeds it the message payload and tears it down
//! when the message leaves the page. Everything here is `wasm32` only.

#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::FutureExt;
    use futures::future::LocalBoxFuture;
    use gloo_net::http::Request;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use superset_embed_core::geometry::{
        BACKGROUND_CSS_VARIABLES, DARK_SCHEME_MEDIA_QUERY, THEME_ATTRIBUTE_FILTER,
    };
    use superset_embed_core::{
        ApiError, ContentSize, ContentSizeProbe, DashboardListRequest, DashboardRef, EmbedConfig,
        EmbedDriver, EmbedError, EmbedInstance, EmbedRequest, FrameStyle, GuestTokenRequest,
        HostSurface, MountPoint, Notice, NoticeLevel, Notifier, PushChartRequest,
        SessionCollaborators, SubjectId, SupersetApi, SupersetChartResponse, SupersetChartSession,
        TaskHost, ThemeMarkers, ThemeMode, ThemeModeSetter, decode_dashboards, decode_push_ack,
        error_body_text,
    };
    use tracing::{debug, info, warn};
    use wasm_bindgen::JsCast;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::{JsFuture, spawn_local};

    mod dom;
    mod network;
    mod sdk;

    use network::BrowserApi;
    use sdk::SdkDriver;

    const CONFIG_GLOBAL: &str = "__SUPERSET_EMBED_CONFIG__";
    const DEFAULT_API_PREFIX: &str = "/api/chat/superset";
    const DEFAULT_REQUEST_ATTEMPTS: u32 = 2;

    /// Page-level settings published on `window.__SUPERSET_EMBED_CONFIG__`.
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct BrowserConfig {
        /// Origin of the chat backend; empty means same origin.
        api_base_url: String,
        api_prefix: Option<String>,
        bearer_token: Option<String>,
        request_attempts: Option<u32>,
        embed: EmbedConfig,
    }

    impl BrowserConfig {
        fn load() -> Self {
            let Some(window) = web_sys::window() else {
                return Self::default();
            };
            let raw = match js_sys::Reflect::get(&window, &JsValue::from_str(CONFIG_GLOBAL)) {
                Ok(raw) if !raw.is_undefined() && !raw.is_null() => raw,
                _ => return Self::default(),
            };
            match serde_wasm_bindgen::from_value::<Self>(raw) {
                Ok(config) => config,
                Err(error) => {
                    warn!(%error, "ignoring malformed embed config global");
                    Self::default()
                }
            }
        }

        fn api_prefix(&self) -> &str {
            self.api_prefix
                .as_deref()
                .map(str::trim)
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or(DEFAULT_API_PREFIX)
        }
    }

    struct BrowserTasks;

    impl TaskHost for BrowserTasks {
        fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
            spawn_local(task);
        }

        fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
            let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
            gloo_timers::future::TimeoutFuture::new(millis).boxed_local()
        }

        fn next_frame(&self) -> LocalBoxFuture<'static, ()> {
            let promise = js_sys::Promise::new(&mut |resolve, _reject| {
                let scheduled = web_sys::window()
                    .map(|window| window.request_animation_frame(&resolve).is_ok())
                    .unwrap_or(false);
                if !scheduled {
                    let _ = resolve.call0(&JsValue::NULL);
                }
            });
            JsFuture::from(promise).map(|_| ()).boxed_local()
        }
    }

    /// Page listeners that feed the session; dropping them detaches nothing,
    /// so [`HostListeners::detach`] must run first.
    struct HostListeners {
        resize: Closure<dyn FnMut(web_sys::Event)>,
        theme_observer: Option<(web_sys::MutationObserver, Closure<dyn FnMut(js_sys::Array)>)>,
        color_scheme: Option<(web_sys::MediaQueryList, Closure<dyn FnMut(web_sys::Event)>)>,
    }

    impl HostListeners {
        fn attach(session: &Rc<SupersetChartSession>) -> Result<Self, JsValue> {
            let window = web_sys::window().ok_or_else(|| JsValue::from_str("window is unavailable"))?;

            let resize_session = Rc::downgrade(session);
            let resize = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
                if let Some(session) = resize_session.upgrade() {
                    session.resize();
                }
            });
            window.add_event_listener_with_callback("resize", resize.as_ref().unchecked_ref())?;

            let theme_observer = match Self::observe_theme(session, &window) {
                Ok(observer) => observer,
                Err(error) => {
                    debug!(error = ?error, "theme mutation observer unavailable");
                    None
                }
            };

            let color_scheme = match window.match_media(DARK_SCHEME_MEDIA_QUERY) {
                Ok(Some(media)) => {
                    let media_session = Rc::downgrade(session);
                    let listener =
                        Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
                            if let Some(session) = media_session.upgrade() {
                                session.theme_changed();
                            }
                        });
                    media.add_event_listener_with_callback("change", listener.as_ref().unchecked_ref())?;
                    Some((media, listener))
                }
                _ => None,
            };

            Ok(Self {
                resize,
                theme_observer,
                color_scheme,
            })
        }

        fn observe_theme(
            session: &Rc<SupersetChartSession>,
            window: &web_sys::Window,
        ) -> Result<Option<(web_sys::MutationObserver, Closure<dyn FnMut(js_sys::Array)>)>, JsValue>
        {
            let Some(root) = window.document().and_then(|document| document.document_element())
            else {
                return Ok(None);
            };
            let observer_session = Rc::downgrade(session);
            let callback = Closure::<dyn FnMut(js_sys::Array)>::new(move |_records: js_sys::Array| {
                if let Some(session) = observer_session.upgrade() {
                    session.theme_changed();
                }
            });
            let observer = web_sys::MutationObserver::new(callback.as_ref().unchecked_ref())?;
            let filter = THEME_ATTRIBUTE_FILTER
                .iter()
                .map(|name| JsValue::from_str(name))
                .collect::<js_sys::Array>();
            let init = web_sys::MutationObserverInit::new();
            init.set_attributes(true);
            init.set_attribute_filter(&filter);
            observer.observe_with_options(&root, &init)?;
            Ok(Some((observer, callback)))
        }

        fn detach(self) {
            if let Some(window) = web_sys::window() {
                let _ = window.remove_event_listener_with_callback(
                    "resize",
                    self.resize.as_ref().unchecked_ref(),
                );
            }
            if let Some((observer, _callback)) = &self.theme_observer {
                observer.disconnect();
            }
            if let Some((media, listener)) = &self.color_scheme {
                let _ =
                    media.remove_event_listener_with_callback("change", listener.as_ref().unchecked_ref());
            }
        }
    }

    #[wasm_bindgen(start)]
    pub fn start() {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();
    }

    /// One embedded chart bound to a container element of the host page.
    #[wasm_bindgen]
    pub struct SupersetChartHandle {
        session: Rc<SupersetChartSession>,
        listeners: RefCell<Option<HostListeners>>,
    }

    #[wasm_bindgen]
    impl SupersetChartHandle {
        /// Builds the frame and placeholder inside the element with id
        /// `container_id` and starts listening to resize and theme changes.
        #[wasm_bindgen(constructor)]
        pub fn new(container_id: &str) -> Result<SupersetChartHandle, JsValue> {
            let config = BrowserConfig::load();
            let (host, mount_point) = dom::build_surface(container_id).map_err(|error| JsValue::from_str(&error))?;
            let collaborators = SessionCollaborators {
                api: Rc::new(BrowserApi::new(&config)),
                driver: Rc::new(SdkDriver),
                mount_point,
                host,
                tasks: Rc::new(BrowserTasks),
            };
            let session = Rc::new(SupersetChartSession::new(config.embed, collaborators));
            let listeners = HostListeners::attach(&session)?;
            info!(container_id, "superset chart handle created");
            Ok(Self {
                session,
                listeners: RefCell::new(Some(listeners)),
            })
        }

        /// Feeds the chat message payload; `subject` identifies the message.
        #[wasm_bindgen(js_name = setInput)]
        pub fn set_input(&self, subject: &str, response: JsValue) -> Result<(), JsValue> {
            let response: SupersetChartResponse = serde_wasm_bindgen::from_value(response)
                .map_err(|error| JsValue::from_str(&format!("invalid superset response: {error}")))?;
            self.session.set_input(SubjectId::new(subject), response);
            Ok(())
        }

        #[wasm_bindgen(js_name = selectCandidate)]
        pub fn select_candidate(&self, index: usize) {
            self.session.select_candidate(index);
        }

        /// Re-evaluates the embed even when nothing changed; the only retry
        /// path after a failed mount.
        pub fn refresh(&self) {
            self.session.refresh();
        }

        #[wasm_bindgen(js_name = triggerResize)]
        pub fn trigger_resize(&self) {
            self.session.resize();
        }

        #[wasm_bindgen(js_name = themeChanged)]
        pub fn theme_changed(&self) {
            self.session.theme_changed();
        }

        /// Pushes the active chart to the dashboard behind a menu key.
        /// Resolves to the outcome name.
        #[wasm_bindgen(js_name = pushToDashboard)]
        pub fn push_to_dashboard(&self, menu_key: String) -> js_sys::Promise {
            let session = Rc::clone(&self.session);
            wasm_bindgen_futures::future_to_promise(async move {
                let outcome = session.push_menu_key(&menu_key).await;
                Ok(JsValue::from_str(&format!("{outcome:?}")))
            })
        }

        /// Render model for the chrome around the frame, as JSON.
        #[wasm_bindgen(js_name = snapshotJson)]
        pub fn snapshot_json(&self) -> String {
            serde_json::to_string(&self.session.snapshot()).unwrap_or_else(|_| "{}".to_string())
        }

        pub fn teardown(&self) {
            if let Some(listeners) = self.listeners.borrow_mut().take() {
                listeners.detach();
            }
            self.session.teardown();
        }
    }

    impl Drop for SupersetChartHandle {
        fn drop(&mut self) {
            self.teardown();
        }
    }
}
