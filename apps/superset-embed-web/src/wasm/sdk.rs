use super::*;

const SDK_GLOBAL: &str = "supersetEmbeddedSdk";
const EMBED_DASHBOARD_FN: &str = "embedDashboard";

fn js_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|error| String::from(error.message()))
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

fn set_field(target: &js_sys::Object, key: &str, value: &JsValue) -> Result<(), EmbedError> {
    js_sys::Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(|error| EmbedError::mount(format!("failed to set {key}: {}", js_message(&error))))
}

fn method(target: &JsValue, name: &str) -> Option<js_sys::Function> {
    js_sys::Reflect::get(target, &JsValue::from_str(name))
        .ok()
        .and_then(|value| value.dyn_into::<js_sys::Function>().ok())
}

/// Awaits `value` whether or not the SDK returned a promise.
async fn settle(value: JsValue) -> Result<JsValue, JsValue> {
    JsFuture::from(js_sys::Promise::resolve(&value)).await
}

/// Drives `window.supersetEmbeddedSdk.embedDashboard`.
pub(super) struct SdkDriver;

#[async_trait(?Send)]
impl EmbedDriver for SdkDriver {
    async fn embed(&self, request: EmbedRequest) -> Result<Rc<dyn EmbedInstance>, EmbedError> {
        let window = web_sys::window().ok_or_else(|| EmbedError::mount("window is unavailable"))?;
        let sdk = js_sys::Reflect::get(&window, &JsValue::from_str(SDK_GLOBAL))
            .ok()
            .filter(|sdk| !sdk.is_undefined() && !sdk.is_null())
            .ok_or_else(|| EmbedError::mount("superset embedded sdk is not loaded"))?;
        let embed_dashboard = method(&sdk, EMBED_DASHBOARD_FN)
            .ok_or_else(|| EmbedError::mount("embedDashboard is unavailable"))?;
        let mount_point = window
            .document()
            .and_then(|document| document.get_element_by_id(&request.mount_point_id))
            .ok_or_else(|| {
                EmbedError::mount(format!("mount point #{} not found", request.mount_point_id))
            })?;

        let provider = request.guest_token.clone();
        let fetch_guest_token = Closure::<dyn FnMut() -> js_sys::Promise>::new(move || {
            let provider = provider.clone();
            wasm_bindgen_futures::future_to_promise(async move {
                provider
                    .fetch_guest_token()
                    .await
                    .map(|token| JsValue::from_str(&token))
                    .map_err(|error| JsValue::from(js_sys::Error::new(&error.to_string())))
            })
        });

        let ui_config = request
            .ui_config
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|error| EmbedError::mount(format!("invalid dashboardUiConfig: {error}")))?;

        let options = js_sys::Object::new();
        set_field(&options, "id", &JsValue::from_str(&request.target.embed_id))?;
        set_field(&options, "supersetDomain", &JsValue::from_str(&request.target.domain))?;
        set_field(&options, "mountPoint", mount_point.as_ref())?;
        set_field(&options, "fetchGuestToken", fetch_guest_token.as_ref())?;
        set_field(&options, "dashboardUiConfig", &ui_config)?;
        set_field(&options, "iframeTitle", &JsValue::from_str(&request.iframe_title))?;

        let pending = embed_dashboard
            .call1(&sdk, &options)
            .map_err(|error| request.guest_token.rejection(js_message(&error)))?;
        let handle = settle(pending)
            .await
            .map_err(|error| request.guest_token.rejection(js_message(&error)))?;
        debug!(embed_id = %request.target.embed_id, "embedDashboard resolved");
        Ok(Rc::new(SdkDashboard::new(handle, fetch_guest_token)))
    }
}

/// A dashboard returned by the SDK. Capabilities are detected once, from
/// the methods the SDK build actually exposes.
pub(super) struct SdkDashboard {
    handle: JsValue,
    scroll_size: Option<ScrollSize>,
    theme_mode: Option<ThemeModeBridge>,
    _fetch_guest_token: Closure<dyn FnMut() -> js_sys::Promise>,
}

impl SdkDashboard {
    fn new(handle: JsValue, fetch_guest_token: Closure<dyn FnMut() -> js_sys::Promise>) -> Self {
        let scroll_size = method(&handle, "getScrollSize").map(|function| ScrollSize {
            handle: handle.clone(),
            function,
        });
        let theme_mode = method(&handle, "setThemeMode").map(|function| ThemeModeBridge {
            handle: handle.clone(),
            function,
        });
        Self {
            handle,
            scroll_size,
            theme_mode,
            _fetch_guest_token: fetch_guest_token,
        }
    }
}

impl EmbedInstance for SdkDashboard {
    fn unmount(&self) {
        let Some(unmount) = method(&self.handle, "unmount") else {
            return;
        };
        if let Err(error) = unmount.call0(&self.handle) {
            warn!(error = %js_message(&error), "superset unmount failed");
        }
    }

    fn content_size_probe(&self) -> Option<&dyn ContentSizeProbe> {
        self.scroll_size.as_ref().map(|probe| probe as &dyn ContentSizeProbe)
    }

    fn theme_setter(&self) -> Option<&dyn ThemeModeSetter> {
        self.theme_mode.as_ref().map(|setter| setter as &dyn ThemeModeSetter)
    }
}

struct ScrollSize {
    handle: JsValue,
    function: js_sys::Function,
}

#[async_trait(?Send)]
impl ContentSizeProbe for ScrollSize {
    async fn content_size(&self) -> Result<ContentSize, EmbedError> {
        let pending = self
            .function
            .call0(&self.handle)
            .map_err(|error| EmbedError::capability("getScrollSize", js_message(&error)))?;
        let size = settle(pending)
            .await
            .map_err(|error| EmbedError::capability("getScrollSize", js_message(&error)))?;
        serde_wasm_bindgen::from_value(size)
            .map_err(|error| EmbedError::capability("getScrollSize", error.to_string()))
    }
}

struct ThemeModeBridge {
    handle: JsValue,
    function: js_sys::Function,
}

#[async_trait(?Send)]
impl ThemeModeSetter for ThemeModeBridge {
    async fn set_theme_mode(&self, mode: ThemeMode) -> Result<(), EmbedError> {
        let pending = self
            .function
            .call1(&self.handle, &JsValue::from_str(mode.as_str()))
            .map_err(|error| EmbedError::capability("setThemeMode", js_message(&error)))?;
        settle(pending)
            .await
            .map(|_| ())
            .map_err(|error| EmbedError::capability("setThemeMode", js_message(&error)))
    }
}
