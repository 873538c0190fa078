use super::*;

pub(super) const NOTICE_EVENT: &str = "superset-embed:notice";
const MISSING_EMBED_INFO_TEXT: &str = "Superset embed information is missing";

fn document() -> Result<web_sys::Document, String> {
    web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| "document is unavailable".to_string())
}

fn create_div(document: &web_sys::Document, id: &str) -> Result<web_sys::HtmlElement, String> {
    let element = document
        .create_element("div")
        .map_err(|_| "failed to create div".to_string())?
        .dyn_into::<web_sys::HtmlElement>()
        .map_err(|_| "div is not an HtmlElement".to_string())?;
    element.set_id(id);
    Ok(element)
}

fn set_style(element: &web_sys::HtmlElement, property: &str, value: &str) {
    if let Err(error) = element.style().set_property(property, value) {
        debug!(property, error = ?error, "style update rejected");
    }
}

fn format_px(value: f64) -> String {
    format!("{}px", value.round())
}

/// Replaces the content of the host container with a frame mount point
/// and a hidden "missing embed info" placeholder.
pub(super) fn build_surface(
    container_id: &str,
) -> Result<(Rc<DomHost>, Rc<DomMountPoint>), String> {
    let document = document()?;
    let container = document
        .get_element_by_id(container_id)
        .ok_or_else(|| format!("container #{container_id} not found"))?
        .dyn_into::<web_sys::HtmlElement>()
        .map_err(|_| format!("container #{container_id} is not an HtmlElement"))?;
    container.set_inner_html("");
    set_style(&container, "position", "relative");
    set_style(&container, "width", "100%");

    let frame_id = format!("{container_id}-frame");
    let frame = create_div(&document, &frame_id)?;
    set_style(&frame, "width", "100%");
    set_style(&frame, "height", "100%");

    let placeholder = create_div(&document, &format!("{container_id}-missing"))?;
    placeholder.set_text_content(Some(MISSING_EMBED_INFO_TEXT));
    set_style(&placeholder, "display", "none");
    set_style(&placeholder, "padding", "16px");

    container
        .append_child(&frame)
        .map_err(|_| "failed to attach frame container".to_string())?;
    container
        .append_child(&placeholder)
        .map_err(|_| "failed to attach placeholder".to_string())?;

    Ok((
        Rc::new(DomHost {
            container,
            frame: frame.clone(),
            placeholder,
        }),
        Rc::new(DomMountPoint {
            id: frame_id,
            element: frame,
        }),
    ))
}

/// The host page as the session sees it.
pub(super) struct DomHost {
    container: web_sys::HtmlElement,
    frame: web_sys::HtmlElement,
    placeholder: web_sys::HtmlElement,
}

impl Notifier for DomHost {
    fn notify(&self, notice: Notice) {
        match notice.level() {
            NoticeLevel::Success => info!(notice = notice.message(), "superset notice"),
            NoticeLevel::Error => warn!(notice = notice.message(), detail = ?notice, "superset notice"),
        }
        let detail = serde_json::json!({
            "level": notice.level(),
            "message": notice.message(),
            "notice": notice,
        });
        let detail = js_sys::JSON::parse(&detail.to_string()).unwrap_or(JsValue::NULL);
        let init = web_sys::CustomEventInit::new();
        init.set_bubbles(true);
        init.set_detail(&detail);
        match web_sys::CustomEvent::new_with_event_init_dict(NOTICE_EVENT, &init) {
            Ok(event) => {
                let _ = self.container.dispatch_event(&event);
            }
            Err(error) => debug!(error = ?error, "notice event could not be created"),
        }
    }
}

impl HostSurface for DomHost {
    fn viewport_height(&self) -> Option<f64> {
        web_sys::window()?.inner_height().ok()?.as_f64()
    }

    fn container_top(&self) -> Option<f64> {
        Some(self.container.get_bounding_client_rect().top())
    }

    fn theme_markers(&self) -> ThemeMarkers {
        let Ok(document) = document() else {
            return ThemeMarkers::default();
        };
        let root = document.document_element();
        let theme_attribute = root
            .as_ref()
            .and_then(|root| root.get_attribute("data-theme"));
        let dataset_theme = root
            .and_then(|root| root.dyn_into::<web_sys::HtmlElement>().ok())
            .and_then(|root| root.dataset().get("theme"));
        let body_class = document.body().map(|body| body.class_name());
        let prefers_dark = web_sys::window()
            .and_then(|window| window.match_media(DARK_SCHEME_MEDIA_QUERY).ok().flatten())
            .map(|media| media.matches());
        ThemeMarkers {
            theme_attribute,
            dataset_theme,
            body_class,
            prefers_dark,
        }
    }

    fn background_candidates(&self) -> Vec<String> {
        let Some(window) = web_sys::window() else {
            return Vec::new();
        };
        let Ok(document) = document() else {
            return Vec::new();
        };
        let mut candidates = Vec::new();
        if let Some(root) = document.document_element() {
            if let Ok(Some(style)) = window.get_computed_style(&root) {
                candidates.extend(
                    BACKGROUND_CSS_VARIABLES
                        .iter()
                        .filter_map(|name| style.get_property_value(name).ok()),
                );
            }
        }
        if let Some(body) = document.body() {
            if let Ok(Some(style)) = window.get_computed_style(&body) {
                if let Ok(color) = style.get_property_value("background-color") {
                    candidates.push(color);
                }
            }
        }
        candidates
    }

    fn apply_height(&self, height: f64) {
        set_style(&self.container, "height", &format_px(height));
    }

    fn apply_background(&self, color: &str) {
        set_style(&self.container, "background-color", color);
        set_style(&self.placeholder, "background-color", color);
    }

    fn show_missing_embed_info(&self, missing: bool) {
        set_style(&self.placeholder, "display", if missing { "block" } else { "none" });
        set_style(&self.frame, "display", if missing { "none" } else { "block" });
    }
}

/// Element the embedded SDK mounts its iframe into.
pub(super) struct DomMountPoint {
    id: String,
    element: web_sys::HtmlElement,
}

impl DomMountPoint {
    fn iframe(&self) -> Option<web_sys::HtmlElement> {
        self.element
            .query_selector("iframe")
            .ok()
            .flatten()
            .and_then(|iframe| iframe.dyn_into::<web_sys::HtmlElement>().ok())
    }
}

impl MountPoint for DomMountPoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn clear(&self) {
        self.element.set_inner_html("");
    }

    fn style_frame(&self, style: &FrameStyle) {
        let Some(iframe) = self.iframe() else {
            debug!(mount_point = %self.id, "no iframe to style");
            return;
        };
        set_style(&iframe, "width", "100%");
        set_style(&iframe, "height", "100%");
        set_style(&iframe, "border", "none");
        set_style(&iframe, "display", "block");
        iframe.set_title(&style.title);
        if let Some(background) = style.background.as_deref() {
            set_style(&iframe, "background-color", background);
        }
    }

    fn set_frame_background(&self, color: &str) {
        if let Some(iframe) = self.iframe() {
            set_style(&iframe, "background-color", color);
        }
    }
}
