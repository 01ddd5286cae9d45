//! Request/response surface exposed to cross-platform hosts.
//!
//! Each call takes a JSON options object and resolves with a JSON value,
//! usually `{"status": "..."}`, or rejects with a message.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::geometry::ViewportRect;
use crate::sdk::PushApp;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PluginError(pub String);

impl PluginError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type PluginResult = Result<Value, PluginError>;

fn status(value: &str) -> PluginResult {
    Ok(json!({ "status": value }))
}

fn required_str<'a>(options: &'a Value, key: &str) -> Result<&'a str, PluginError> {
    options
        .get(key)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PluginError::new(format!("{key} is required")))
}

/// Largest viewport coordinate accepted from a host, in CSS pixels. Keeps
/// device-pixel conversion well inside `i32`.
const MAX_VIEWPORT_COORD: f64 = 1_000_000.0;

fn required_rect(options: &Value) -> Result<ViewportRect, PluginError> {
    let num = |key: &str| options.get(key).and_then(Value::as_f64);
    let (x, y, width, height) = match (num("x"), num("y"), num("width"), num("height")) {
        (Some(x), Some(y), Some(width), Some(height)) => (x, y, width, height),
        _ => return Err(PluginError::new("x, y, width, and height are required")),
    };
    let in_range = |v: f64| v.is_finite() && v.abs() <= MAX_VIEWPORT_COORD;
    if ![x, y, width, height].into_iter().all(in_range) || width < 0.0 || height < 0.0 {
        return Err(PluginError::new("x, y, width, and height must be finite viewport coordinates"));
    }
    Ok(ViewportRect::new(x, y, width, height))
}

pub struct PushAppPlugin {
    app: Arc<PushApp>,
}

impl PushAppPlugin {
    pub fn new(app: Arc<PushApp>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &Arc<PushApp> {
        &self.app
    }

    /// Dispatch a plugin method by name.
    pub async fn call(&self, method: &str, options: Value) -> PluginResult {
        match method {
            "initialize" => self.initialize(&options).await,
            "login" => self.login(&options).await,
            "getDeviceHeaders" => self.device_headers(),
            "sendEvent" => self.send_event(&options).await,
            "setPageName" => self.set_page_name(&options).await,
            "registerPlaceholder" => self.register_placeholder(&options),
            "unregisterPlaceholder" => {
                let id = required_str(&options, "placeholderId")?;
                self.app.unregister_placeholder(id);
                status("placeholder_unregistered")
            }
            "registerTooltipTarget" => self.register_tooltip_target(&options),
            "unregisterTooltipTarget" => {
                let id = required_str(&options, "targetId")?;
                self.app.unregister_tooltip_target(id);
                status("tooltip_target_unregistered")
            }
            other => Err(PluginError::new(format!("{other} is not implemented"))),
        }
    }

    async fn initialize(&self, options: &Value) -> PluginResult {
        let identifier = required_str(options, "identifier")?;
        let sandbox = options
            .get("sandbox")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.app
            .initialize(identifier, sandbox)
            .await
            .map_err(|e| PluginError::new(e.to_string()))?;
        status("initialized")
    }

    async fn login(&self, options: &Value) -> PluginResult {
        let user_id = required_str(options, "userId")?;
        if let Err(e) = self.app.login(user_id).await {
            warn!(user_id = %user_id, error = %e, "Login failed");
        }
        status("logged_in")
    }

    fn device_headers(&self) -> PluginResult {
        let headers: Map<String, Value> = self
            .app
            .device_headers()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Ok(Value::Object(headers))
    }

    async fn send_event(&self, options: &Value) -> PluginResult {
        let name = required_str(options, "eventName")?;
        let data = options
            .get("eventData")
            .filter(|d| d.is_object())
            .cloned()
            .ok_or_else(|| PluginError::new("eventData is required and must be an object"))?;
        if let Err(e) = self.app.send_event(name, data).await {
            warn!(event = %name, error = %e, "Event send failed");
        }
        status("event_sent")
    }

    async fn set_page_name(&self, options: &Value) -> PluginResult {
        let page = required_str(options, "pageName")?;
        if let Err(e) = self.app.set_page_name(page).await {
            warn!(page = %page, error = %e, "page_open not sent");
        }
        status("page_set")
    }

    fn register_placeholder(&self, options: &Value) -> PluginResult {
        let id = required_str(options, "placeholderId")?;
        let rect = required_rect(options)?;
        self.app.register_placeholder(id, Some(rect));
        status("placeholder_registration_initiated")
    }

    fn register_tooltip_target(&self, options: &Value) -> PluginResult {
        let id = required_str(options, "targetId")?;
        let rect = required_rect(options)?;
        self.app.register_tooltip_target(id, rect);
        status("tooltip_target_registration_initiated")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::device::DeviceInfo;
    use crate::renderer::RecordingRenderer;
    use crate::storage::MemoryStore;
    use pushapp_core::SdkConfig;

    fn plugin() -> PushAppPlugin {
        let app = PushApp::new(
            SdkConfig::default(),
            DeviceInfo::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingBackend::new()),
            Arc::new(RecordingRenderer::new()),
        )
        .unwrap();
        PushAppPlugin::new(app)
    }

    async fn reject(plugin: &PushAppPlugin, method: &str, options: Value) -> String {
        plugin.call(method, options).await.unwrap_err().0
    }

    #[tokio::test]
    async fn test_rejections() {
        let p = plugin();
        assert_eq!(reject(&p, "initialize", json!({})).await, "identifier is required");
        assert_eq!(reject(&p, "login", json!({"userId": ""})).await, "userId is required");
        assert_eq!(reject(&p, "sendEvent", json!({})).await, "eventName is required");
        assert_eq!(
            reject(&p, "sendEvent", json!({"eventName": "x", "eventData": [1]})).await,
            "eventData is required and must be an object"
        );
        assert_eq!(reject(&p, "setPageName", json!({})).await, "pageName is required");
        assert_eq!(
            reject(&p, "registerPlaceholder", json!({})).await,
            "placeholderId is required"
        );
        assert_eq!(
            reject(&p, "registerPlaceholder", json!({"placeholderId": "a", "x": 1, "y": 2})).await,
            "x, y, width, and height are required"
        );
        assert_eq!(
            reject(
                &p,
                "registerTooltipTarget",
                json!({"targetId": "t", "x": 1e300, "y": 0, "width": 10, "height": 10})
            )
            .await,
            "x, y, width, and height must be finite viewport coordinates"
        );
        assert_eq!(
            reject(
                &p,
                "registerPlaceholder",
                json!({"placeholderId": "a", "x": 0, "y": 0, "width": -5, "height": 10})
            )
            .await,
            "x, y, width, and height must be finite viewport coordinates"
        );
        assert!(p.app().registry().placeholder_ids().is_empty());
        assert!(p.app().registry().tooltip_target_ids().is_empty());
        assert_eq!(
            reject(&p, "unregisterTooltipTarget", json!({})).await,
            "targetId is required"
        );
        assert_eq!(reject(&p, "fly", json!({})).await, "fly is not implemented");
        assert!(reject(&p, "initialize", json!({"identifier": "bad"})).await.contains("bad"));
    }

    #[tokio::test]
    async fn test_statuses() {
        let p = plugin();
        let ok = |v: PluginResult| v.unwrap()["status"].as_str().unwrap().to_string();

        assert_eq!(ok(p.call("initialize", json!({"identifier": "acme$c1"})).await), "initialized");
        assert_eq!(
            ok(p.call("sendEvent", json!({"eventName": "x", "eventData": {}})).await),
            "event_sent"
        );
        assert_eq!(ok(p.call("setPageName", json!({"pageName": "home"})).await), "page_set");
        let rect = json!({"placeholderId": "slot", "targetId": "tip", "x": 1, "y": 2.5, "width": 10, "height": 4});
        assert_eq!(
            ok(p.call("registerPlaceholder", rect.clone()).await),
            "placeholder_registration_initiated"
        );
        assert_eq!(
            ok(p.call("registerTooltipTarget", rect.clone()).await),
            "tooltip_target_registration_initiated"
        );
        assert_eq!(
            ok(p.call("unregisterPlaceholder", rect.clone()).await),
            "placeholder_unregistered"
        );
        assert_eq!(
            ok(p.call("unregisterTooltipTarget", rect).await),
            "tooltip_target_unregistered"
        );
        // No identity yet: the sends and both widget_open announcements are buffered.
        for _ in 0..50 {
            if p.app().buffered_events() == 4 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(p.app().buffered_events(), 4);

        let headers = p.call("getDeviceHeaders", json!({})).await.unwrap();
        assert!(headers["X-Device-ID"].is_string());
    }
}
