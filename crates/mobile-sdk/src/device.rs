//! Device fingerprint: persistent device id and the `X-*` metadata headers
//! attached to every backend call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, KEY_DEVICE_ID};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DevicePlatform {
    #[default]
    Android,
    Ios,
}

impl DevicePlatform {
    /// Value sent in the `platform` field of the register call.
    pub fn as_str(self) -> &'static str {
        match self {
            DevicePlatform::Android => "android",
            DevicePlatform::Ios => "ios",
        }
    }

    fn os_name(self) -> &'static str {
        match self {
            DevicePlatform::Android => "ANDROID",
            DevicePlatform::Ios => "IOS",
        }
    }
}

/// Descriptive device context supplied by the host shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub platform: DevicePlatform,
    /// ANDROID_ID / identifierForVendor; a random id is used when absent.
    pub vendor_id: Option<String>,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Display density (px per logical px).
    pub density: f32,
    pub locale: String,
    pub timezone: String,
    pub os_version: String,
    pub api_level: Option<u32>,
    pub model: String,
    pub manufacturer: String,
    pub cpu_abi: Vec<String>,
    pub bundle_id: String,
    pub app_version: String,
    pub sdk_version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            platform: DevicePlatform::Android,
            vendor_id: None,
            screen_width: 1080,
            screen_height: 2400,
            density: 2.75,
            locale: "en_US".to_string(),
            timezone: "UTC".to_string(),
            os_version: String::new(),
            api_level: None,
            model: String::new(),
            manufacturer: String::new(),
            cpu_abi: Vec::new(),
            bundle_id: String::new(),
            app_version: String::new(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl DeviceInfo {
    pub fn orientation(&self) -> &'static str {
        if self.screen_width > self.screen_height {
            "Landscape"
        } else {
            "Portrait"
        }
    }

    /// Headers sent with every request. Ordered for stable logging.
    pub fn headers(&self, device_id: &str) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        let mut put = |k: &str, v: String| {
            headers.insert(k.to_string(), v);
        };
        put("X-Device-ID", device_id.to_string());
        put(
            "X-Screen-Resolution",
            format!("{}x{}", self.screen_width, self.screen_height),
        );
        put("X-Device-Orientation", self.orientation().to_string());
        put("X-Locale", self.locale.clone());
        put("X-Timezone", self.timezone.clone());
        put("X-OS-Name", self.platform.os_name().to_string());
        put("X-OS-Version", self.os_version.clone());
        if let Some(level) = self.api_level {
            put("X-API-Level", level.to_string());
        }
        put("X-Device-Model", self.model.clone());
        put("X-Manufacturer", self.manufacturer.clone());
        put("X-CPU-ABI", self.cpu_abi.join(", "));
        put("X-Bundle-ID", self.bundle_id.clone());
        put("X-App-Version", self.app_version.clone());
        put("X-SDK-Version", self.sdk_version.clone());
        headers
    }
}

/// Load the persisted device id, generating `<vendor>_<millis>` on first use.
pub fn persistent_device_id(store: &dyn KeyValueStore, info: &DeviceInfo) -> String {
    if let Some(id) = store.get(KEY_DEVICE_ID).filter(|id| !id.is_empty()) {
        return id;
    }

    let vendor = info
        .vendor_id
        .clone()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let id = format!("{vendor}_{}", chrono::Utc::now().timestamp_millis());

    if let Err(e) = store.set(KEY_DEVICE_ID, id.clone()) {
        warn!(error = %e, "Failed to persist device id");
    }
    debug!(device_id = %id, "Generated persistent device id");
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_device_id_is_stable() {
        let store = MemoryStore::new();
        let info = DeviceInfo {
            vendor_id: Some("abc123".into()),
            ..Default::default()
        };
        let first = persistent_device_id(&store, &info);
        assert!(first.starts_with("abc123_"));
        let second = persistent_device_id(&store, &info);
        assert_eq!(first, second);
    }

    #[test]
    fn test_headers() {
        let info = DeviceInfo {
            screen_width: 2400,
            screen_height: 1080,
            api_level: Some(34),
            cpu_abi: vec!["arm64-v8a".into(), "armeabi-v7a".into()],
            ..Default::default()
        };
        let headers = info.headers("dev-1");
        assert_eq!(headers["X-Device-ID"], "dev-1");
        assert_eq!(headers["X-Screen-Resolution"], "2400x1080");
        assert_eq!(headers["X-Device-Orientation"], "Landscape");
        assert_eq!(headers["X-OS-Name"], "ANDROID");
        assert_eq!(headers["X-API-Level"], "34");
        assert_eq!(headers["X-CPU-ABI"], "arm64-v8a, armeabi-v7a");
    }

    #[test]
    fn test_ios_headers_skip_api_level() {
        let info = DeviceInfo {
            platform: DevicePlatform::Ios,
            ..Default::default()
        };
        let headers = info.headers("dev-1");
        assert_eq!(headers["X-OS-Name"], "IOS");
        assert!(!headers.contains_key("X-API-Level"));
    }
}
