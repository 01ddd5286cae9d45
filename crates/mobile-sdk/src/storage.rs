//! Key-value persistence for SDK flags: device id, user id, push token,
//! registration state and the buffered event list.

use std::collections::HashMap;
use std::path::PathBuf;

use dashmap::DashMap;
use parking_lot::Mutex;
use pushapp_core::{SdkError, SdkResult};
use tracing::warn;

pub const KEY_DEVICE_ID: &str = "persistent_device_id";
pub const KEY_USER_ID: &str = "pushapp_user_id";
pub const KEY_PUSH_TOKEN: &str = "fcm_token";
pub const KEY_REGISTERED: &str = "registered";
pub const KEY_EVENT_BUFFER: &str = "event_buffer";

/// Minimal string store, the shape of SharedPreferences / UserDefaults.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> SdkResult<()>;
    fn remove(&self, key: &str) -> SdkResult<()>;

    fn get_bool(&self, key: &str) -> bool {
        self.get(key).as_deref() == Some("true")
    }

    fn set_bool(&self, key: &str, value: bool) -> SdkResult<()> {
        self.set(key, value.to_string())
    }
}

/// Process-lifetime store; the default when no path is configured.
#[derive(Default)]
pub struct MemoryStore {
    values: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: String) -> SdkResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> SdkResult<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store, starting empty when the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Corrupt store file, starting empty");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn persist(&self, values: &HashMap<String, String>) -> SdkResult<()> {
        let raw = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, raw)
            .map_err(|e| SdkError::Storage(format!("{}: {e}", self.path.display())))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> SdkResult<()> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> SdkResult<()> {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}
