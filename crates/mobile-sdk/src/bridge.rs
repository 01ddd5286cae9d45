//! Messages posted by in-app HTML through the JavaScript bridge.
//!
//! Creatives call `postMessage` with
//! `{"event": "...", "timestamp": 0, "data": {"url": "...", "label": "...", "value": "..."}}`.
//! A non-empty `value` is a CTA and closes the overlay.

use pushapp_core::types::TrackEvent;
use pushapp_core::SdkResult;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::lenient;

/// Scalars are accepted for every field: `handleClick('click', 'Buy', 1)`
/// posts a numeric `value`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BridgeData {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BridgeMessage {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub event: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub timestamp: Option<i64>,
    #[serde(default, deserialize_with = "object_data")]
    pub data: Option<BridgeData>,
}

/// `data` that is not an object carries no CTA.
fn object_data<'de, D: Deserializer<'de>>(d: D) -> Result<Option<BridgeData>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        Some(value @ Value::Object(_)) => {
            serde_json::from_value(value).map(Some).map_err(serde::de::Error::custom)
        }
        _ => Ok(None),
    }
}

impl BridgeMessage {
    pub fn parse(raw: &str) -> SdkResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// CTA identifier, if the message carries one.
    pub fn cta_value(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.value.as_deref())
            .filter(|v| !v.is_empty())
    }

    /// The close event this message implies, if any.
    pub fn close_event(&self) -> Option<TrackEvent> {
        self.cta_value().map(|cta_id| TrackEvent::Cta {
            cta_id: cta_id.to_string(),
        })
    }
}
