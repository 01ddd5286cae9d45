//! Typed client for the PushApp REST endpoints.
//!
//! Every call is a JSON POST carrying the device headers. Calls are attempted
//! once; callers decide whether a failure is worth more than a log line.

use std::sync::Arc;

use pushapp_core::types::TrackEvent;
use pushapp_core::{SdkError, SdkResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{Backend, Headers};
use crate::device::{DeviceInfo, DevicePlatform};
use crate::session::Session;

pub mod endpoints {
    pub const REGISTER: &str = "/register";
    pub const REGISTER_USER: &str = "/register/user";
    pub const EVENT: &str = "/v1/event";
    pub const UPDATE_TOKEN: &str = "/update/token";
    pub const IN_APP_ACK: &str = "/v1/notification/in-app/ack";
    pub const IN_APP_TRACK: &str = "/v1/notification/in-app/track";
    pub const IN_APP_POLL: &str = "/v1/notification/in-app/poll";
    pub const PUSH_TRACK: &str = "/v1/notification/push/track";
    pub const PING: &str = "/ping";
    pub const CUSTOMER_PROFILE: &str = "/v1/customer/profile";
}

#[derive(Debug, Serialize)]
struct RegisterDeviceBody<'a> {
    platform: &'a str,
    token: &'a str,
    device_id: &'a str,
    channel_id: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterUserBody<'a> {
    user_id: &'a str,
    device_id: &'a str,
    channel_id: &'a str,
}

#[derive(Debug, Serialize)]
struct EventBody<'a> {
    user_id: &'a str,
    channel_id: &'a str,
    event_name: &'a str,
    event_data: &'a Value,
}

#[derive(Debug, Serialize)]
struct UpdateTokenBody<'a> {
    contact_id: &'a str,
    token: &'a str,
    channel_id: &'a str,
}

#[derive(Debug, Serialize)]
struct AckBody<'a> {
    contact_id: &'a str,
    #[serde(rename = "messageId")]
    message_id: &'a str,
}

#[derive(Debug, Serialize)]
struct CtaData<'a> {
    #[serde(rename = "ctaId")]
    cta_id: &'a str,
}

#[derive(Debug, Serialize)]
struct InAppTrackBody<'a> {
    #[serde(rename = "messageId")]
    message_id: &'a str,
    event: &'a str,
    #[serde(rename = "filterId", skip_serializing_if = "Option::is_none")]
    filter_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<CtaData<'a>>,
}

#[derive(Debug, Serialize)]
struct PushTrackBody<'a> {
    t: &'a str,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<CtaData<'a>>,
}

#[derive(Debug, Serialize)]
struct PollBody<'a> {
    contact_id: &'a str,
}

#[derive(Debug, Serialize)]
struct PingBody<'a> {
    channel_id: &'a str,
    contact_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ProfileBody<'a> {
    contact_id: &'a str,
    code: &'a str,
    channel_id: &'a str,
    cohorts: &'a Value,
    #[serde(rename = "additionalInfo")]
    additional_info: &'a Value,
}

#[derive(Debug, Default, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    device: Option<RegisteredDevice>,
}

#[derive(Debug, Default, Deserialize)]
struct RegisteredDevice {
    #[serde(default)]
    user_id: Option<String>,
}

/// Push interaction reported to the push track endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
    Opened,
    Cta,
}

impl PushEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            PushEvent::Opened => "opened",
            PushEvent::Cta => "cta",
        }
    }
}

pub struct ApiClient {
    backend: Arc<dyn Backend>,
    session: Arc<Session>,
    device: DeviceInfo,
    api_prefix: String,
}

impl ApiClient {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<Session>,
        device: DeviceInfo,
        api_prefix: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            session,
            device,
            api_prefix: api_prefix.into(),
        }
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn device_headers(&self) -> Headers {
        self.device.headers(self.session.device_id())
    }

    async fn post<T: Serialize>(&self, endpoint: &str, body: &T) -> SdkResult<String> {
        if !self.session.is_initialized() {
            return Err(SdkError::NotInitialized);
        }
        let server_url = self.session.snapshot().server_url;
        let url = format!("{server_url}{}{endpoint}", self.api_prefix);
        let body = serde_json::to_value(body)?;

        debug!(url = %url, body = %body, "POST");
        metrics::counter!("pushapp.api.requests", "endpoint" => endpoint.to_string())
            .increment(1);

        let result = self
            .backend
            .post_json(&url, &self.device_headers(), &body)
            .await;
        if result.is_err() {
            metrics::counter!("pushapp.api.failures", "endpoint" => endpoint.to_string())
                .increment(1);
        }
        result
    }

    fn contact_id(&self) -> SdkResult<String> {
        self.session.snapshot().contact_id().ok_or(SdkError::NoIdentity)
    }

    /// Register the push token. Returns the guest id assigned by the server.
    pub async fn register_device(
        &self,
        platform: DevicePlatform,
        token: &str,
    ) -> SdkResult<Option<String>> {
        let channel_id = self.session.snapshot().channel_id;
        let raw = self
            .post(
                endpoints::REGISTER,
                &RegisterDeviceBody {
                    platform: platform.as_str(),
                    token,
                    device_id: self.session.device_id(),
                    channel_id: &channel_id,
                },
            )
            .await?;
        let parsed: RegisterResponse = if raw.trim().is_empty() {
            RegisterResponse::default()
        } else {
            serde_json::from_str(&raw)?
        };
        Ok(parsed
            .device
            .and_then(|d| d.user_id)
            .filter(|id| !id.is_empty()))
    }

    pub async fn register_user(&self, user_id: &str) -> SdkResult<()> {
        let channel_id = self.session.snapshot().channel_id;
        self.post(
            endpoints::REGISTER_USER,
            &RegisterUserBody {
                user_id,
                device_id: self.session.device_id(),
                channel_id: &channel_id,
            },
        )
        .await
        .map(drop)
    }

    pub async fn send_event(&self, user_id: &str, name: &str, data: &Value) -> SdkResult<()> {
        let channel_id = self.session.snapshot().channel_id;
        self.post(
            endpoints::EVENT,
            &EventBody {
                user_id,
                channel_id: &channel_id,
                event_name: name,
                event_data: data,
            },
        )
        .await
        .map(drop)
    }

    pub async fn update_token(&self, token: &str) -> SdkResult<()> {
        let contact_id = self.contact_id()?;
        let channel_id = self.session.snapshot().channel_id;
        self.post(
            endpoints::UPDATE_TOKEN,
            &UpdateTokenBody {
                contact_id: &contact_id,
                token,
                channel_id: &channel_id,
            },
        )
        .await
        .map(drop)
    }

    pub async fn ack_in_app(&self, message_id: &str) -> SdkResult<()> {
        let contact_id = self.contact_id()?;
        self.post(
            endpoints::IN_APP_ACK,
            &AckBody {
                contact_id: &contact_id,
                message_id,
            },
        )
        .await
        .map(drop)
    }

    pub async fn track_in_app(
        &self,
        message_id: &str,
        filter_id: Option<&str>,
        event: &TrackEvent,
    ) -> SdkResult<()> {
        self.post(
            endpoints::IN_APP_TRACK,
            &InAppTrackBody {
                message_id,
                event: event.name(),
                filter_id,
                data: event.cta_id().map(|cta_id| CtaData { cta_id }),
            },
        )
        .await
        .map(drop)
    }

    pub async fn track_push(
        &self,
        click_token: &str,
        event: PushEvent,
        cta_id: Option<&str>,
    ) -> SdkResult<()> {
        self.post(
            endpoints::PUSH_TRACK,
            &PushTrackBody {
                t: click_token,
                event: event.as_str(),
                data: cta_id.map(|cta_id| CtaData { cta_id }),
            },
        )
        .await
        .map(drop)
    }

    /// Fetch pending in-app content. Returns the raw body for `inbox::parse_poll_response`.
    pub async fn poll_in_app(&self) -> SdkResult<String> {
        let contact_id = self.contact_id()?;
        self.post(
            endpoints::IN_APP_POLL,
            &PollBody {
                contact_id: &contact_id,
            },
        )
        .await
    }

    pub async fn ping(&self) -> SdkResult<()> {
        let contact_id = self.contact_id()?;
        let channel_id = self.session.snapshot().channel_id;
        self.post(
            endpoints::PING,
            &PingBody {
                channel_id: &channel_id,
                contact_id: &contact_id,
            },
        )
        .await
        .map(drop)
    }

    pub async fn update_customer_profile(
        &self,
        cohorts: &Value,
        additional_info: &Value,
    ) -> SdkResult<()> {
        let contact_id = self.contact_id()?;
        let channel_id = self.session.snapshot().channel_id;
        self.post(
            endpoints::CUSTOMER_PROFILE,
            &ProfileBody {
                contact_id: &contact_id,
                code: &contact_id,
                channel_id: &channel_id,
                cohorts,
                additional_info,
            },
        )
        .await
        .map(drop)
    }
}
