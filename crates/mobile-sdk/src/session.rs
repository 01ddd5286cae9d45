//! Session identity: tenant, channel, user/guest and device, shared by every
//! collaborator through an explicit `Arc<Session>` instead of a global.

use std::str::FromStr;

use parking_lot::RwLock;
use pushapp_core::config::NetworkConfig;
use pushapp_core::{SdkError, SdkResult};
use serde::Serialize;

/// `tenant$channelId` as issued by the PushApp console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub tenant: String,
    pub channel_id: String,
}

impl FromStr for Identifier {
    type Err = SdkError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split('$').collect();
        match parts.as_slice() {
            [tenant, channel_id] if !tenant.is_empty() && !channel_id.is_empty() => Ok(Self {
                tenant: tenant.to_string(),
                channel_id: channel_id.to_string(),
            }),
            _ => Err(SdkError::InvalidIdentifier(raw.to_string())),
        }
    }
}

/// Point-in-time copy of the session, safe to hand to async tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionIdentity {
    pub tenant: String,
    pub channel_id: String,
    pub user_id: Option<String>,
    pub guest_id: Option<String>,
    pub device_id: String,
    pub server_url: String,
    pub socket_url: String,
    pub sandbox: bool,
}

impl SessionIdentity {
    /// The logged-in user, falling back to the server-assigned guest.
    pub fn resolved_id(&self) -> Option<&str> {
        self.user_id.as_deref().or(self.guest_id.as_deref())
    }

    /// `<user>_<device>` key used by ack, poll, ping and profile calls.
    pub fn contact_id(&self) -> Option<String> {
        self.resolved_id()
            .map(|id| format!("{id}_{}", self.device_id))
    }
}

#[derive(Debug, Default)]
struct SessionState {
    tenant: String,
    channel_id: String,
    server_url: String,
    socket_url: String,
    sandbox: bool,
    initialized: bool,
    user_id: Option<String>,
    guest_id: Option<String>,
}

pub struct Session {
    device_id: String,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(device_id: String) -> Self {
        Self {
            device_id,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Bind the session to a tenant. Returns `Ok(false)` if already bound.
    pub fn configure(
        &self,
        identifier: &Identifier,
        sandbox: bool,
        network: &NetworkConfig,
    ) -> SdkResult<bool> {
        let mut state = self.state.write();
        if state.initialized {
            return Ok(false);
        }
        state.tenant = identifier.tenant.clone();
        state.channel_id = identifier.channel_id.clone();
        state.server_url = network.server_url(&identifier.tenant, sandbox);
        state.socket_url = network.socket_url(&identifier.tenant);
        state.sandbox = sandbox;
        state.initialized = true;
        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn set_user_id(&self, user_id: String) {
        self.state.write().user_id = Some(user_id);
    }

    pub fn set_guest_id(&self, guest_id: Option<String>) {
        self.state.write().guest_id = guest_id.filter(|g| !g.is_empty());
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.read().user_id.clone()
    }

    pub fn has_identity(&self) -> bool {
        let state = self.state.read();
        state.user_id.is_some() || state.guest_id.is_some()
    }

    pub fn snapshot(&self) -> SessionIdentity {
        let state = self.state.read();
        SessionIdentity {
            tenant: state.tenant.clone(),
            channel_id: state.channel_id.clone(),
            user_id: state.user_id.clone(),
            guest_id: state.guest_id.clone(),
            device_id: self.device_id.clone(),
            server_url: state.server_url.clone(),
            socket_url: state.socket_url.clone(),
            sandbox: state.sandbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_parsing() {
        let id: Identifier = "acme$ch-01".parse().unwrap();
        assert_eq!(id.tenant, "acme");
        assert_eq!(id.channel_id, "ch-01");

        assert!("acme".parse::<Identifier>().is_err());
        assert!("a$b$c".parse::<Identifier>().is_err());
        assert!("$ch".parse::<Identifier>().is_err());
    }

    #[test]
    fn test_configure_once() {
        let session = Session::new("dev-1".into());
        let network = NetworkConfig::default();
        let id: Identifier = "acme$ch".parse().unwrap();

        assert!(session.configure(&id, true, &network).unwrap());
        let other: Identifier = "other$ch".parse().unwrap();
        assert!(!session.configure(&other, false, &network).unwrap());

        let snap = session.snapshot();
        assert_eq!(snap.tenant, "acme");
        assert_eq!(snap.server_url, "https://acme.pushapp.com");
    }

    #[test]
    fn test_contact_id_prefers_user() {
        let session = Session::new("dev-1".into());
        assert_eq!(session.snapshot().contact_id(), None);

        session.set_guest_id(Some("guest-7".into()));
        assert_eq!(session.snapshot().contact_id().as_deref(), Some("guest-7_dev-1"));

        session.set_user_id("user-1".into());
        assert_eq!(session.snapshot().contact_id().as_deref(), Some("user-1_dev-1"));
    }

    #[test]
    fn test_blank_guest_is_ignored() {
        let session = Session::new("dev-1".into());
        session.set_guest_id(Some(String::new()));
        assert!(!session.has_identity());
    }
}
