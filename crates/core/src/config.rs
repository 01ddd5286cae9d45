use serde::Deserialize;
use std::time::Duration;

/// Root SDK configuration. Loaded from environment variables with the
/// prefix `PUSHAPP__`; every field has a default so an empty environment
/// yields a working production setup.
#[derive(Debug, Clone, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub poll: PollPolicy,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Host suffix for production tenants: `https://<tenant>.<domain>`.
    #[serde(default = "default_production_domain")]
    pub production_domain: String,
    #[serde(default = "default_sandbox_domain")]
    pub sandbox_domain: String,
    /// Host suffix for the realtime socket: `wss://<tenant>.<domain>/pushapp`.
    #[serde(default = "default_socket_domain")]
    pub socket_domain: String,
    /// Full socket URL used instead of the tenant-derived one.
    #[serde(default)]
    pub socket_endpoint: Option<String>,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

/// Controls the poll-for-in-app call that follows every delivered event.
#[derive(Debug, Clone, Deserialize)]
pub struct PollPolicy {
    #[serde(default = "default_poll_enabled")]
    pub enabled: bool,
    #[serde(default = "default_poll_delay_ms")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// JSON file used for persisted flags. In-memory when unset.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_production_domain() -> String {
    "pushapp.co.in".to_string()
}
fn default_sandbox_domain() -> String {
    "pushapp.com".to_string()
}
fn default_socket_domain() -> String {
    "mehery.com".to_string()
}
fn default_api_prefix() -> String {
    "/pushapp/api".to_string()
}
fn default_poll_enabled() -> bool {
    true
}
fn default_poll_delay_ms() -> u64 {
    2000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            production_domain: default_production_domain(),
            sandbox_domain: default_sandbox_domain(),
            socket_domain: default_socket_domain(),
            socket_endpoint: None,
            api_prefix: default_api_prefix(),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            enabled: default_poll_enabled(),
            delay_ms: default_poll_delay_ms(),
        }
    }
}

impl PollPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Poll right away; used by rule-triggered socket frames.
    pub fn immediate() -> Self {
        Self {
            enabled: true,
            delay_ms: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: None }
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            poll: PollPolicy::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl NetworkConfig {
    /// REST base URL for a tenant.
    pub fn server_url(&self, tenant: &str, sandbox: bool) -> String {
        let domain = if sandbox {
            &self.sandbox_domain
        } else {
            &self.production_domain
        };
        format!("https://{tenant}.{domain}")
    }

    pub fn socket_url(&self, tenant: &str) -> String {
        match &self.socket_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("wss://{tenant}.{}/pushapp", self.socket_domain),
        }
    }
}

impl SdkConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("PUSHAPP")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        tracing::debug!(
            poll_enabled = config.poll.enabled,
            poll_delay_ms = config.poll.delay_ms,
            persistent = config.storage.path.is_some(),
            "Loaded SDK config"
        );
        Ok(config)
    }
}
