//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub app: AppSettings,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub properties: ClientProperties,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub members: MemberConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            other => Err(format!("unknown environment {other:?}")),
        }
    }
}

/// Gateway connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base WebSocket URL, e.g. `wss://gateway.example.com/gateway`
    pub url: String,
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    /// Request zlib-stream transport compression
    #[serde(default)]
    pub compress: bool,
    /// Bound on each connect attempt, including the wait for Hello
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Outbound frame budget enforced by the single writer
    #[serde(default = "default_outbound_per_minute")]
    pub outbound_per_minute: u32,
}

impl GatewayConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Authentication settings (only the demo binary reads the token from here)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub token: Option<String>,
}

/// Client metadata sent with Identify
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientProperties {
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default = "default_device")]
    pub device: String,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            os: default_os(),
            browser: default_browser(),
            device: default_device(),
        }
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Consecutive failed attempts tolerated before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ReconnectConfig {
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Event delivery settings
#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    /// Per-topic queue capacity; slow consumers lose the oldest events beyond it
    #[serde(default = "default_event_buffer")]
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_event_buffer(),
        }
    }
}

/// Member request settings
#[derive(Debug, Clone, Deserialize)]
pub struct MemberConfig {
    /// Protocol cap on user ids per RequestGuildMembers frame
    #[serde(default = "default_max_ids_per_request")]
    pub max_ids_per_request: usize,
}

impl Default for MemberConfig {
    fn default() -> Self {
        Self {
            max_ids_per_request: default_max_ids_per_request(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "chat-gateway-client".to_string()
}

fn default_api_version() -> u8 {
    9
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_outbound_per_minute() -> u32 {
    120
}

fn default_os() -> String {
    env::consts::OS.to_string()
}

fn default_browser() -> String {
    "chat-gateway-client".to_string()
}

fn default_device() -> String {
    "desktop".to_string()
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    10
}

fn default_event_buffer() -> usize {
    512
}

fn default_max_ids_per_request() -> usize {
    100
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: Environment::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration with every optional setting at its default
    #[must_use]
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            app: AppSettings::default(),
            gateway: GatewayConfig {
                url: gateway_url.into(),
                api_version: default_api_version(),
                compress: false,
                connect_timeout_ms: default_connect_timeout_ms(),
                outbound_per_minute: default_outbound_per_minute(),
            },
            auth: AuthConfig::default(),
            properties: ClientProperties::default(),
            reconnect: ReconnectConfig::default(),
            events: EventConfig::default(),
            members: MemberConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `GATEWAY_URL` is missing or a variable fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let url = lookup("GATEWAY_URL").ok_or(ConfigError::MissingVar("GATEWAY_URL"))?;
        let mut config = Self::new(url);

        if let Some(name) = lookup("APP_NAME") {
            config.app.name = name;
        }
        config.app.env = parse_var(&lookup, "APP_ENV", config.app.env)?;

        let gateway = &mut config.gateway;
        gateway.api_version = parse_var(&lookup, "GATEWAY_API_VERSION", gateway.api_version)?;
        gateway.compress = parse_var(&lookup, "GATEWAY_COMPRESS", gateway.compress)?;
        gateway.connect_timeout_ms =
            parse_var(&lookup, "GATEWAY_CONNECT_TIMEOUT_MS", gateway.connect_timeout_ms)?;
        gateway.outbound_per_minute =
            parse_var(&lookup, "OUTBOUND_RATE_PER_MINUTE", gateway.outbound_per_minute)?;
        if gateway.outbound_per_minute == 0 {
            return Err(ConfigError::InvalidValue(
                "OUTBOUND_RATE_PER_MINUTE",
                "must be greater than zero".to_string(),
            ));
        }

        config.auth.token = lookup("GATEWAY_TOKEN").filter(|t| !t.is_empty());

        if let Some(os) = lookup("CLIENT_OS") {
            config.properties.os = os;
        }
        if let Some(browser) = lookup("CLIENT_BROWSER") {
            config.properties.browser = browser;
        }
        if let Some(device) = lookup("CLIENT_DEVICE") {
            config.properties.device = device;
        }

        let reconnect = &mut config.reconnect;
        reconnect.base_delay_ms =
            parse_var(&lookup, "RECONNECT_BASE_DELAY_MS", reconnect.base_delay_ms)?;
        reconnect.max_delay_ms =
            parse_var(&lookup, "RECONNECT_MAX_DELAY_MS", reconnect.max_delay_ms)?;
        reconnect.max_retries = parse_var(&lookup, "RECONNECT_MAX_RETRIES", reconnect.max_retries)?;

        config.events.buffer_size =
            parse_var(&lookup, "EVENT_BUFFER_SIZE", config.events.buffer_size)?;
        if config.events.buffer_size == 0 {
            return Err(ConfigError::InvalidValue(
                "EVENT_BUFFER_SIZE",
                "must be greater than zero".to_string(),
            ));
        }
        config.members.max_ids_per_request = parse_var(
            &lookup,
            "MEMBER_REQUEST_BATCH",
            config.members.max_ids_per_request,
        )?
        .max(1);

        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
