//! Configuration structs

mod client_config;

pub use client_config::{
    AppSettings, AuthConfig, ClientConfig, ClientProperties, ConfigError, Environment,
    EventConfig, GatewayConfig, MemberConfig, ReconnectConfig,
};
