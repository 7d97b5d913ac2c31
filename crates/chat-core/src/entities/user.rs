//! User entity - the public profile of an account as seen over the gateway

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Public user profile embedded in members, messages and READY
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// Create a user with only the required fields set
    pub fn new(id: Snowflake, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            discriminator: None,
            global_name: None,
            avatar: None,
            bot: false,
        }
    }

    /// Name to show in the UI: global display name, falling back to username
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// Get the legacy tag: username#discriminator (username alone when unset or "0")
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }

    /// Fold a newer copy of the same user into this one.
    ///
    /// Required fields are replaced; optional fields are only replaced when the
    /// newer copy carries a value.
    pub fn merge(&mut self, newer: User) {
        debug_assert_eq!(self.id, newer.id);
        self.username = newer.username;
        self.bot = newer.bot;
        if newer.discriminator.is_some() {
            self.discriminator = newer.discriminator;
        }
        if newer.global_name.is_some() {
            self.global_name = newer.global_name;
        }
        if newer.avatar.is_some() {
            self.avatar = newer.avatar;
        }
    }
}
