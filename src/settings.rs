//! Service configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file,
//! `SESSION_KEEPER__*` environment variables, then the `REDISCLOUD_URL` and
//! `PORT` variables kept for hosting platforms that inject them.

use std::{collections::HashMap, collections::HashSet, path::Path};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::session::MAX_TTL_SECONDS;

pub const ENV_PREFIX: &str = "SESSION_KEEPER";
pub const DEFAULT_CONFIG_FILE: &str = "config/default";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub redis: RedisSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisSettings {
    pub url: String,
    /// Prepended to every session token to form the Redis key.
    pub key_prefix: String,
}

/// The part of the configuration the session manager consumes.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionSettings {
    pub creation_keys: HashSet<String>,
    pub default_ttl_seconds: u64,
}

impl SessionSettings {
    pub fn new<I, K>(creation_keys: I, default_ttl_seconds: u64) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            creation_keys: creation_keys.into_iter().map(Into::into).collect(),
            default_ttl_seconds,
        }
    }

    pub fn accepts(&self, creation_key: &str) -> bool {
        !creation_key.is_empty() && self.creation_keys.contains(creation_key)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.creation_keys.iter().any(|key| !key.is_empty()) {
            return Err(SettingsError::Invalid(
                "session.creation_keys must contain at least one non-empty key".to_string(),
            ));
        }
        if self.default_ttl_seconds == 0 || self.default_ttl_seconds > MAX_TTL_SECONDS {
            return Err(SettingsError::Invalid(format!(
                "session.default_ttl_seconds must be between 1 and {}",
                MAX_TTL_SECONDS
            )));
        }
        Ok(())
    }
}

impl Settings {
    /// Loads from the given file (or `config/default.*` when present) and the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::from_sources(path, std::env::vars().collect())
    }

    pub fn from_sources(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.key_prefix", "")?
            .set_default("session.creation_keys", Vec::<String>::new())?
            .set_default("session.default_ttl_seconds", 3600)?
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("session.creation_keys")
                    .try_parsing(true)
                    .source(Some(env.clone().into_iter().collect())),
            )
            .set_override_option("redis.url", env.get("REDISCLOUD_URL").cloned())?
            .set_override_option("server.port", env.get("PORT").cloned())?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.session.validate()?;
        Ok(settings)
    }
}
