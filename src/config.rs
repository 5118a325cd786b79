use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::auth::config::{OAuthConfig, ProviderConfig, SessionConfig, StateConfig};
pub use crate::database::config::DatabaseConfig;
pub use crate::server::config::{LoggingConfig, ServerConfig};

const ENV_PREFIX: &str = "DATAHUB";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(env_source());

        builder.build()?.try_deserialize()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(env_source());

        builder.build()?.try_deserialize()
    }

    /// Rejects configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.secret.is_empty() {
            return Err(ConfigError::Message(
                "session.secret must not be empty".to_string(),
            ));
        }
        if self.session.ttl_seconds == 0 {
            return Err(ConfigError::Message(
                "session.ttl_seconds must be positive".to_string(),
            ));
        }
        if self.state.ttl_seconds == 0 {
            return Err(ConfigError::Message(
                "state.ttl_seconds must be positive".to_string(),
            ));
        }
        match self.state.backend.as_str() {
            "memory" | "redis" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "unsupported state backend: {other}"
                )));
            }
        }
        if !self.oauth.google.is_configured() {
            return Err(ConfigError::Message(
                "oauth.google client_id and client_secret are required".to_string(),
            ));
        }
        if self.oauth.google.callback_url.is_empty() {
            return Err(ConfigError::Message(
                "oauth.google.callback_url is required".to_string(),
            ));
        }
        if self.oauth.github.is_configured() && self.oauth.github.callback_url.is_empty() {
            return Err(ConfigError::Message(
                "oauth.github.callback_url is required when GitHub is configured".to_string(),
            ));
        }
        if self.oauth.request_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "oauth.request_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.database.connect_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "database.connect_timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}
