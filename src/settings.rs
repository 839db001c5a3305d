//! Application settings, read from an optional `settings.toml` in the
//! working directory and overridden by `SPLITFLOW__...` environment
//! variables (e.g. `SPLITFLOW__SERVER__PORT=9000`).
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Log {
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Store {
    #[default]
    Memory,
    Mongo {
        uri: String,
        #[serde(default = "default_database")]
        database: String,
    },
}

fn default_database() -> String {
    "SplitFlow".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Auth {
    pub secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cors {
    pub allowed_origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub store: Store,
    pub auth: Auth,
    #[serde(default)]
    pub cors: Cors,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("SPLITFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        if settings.auth.secret.trim().is_empty() {
            return Err(ConfigError::Message("auth.secret must not be empty".to_string()));
        }
        Ok(settings)
    }
}
