//! Settings for the administrative connection and for logging.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, `BOOTSTRAP__*` environment variables, then the plain `MONGODB_URI`
//! style variables a container usually sets.

use std::path::Path;

use config::{Config, Environment, File, FileFormat, Map};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "bootstrap.toml";

const ENV_PREFIX: &str = "BOOTSTRAP";
const ENV_SEPARATOR: &str = "__";

/// Plain variables kept for compatibility with existing deployments,
/// mapped onto their configuration keys.
const LEGACY_VARIABLES: [(&str, &str); 4] = [
    ("MONGODB_URI", "mongodb.uri"),
    ("MONGODB_CONNECT_TIMEOUT_MS", "mongodb.connect_timeout_ms"),
    ("MONGODB_SERVER_SELECTION_TIMEOUT_MS", "mongodb.server_selection_timeout_ms"),
    ("APP_ENV", "log.env"),
];

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration")]
    Load(#[from] config::ConfigError),
    #[error("configuration file {0} does not exist")]
    FileNotFound(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub mongodb: MongoSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoSettings {
    pub uri: String,
    pub connect_timeout_ms: u64,
    pub server_selection_timeout_ms: u64,
    pub app_name: String,
    /// Pin the stable server API v1. Servers older than 5.0 reject it.
    #[serde(default)]
    pub stable_api: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEnv {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub env: LogEnv,
    /// Where production JSON logs go. Stdout when unset or unwritable.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            env: LogEnv::Development,
            file: None,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (or [`DEFAULT_CONFIG_FILE`]) and the process
    /// environment. An explicit path must exist; the default one may not.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let env: Map<String, String> = std::env::vars().collect();
        Self::load_with_env(path, env)
    }

    pub fn load_with_env(
        path: Option<&str>,
        env: Map<String, String>,
    ) -> Result<Self, ConfigError> {
        let (file, required) = match path {
            Some(path) => {
                if !Path::new(path).exists() {
                    return Err(ConfigError::FileNotFound(path.to_string()));
                }
                (path, true)
            }
            None => (DEFAULT_CONFIG_FILE, false),
        };

        let mut builder = Config::builder()
            .set_default("mongodb.uri", "mongodb://mongo:27017")?
            .set_default("mongodb.connect_timeout_ms", 10_000)?
            .set_default("mongodb.server_selection_timeout_ms", 30_000)?
            .set_default("mongodb.app_name", "downtime-bootstrap")?
            .set_default("mongodb.stable_api", false)?
            .set_default("log.env", "development")?
            .add_source(File::new(file, FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(Some(env.clone())),
            );

        for (variable, key) in LEGACY_VARIABLES {
            builder = builder.set_override_option(key, env.get(variable).cloned())?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}
