use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    db::{ConnectOptions, MongoUri},
    middleware::request_log::RequestLogFormat,
};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_SETTINGS_GROUP: &str = "development";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FORMAT: &str = "dev";
pub const DEFAULT_STATIC_DIR: &str = "static";

pub const ENV_SETTINGS_GROUP: &str = "SETTINGS_GROUP";
pub const ENV_PORT: &str = "EXPRESS_PORT";
pub const ENV_MONGODB_URI: &str = "MONGODB_URICOMPONENTS";
pub const ENV_MONGODB_OPTIONS: &str = "MONGODB_CONNECTOPTIONS";
pub const ENV_SESSION_SECRET: &str = "SESSION_SECRET";
pub const ENV_LOG_FORMAT: &str = "MORGAN_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("settings group `{0}` is not defined in the config file")]
    UnknownSettingsGroup(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },
    #[error("unknown request log format `{0}`")]
    UnknownLogFormat(String),
    #[error("session secret is not configured (set SESSION_SECRET or session.secret)")]
    MissingSessionSecret,
    #[error("session.maxAgeMinutes must be positive, got {0}")]
    InvalidSessionMaxAge(i64),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default = "default_settings_group")]
    pub settings_group: String,
    #[serde(flatten)]
    pub groups: HashMap<String, SettingsGroup>,
}

fn default_settings_group() -> String {
    DEFAULT_SETTINGS_GROUP.into()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            settings_group: default_settings_group(),
            groups: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsGroup {
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub mongodb: MongoSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub request_log: RequestLogSection,
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpSection {
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoSection {
    pub uri: Option<MongoUri>,
    pub connect_options: Option<ConnectOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSection {
    pub secret: Option<String>,
    pub max_age_minutes: Option<i64>,
    pub secure_cookie: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestLogSection {
    pub format: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub settings_group: String,
    pub port: u16,
    pub mongodb: MongoSettings,
    pub session: SessionSettings,
    pub request_log: RequestLogFormat,
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MongoSettings {
    pub uri: MongoUri,
    pub connect_options: ConnectOptions,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub secret: String,
    /// `None` keeps the cookie for the browser session only.
    pub max_age_minutes: Option<i64>,
    pub secure_cookie: bool,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Settings {
    /// Resolves from `CONFIG_PATH` (or `config.json`) and the process
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let file = ConfigFile::read(Path::new(&path))?;
        let settings = Self::resolve(&file, |key| std::env::var(key).ok())?;
        info!(
            settings_group = %settings.settings_group,
            port = settings.port,
            "configuration loaded"
        );
        Ok(settings)
    }

    /// Precedence: environment, then the selected file group, then defaults.
    /// Empty environment values count as unset.
    pub fn resolve<F>(file: &ConfigFile, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let settings_group = lookup(ENV_SETTINGS_GROUP).unwrap_or_else(|| file.settings_group.clone());
        let group = match file.groups.get(&settings_group) {
            Some(group) => group.clone(),
            None if file.groups.is_empty() => SettingsGroup::default(),
            None => return Err(ConfigError::UnknownSettingsGroup(settings_group)),
        };

        let port = match lookup(ENV_PORT) {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidEnv {
                var: ENV_PORT,
                reason: format!("{raw:?}: {e}"),
            })?,
            None => group.http.port.unwrap_or(DEFAULT_PORT),
        };

        let uri = match lookup(ENV_MONGODB_URI) {
            Some(raw) => MongoUri::from_env_value(&raw).map_err(|e| ConfigError::InvalidEnv {
                var: ENV_MONGODB_URI,
                reason: e.to_string(),
            })?,
            None => group.mongodb.uri.unwrap_or_default(),
        };

        let connect_options = match lookup(ENV_MONGODB_OPTIONS) {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidEnv {
                var: ENV_MONGODB_OPTIONS,
                reason: e.to_string(),
            })?,
            None => group.mongodb.connect_options.unwrap_or_default(),
        };

        let secret = lookup(ENV_SESSION_SECRET)
            .or(group.session.secret)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingSessionSecret)?;

        let max_age_minutes = match group.session.max_age_minutes {
            Some(minutes) if minutes <= 0 => return Err(ConfigError::InvalidSessionMaxAge(minutes)),
            other => other,
        };

        let format = lookup(ENV_LOG_FORMAT)
            .or(group.request_log.format)
            .unwrap_or_else(|| DEFAULT_LOG_FORMAT.into());
        let request_log = format
            .parse()
            .map_err(|_| ConfigError::UnknownLogFormat(format.clone()))?;

        Ok(Self {
            settings_group,
            port,
            mongodb: MongoSettings {
                uri,
                connect_options,
            },
            session: SessionSettings {
                secret,
                max_age_minutes,
                secure_cookie: group.session.secure_cookie.unwrap_or(false),
            },
            request_log,
            static_dir: group
                .static_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
        })
    }
}
