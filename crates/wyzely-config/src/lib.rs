//! Shared configuration for the wyzely command-line host.
//!
//! TOML profiles merged with `WYZELY_` environment variables, credential
//! resolution (env, keyring, plaintext), keyring-backed token storage,
//! and translation to `wyzely_core::CoordinatorConfig`.

mod credentials;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wyzely_core::config::{
    DEFAULT_POLL_INTERVAL, DEFAULT_PROPERTY_REFRESH_INTERVAL, DEFAULT_TIMEOUT,
};
use wyzely_core::{Account, CoordinatorConfig, Endpoints};

pub use credentials::{
    API_KEY, KEYRING_SERVICE, KeyringCredentialSink, PASSWORD, load_stored_credential,
    resolve_api_key, resolve_password, store_secret,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {what} configured for profile '{profile}'")]
    NoCredentials { profile: String, what: &'static str },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// The named profile, or the default one.
    pub fn profile<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Device-list poll interval, seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Extended-property sweep interval, seconds.
    #[serde(default = "default_property_refresh_interval")]
    pub property_refresh_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
            property_refresh_interval: default_property_refresh_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}
fn default_property_refresh_interval() -> u64 {
    DEFAULT_PROPERTY_REFRESH_INTERVAL.as_secs()
}

/// A named Wyze account profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account email.
    pub email: String,

    /// Developer API key id.
    pub key_id: String,

    /// Developer API key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Account password (plaintext; prefer keyring). May be `md5:`-prefixed
    /// when already hashed.
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Single base URL for every API surface (proxies, test servers).
    pub endpoint: Option<String>,

    pub timeout: Option<u64>,
    pub poll_interval: Option<u64>,
    pub property_refresh_interval: Option<u64>,

    /// Stream URL template, e.g. `rtsp://{ip}:8554/{name}`.
    pub stream_url_template: Option<String>,

    /// Image served when no camera still is available.
    pub placeholder_image: Option<PathBuf>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "wyzely", "wyzely").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("wyzely");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` plus environment. A missing file yields defaults.
///
/// Nested keys use a double underscore: `WYZELY_DEFAULTS__TIMEOUT=30`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("WYZELY_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Coordinator config ──────────────────────────────────────────────

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must not be empty".into(),
        });
    }
    Ok(value)
}

fn parse_endpoint(raw: &str) -> Result<Endpoints, ConfigError> {
    let url: url::Url = raw.trim().parse().map_err(|_| ConfigError::Validation {
        field: "endpoint".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("expected http or https, got '{}'", url.scheme()),
        });
    }
    Ok(Endpoints::single(url.as_str()))
}

/// Build a `CoordinatorConfig` from a profile, with secrets resolved and
/// any tokens stored by a previous run restored from the keyring.
pub fn profile_to_coordinator_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<CoordinatorConfig, ConfigError> {
    let email = required(&profile.email, "email")?;
    let key_id = required(&profile.key_id, "key_id")?;
    let endpoints = profile
        .endpoint
        .as_deref()
        .map(parse_endpoint)
        .transpose()?
        .unwrap_or_default();

    let password = resolve_password(profile, profile_name)?;
    let api_key = resolve_api_key(profile, profile_name)?;

    let mut cfg = CoordinatorConfig::new(Account::new(email, password, key_id, api_key))
        .with_endpoints(endpoints)
        .with_credential(load_stored_credential(profile_name));

    cfg.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    cfg.poll_interval =
        Duration::from_secs(profile.poll_interval.unwrap_or(defaults.poll_interval));
    cfg.property_refresh_interval = Duration::from_secs(
        profile
            .property_refresh_interval
            .unwrap_or(defaults.property_refresh_interval),
    );
    cfg.stream_url_template.clone_from(&profile.stream_url_template);
    cfg.placeholder_image.clone_from(&profile.placeholder_image);
    Ok(cfg)
}
