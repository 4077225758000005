//! Shared configuration for huesync.
//!
//! TOML bridge profiles, credential resolution (env + keyring + plaintext),
//! and translation to `huesync_api::BridgeConfig` plus the transport and
//! sync settings that go with it. Read-only: nothing is written back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use huesync_api::{BridgeConfig, ReconnectPolicy, TlsMode, TransportConfig};
use huesync_core::SyncParameters;

const KEYRING_SERVICE: &str = "huesync";
const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
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
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named bridge profiles.
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
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles.get(name).ok_or_else(|| {
            let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            names.sort_unstable();
            ConfigError::ProfileNotFound {
                name: name.into(),
                available: if names.is_empty() {
                    "(none)".into()
                } else {
                    names.join(", ")
                },
            }
        })
    }

    /// Copy with every plaintext secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for profile in copy.profiles.values_mut() {
            if profile.application_key.is_some() {
                profile.application_key = Some(REDACTED.into());
            }
            if profile.client_key.is_some() {
                profile.client_key = Some(REDACTED.into());
            }
        }
        copy
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Control request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_brightness")]
    pub brightness: f64,

    #[serde(default = "default_intensity")]
    pub intensity: f64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            brightness: default_brightness(),
            intensity: default_intensity(),
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
    30
}
fn default_brightness() -> f64 {
    SyncParameters::default().brightness
}
fn default_intensity() -> f64 {
    SyncParameters::default().intensity
}

/// A named bridge profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Bridge host name or IP (e.g., "192.168.1.20").
    pub address: String,

    /// Application key (plaintext; prefer keyring or env var).
    pub application_key: Option<String>,

    /// Environment variable name containing the application key.
    pub application_key_env: Option<String>,

    /// Hex client key used as the streaming pre-shared key.
    pub client_key: Option<String>,

    /// Environment variable name containing the client key.
    pub client_key_env: Option<String>,

    /// Default entertainment area, by id or name.
    pub area: Option<String>,

    /// Path to a custom CA certificate for the bridge.
    pub ca_cert: Option<PathBuf>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Override sync brightness.
    pub brightness: Option<f64>,

    /// Override sync intensity.
    pub intensity: Option<f64>,

    /// Event-stream reconnect attempts before giving up.
    pub event_retries: Option<u32>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "huesync", "huesync").map_or_else(
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
    p.push("huesync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// Nested keys are separated by a double underscore in variable names,
/// e.g. `HUESYNC_DEFAULTS__BRIGHTNESS`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HUESYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Render a config as TOML.
pub fn to_toml(cfg: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(cfg)?)
}

/// Resolve the active profile name from an explicit choice and config.
pub fn active_profile_name(explicit: Option<&str>, config: &Config) -> String {
    explicit
        .map(str::to_owned)
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

// ── Credential resolution ───────────────────────────────────────────

/// Secrets for one bridge. Either may be absent: pairing needs neither,
/// control calls need the application key, streaming needs both.
#[derive(Debug, Clone, Default)]
pub struct BridgeCredentials {
    pub application_key: Option<SecretString>,
    pub client_key: Option<SecretString>,
}

/// Resolve both bridge secrets for a profile.
///
/// Each secret is looked up in its `*_env` variable, then the system
/// keyring, then the plaintext profile value.
pub fn resolve_credentials(profile: &Profile, profile_name: &str) -> BridgeCredentials {
    BridgeCredentials {
        application_key: resolve_secret(
            profile.application_key_env.as_deref(),
            || keyring_secret(profile_name, "application-key"),
            profile.application_key.as_deref(),
        ),
        client_key: resolve_secret(
            profile.client_key_env.as_deref(),
            || keyring_secret(profile_name, "client-key"),
            profile.client_key.as_deref(),
        ),
    }
}

fn resolve_secret(
    env_name: Option<&str>,
    keyring: impl FnOnce() -> Option<String>,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    // 1. Env var named by the profile
    if let Some(value) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Some(SecretString::from(value));
    }

    // 2. System keyring
    if let Some(value) = keyring() {
        return Some(SecretString::from(value));
    }

    // 3. Plaintext in config
    plaintext.map(|value| SecretString::from(value.to_owned()))
}

fn keyring_secret(profile_name: &str, kind: &str) -> Option<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{kind}")).ok()?;
    entry.get_password().ok()
}

// ── Profile translation ─────────────────────────────────────────────

/// Build a `BridgeConfig` from a profile and already-resolved secrets.
pub fn build_bridge_config(
    profile: &Profile,
    credentials: BridgeCredentials,
) -> Result<BridgeConfig, ConfigError> {
    let mut config = BridgeConfig::new(profile.address.as_str()).map_err(|e| {
        ConfigError::Validation {
            field: "address".into(),
            reason: e.to_string(),
        }
    })?;
    if let Some(key) = credentials.application_key {
        config = config.with_application_key(key);
    }
    if let Some(key) = credentials.client_key {
        config = config.with_client_key(key);
    }
    Ok(config)
}

/// HTTP transport settings for a profile.
pub fn transport_config(profile: &Profile, defaults: &Defaults) -> TransportConfig {
    let tls = profile
        .ca_cert
        .as_ref()
        .map_or(TlsMode::DangerAcceptInvalid, |path| {
            TlsMode::CustomCa(path.clone())
        });

    TransportConfig {
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        ..TransportConfig::default()
    }
}

/// Sync parameters for a profile, falling back to global defaults.
pub fn sync_parameters(profile: &Profile, defaults: &Defaults) -> SyncParameters {
    SyncParameters::new(
        profile.brightness.unwrap_or(defaults.brightness),
        profile.intensity.unwrap_or(defaults.intensity),
    )
}

/// Event-stream reconnect behavior for a profile.
pub fn reconnect_policy(profile: &Profile) -> ReconnectPolicy {
    profile
        .event_retries
        .map_or_else(ReconnectPolicy::default, ReconnectPolicy::retrying)
}
