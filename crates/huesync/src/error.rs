//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use huesync_config::ConfigError;
use huesync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the bridge at {address}")]
    #[diagnostic(
        code(huesync::connection_failed),
        help(
            "Check that the bridge is powered and on the same network.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { address: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("No application key configured for profile '{profile}'")]
    #[diagnostic(
        code(huesync::no_credentials),
        help(
            "Press the bridge's link button and run: huesync pair\n\
             Then store the key in your profile, the keyring, or HUESYNC_APPLICATION_KEY."
        )
    )]
    NoCredentials { profile: String },

    #[error("The bridge refused to pair: {reason}")]
    #[diagnostic(
        code(huesync::pairing_refused),
        help("Press the link button on the bridge, then run the command again within 30 seconds.")
    )]
    PairingRefused { reason: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(huesync::not_found),
        help("Run: huesync {list_command} to see what the bridge has")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{message}")]
    #[diagnostic(code(huesync::conflict))]
    Conflict { message: String },

    // ── Bridge ───────────────────────────────────────────────────────
    #[error("Bridge error: {message}")]
    #[diagnostic(code(huesync::bridge_error))]
    BridgeError { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(huesync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(huesync::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No bridge configured")]
    #[diagnostic(
        code(huesync::no_config),
        help(
            "Pass --bridge <address>, set HUESYNC_BRIDGE, or add a profile to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(huesync::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(huesync::json), help("Check the JSON payload and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NoCredentials { .. } | Self::PairingRefused { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { address, reason } => {
                CliError::ConnectionFailed { address, reason }
            }

            CoreError::AreaNotFound { identifier } => CliError::NotFound {
                resource_type: "entertainment area".into(),
                identifier,
                list_command: "areas list".into(),
            },

            CoreError::AlreadyStreaming { .. } => CliError::Conflict {
                message: err.to_string(),
            },

            CoreError::NoStreamingCredentials => CliError::NoCredentials {
                profile: "current".into(),
            },

            CoreError::EmptyArea { area_id } => CliError::Validation {
                field: "area".into(),
                reason: format!("{area_id} has no channels"),
            },

            CoreError::Rejected { message } | CoreError::Internal(message) => {
                CliError::BridgeError { message }
            }

            CoreError::Config { message } => CliError::Validation {
                field: "bridge".into(),
                reason: message,
            },
        }
    }
}

impl From<huesync_api::Error> for CliError {
    fn from(err: huesync_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => {
                CliError::ProfileNotFound { name, available }
            }
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
