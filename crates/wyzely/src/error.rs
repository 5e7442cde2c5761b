//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use wyzely_config::ConfigError;
use wyzely_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const RATE_LIMITED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Wyze cloud at {url}")]
    #[diagnostic(
        code(wyzely::connection_failed),
        help("Check your network connection.\nReason: {reason}")
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(wyzely::auth_failed),
        help(
            "Verify the account email, password, key id and API key.\n\
             Keys are issued at https://developer-api-console.wyze.com\n\
             Run: wyzely login"
        )
    )]
    AuthFailed { message: String },

    #[error("No {what} configured for profile '{profile}'")]
    #[diagnostic(
        code(wyzely::no_credentials),
        help(
            "Configure credentials with: wyzely config init\n\
             Or set WYZELY_EMAIL, WYZELY_PASSWORD, WYZELY_KEY_ID and WYZELY_API_KEY."
        )
    )]
    NoCredentials { profile: String, what: String },

    // ── Rate limiting ────────────────────────────────────────────────
    #[error("Rate limited by the Wyze cloud")]
    #[diagnostic(
        code(wyzely::rate_limited),
        help("Try again in {retry_after_secs}s.")
    )]
    RateLimited { retry_after_secs: u64 },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(wyzely::not_found),
        help("Run: wyzely {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Control '{control}' is not available on camera {mac}")]
    #[diagnostic(
        code(wyzely::control_unavailable),
        help("Run: wyzely device {mac} to see the camera's controls")
    )]
    ControlUnavailable { control: String, mac: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(wyzely::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(wyzely::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(wyzely::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: wyzely config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No account configured")]
    #[diagnostic(
        code(wyzely::no_config),
        help(
            "Create a profile with: wyzely config init\n\
             Expected at: {path}\n\
             Or set WYZELY_EMAIL, WYZELY_PASSWORD, WYZELY_KEY_ID and WYZELY_API_KEY."
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(wyzely::config))]
    Config { message: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(wyzely::timeout),
        help("Increase the timeout with --timeout.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(wyzely::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::RateLimited { .. } => exit_code::RATE_LIMITED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::ControlUnavailable { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::RateLimited {
                retry_after_secs, ..
            } => CliError::RateLimited { retry_after_secs },

            CoreError::CoordinatorStopped => CliError::ConnectionFailed {
                url: "(stopped)".into(),
                reason: "the coordinator was shut down".into(),
            },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "camera".into(),
                identifier,
                list_command: "devices".into(),
            },

            CoreError::MissingModel { mac } => CliError::Validation {
                field: "model".into(),
                reason: format!("camera {mac} reports no model; property writes need one"),
            },

            CoreError::UnknownControl { name } => CliError::Validation {
                field: "control".into(),
                reason: format!(
                    "unknown control '{name}', expected one of: {}",
                    known_controls()
                ),
            },

            CoreError::ControlUnavailable { control, mac } => {
                CliError::ControlUnavailable { control, mac }
            }

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Api {
                message,
                code,
                status,
            } => CliError::ApiError {
                code: code
                    .or_else(|| status.map(|s| format!("http {s}")))
                    .unwrap_or_else(|| "unknown".into()),
                message,
            },

            CoreError::Config { message } => CliError::Config { message },
        }
    }
}

fn known_controls() -> String {
    wyzely_core::CONTROLS
        .iter()
        .map(|c| c.key.as_ref().replace('_', "-"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile, what } => CliError::NoCredentials {
                profile,
                what: what.into(),
            },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
