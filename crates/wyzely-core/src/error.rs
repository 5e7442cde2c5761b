// ── Core error types ──
//
// User-facing errors from wyzely-core. Consumers never see envelope
// codes or raw HTTP failures; the `From<wyzely_api::Error>` impl folds
// transport-layer errors into domain variants.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::backoff::RateLimitPolicy;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the Wyze cloud at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Rate limited by the Wyze cloud; retry in {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        reset_by: Option<DateTime<Utc>>,
    },

    #[error("Coordinator is stopped")]
    CoordinatorStopped,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Camera not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Camera {mac} has no product model; property writes need one")]
    MissingModel { mac: String },

    #[error("Unknown control: {name}")]
    UnknownControl { name: String },

    #[error("Control {control} is not available on camera {mac}")]
    ControlUnavailable { control: String, mac: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// Envelope error code, when the cloud returned one.
        code: Option<String>,
        /// HTTP status, for non-JSON replies.
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<wyzely_api::Error> for CoreError {
    fn from(err: wyzely_api::Error) -> Self {
        match err {
            wyzely_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            wyzely_api::Error::TwoFactorRequired => CoreError::AuthenticationFailed {
                message:
                    "Multi-factor authentication is enabled on this account and is not supported"
                    .into(),
            },
            wyzely_api::Error::TokenExpired => CoreError::AuthenticationFailed {
                message: "Access token expired -- log in again".into(),
            },
            wyzely_api::Error::RateLimited { reset_by, .. } => {
                let delay = RateLimitPolicy::default().delay(reset_by, Utc::now());
                CoreError::RateLimited {
                    retry_after_secs: delay.as_secs(),
                    reset_by,
                }
            }
            wyzely_api::Error::Api { code, message } => CoreError::Api {
                message,
                code: Some(code),
                status: None,
            },
            wyzely_api::Error::NonJson { status, body } => CoreError::Api {
                message: format!("non-JSON response: {body}"),
                code: None,
                status: Some(status),
            },
            wyzely_api::Error::UnexpectedPayload { message } => CoreError::Api {
                message,
                code: None,
                status: None,
            },
            wyzely_api::Error::Validation { message } => CoreError::Validation { message },
            wyzely_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            wyzely_api::Error::Transport(ref e) => {
                if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            wyzely_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            wyzely_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
        }
    }
}
