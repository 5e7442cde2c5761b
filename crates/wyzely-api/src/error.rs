use chrono::{DateTime, Utc};
use thiserror::Error;

/// Top-level error type for the `wyzely-api` crate.
///
/// Covers every failure mode of the cloud API surfaces: authentication,
/// token expiry, rate limiting, envelope errors, and transport.
/// `wyzely-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login or refresh failed (missing credentials, no token returned, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The account answered login with a multi-factor challenge.
    #[error("Multi-factor authentication is enabled on this account and is not supported")]
    TwoFactorRequired,

    /// The access token was rejected as expired (envelope code 2001).
    #[error("Access token expired or invalid (code=2001)")]
    TokenExpired,

    // ── Rate limiting ───────────────────────────────────────────────
    /// HTTP 429 from the cloud. `reset_by` is `None` when the header is
    /// missing or unparseable.
    #[error(
        "Rate limited (remaining={remaining}, reset_by={}, retry_after={})",
        display_reset_by(.reset_by),
        .retry_after.as_deref().unwrap_or("-")
    )]
    RateLimited {
        remaining: u32,
        reset_by: Option<DateTime<Utc>>,
        retry_after: Option<String>,
        body: String,
    },

    // ── Envelope ────────────────────────────────────────────────────
    /// Non-success `code` in the response envelope.
    #[error("API error code={code} msg={message}")]
    Api { code: String, message: String },

    /// The response body was not JSON.
    #[error("Non-JSON response (HTTP {status}): {body}")]
    NonJson { status: u16, body: String },

    /// JSON parsed, but not into the shape we expected.
    #[error("Unexpected payload: {message}")]
    UnexpectedPayload { message: String },

    // ── Caller errors ───────────────────────────────────────────────
    /// Invalid call parameters, raised before any network call.
    #[error("Invalid request: {message}")]
    Validation { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// The request (or reading its body) outlived the client's timeout.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// HTTP transport error (connection refused, DNS failure, bad status)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Returns `true` for failures that a retry with the same credentials
    /// cannot fix.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::TwoFactorRequired)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Extract the envelope error code, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            Self::TokenExpired => Some(crate::client::TOKEN_EXPIRED_CODE),
            _ => None,
        }
    }
}

fn display_reset_by(reset_by: &Option<DateTime<Utc>>) -> String {
    reset_by.map_or_else(|| "unknown".to_owned(), |t| t.to_rfc3339())
}
