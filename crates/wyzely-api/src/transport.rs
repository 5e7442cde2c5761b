// Shared transport configuration for building reqwest::Client instances.
//
// The API client and the camera image fetcher both need a client with the
// same timeout and TLS policy; this keeps the builder logic in one place.

use std::time::Duration;

use crate::error::Error;

/// Version string the mobile app reports; the cloud gates some fields on it.
pub const APP_VERSION: &str = "3.5.5.8";

/// iOS version paired with [`APP_VERSION`] in the scale user agent.
pub const IOS_VERSION: &str = "17.7.2";

/// Default timeout for every cloud request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// User agent the app sends on classic (non-v4) endpoints.
pub fn scale_user_agent() -> String {
    format!("Wyze/{APP_VERSION} (iPhone; iOS {IOS_VERSION}; Scale/3.00)")
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    /// Default user agent. Per-request headers may override it.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("wyzely/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    /// Config with a different request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
