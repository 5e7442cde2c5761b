// ── Runtime coordinator configuration ──
//
// These types describe *how* to sync with the cloud: account material,
// tokens restored from a previous run, and polling cadence. They never
// touch disk. The CLI (or any other host) builds a `CoordinatorConfig`
// and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use wyzely_api::{Account, Credential, Endpoints};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_PROPERTY_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_PROPERTY_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(300);
pub const DEFAULT_RATE_LIMIT_FLOOR: Duration = Duration::from_secs(60);
pub const DEFAULT_EVENT_IMAGE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_POWER_SETTLE: Duration = Duration::from_secs(2);
pub const DEFAULT_PROPERTY_GRACE: Duration = Duration::from_secs(1);

/// Tokens and identifiers restored from host storage.
#[derive(Debug, Clone, Default)]
pub struct StoredCredential {
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub user_id: Option<String>,
    /// Per-install identifier. A fresh one is generated when absent.
    pub phone_id: Option<String>,
}

impl StoredCredential {
    /// Seed credential for the API client.
    pub(crate) fn to_credential(&self) -> Credential {
        let mut cred = match &self.phone_id {
            Some(id) if !id.trim().is_empty() => Credential::with_phone_id(id.trim()),
            _ => Credential::default(),
        };
        cred.access_token.clone_from(&self.access_token);
        cred.refresh_token.clone_from(&self.refresh_token);
        cred.user_id.clone_from(&self.user_id);
        cred
    }
}

/// Configuration for one coordinator (one account).
///
/// Built by the host, passed to `Coordinator`. Core never reads config files.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub account: Account,
    pub credential: StoredCredential,
    /// API base URLs. Defaults to production.
    pub endpoints: Endpoints,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Device-list poll interval. `Duration::ZERO` disables background polling.
    pub poll_interval: Duration,
    /// Sweep extended properties during polls. Off, properties are only
    /// fetched on request.
    pub sweep_properties: bool,
    /// Minimum time between extended-property sweeps.
    pub property_refresh_interval: Duration,
    /// Pause after each successful per-device property fetch.
    pub property_delay: Duration,
    /// Backoff when a 429 carries no usable reset time.
    pub rate_limit_fallback: Duration,
    /// Minimum backoff when a 429 carries a reset time.
    pub rate_limit_floor: Duration,
    /// Lifetime of a resolved latest-event image URL.
    pub event_image_ttl: Duration,
    /// Wait after a power write before checking the result.
    pub power_settle: Duration,
    /// Wait after a property write before reading it back.
    pub property_grace: Duration,
    /// Optional stream URL template (`{mac}`, `{nickname}`, `{name}`, `{model}`, `{ip}`).
    pub stream_url_template: Option<String>,
    /// Image served when no camera image can be fetched.
    pub placeholder_image: Option<PathBuf>,
}

impl CoordinatorConfig {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            credential: StoredCredential::default(),
            endpoints: Endpoints::default(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sweep_properties: true,
            property_refresh_interval: DEFAULT_PROPERTY_REFRESH_INTERVAL,
            property_delay: DEFAULT_PROPERTY_DELAY,
            rate_limit_fallback: DEFAULT_RATE_LIMIT_FALLBACK,
            rate_limit_floor: DEFAULT_RATE_LIMIT_FLOOR,
            event_image_ttl: DEFAULT_EVENT_IMAGE_TTL,
            power_settle: DEFAULT_POWER_SETTLE,
            property_grace: DEFAULT_PROPERTY_GRACE,
            stream_url_template: None,
            placeholder_image: None,
        }
    }

    pub fn with_credential(mut self, credential: StoredCredential) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}
