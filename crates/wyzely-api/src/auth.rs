// Account material, credential store, and endpoint hosts
//
// The credential store is the only place tokens live. Readers take a
// cheap `Arc` snapshot; login and refresh swap in a whole new value so a
// concurrent reader never sees a half-updated token pair.

use std::sync::Arc;

use arc_swap::ArcSwap;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

/// Production hosts for the three API surfaces.
pub const AUTH_API: &str = "https://auth-prod.api.wyze.com";
pub const APP_API: &str = "https://api.wyzecam.com/app";
pub const CLOUD_API: &str = "https://app-core.cloud.wyze.com/app";

/// Base URLs for each API surface. Overridable for tests and proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Login host (`/api/user/login`).
    pub auth: String,
    /// Classic app host (device list, device info, writes, token refresh).
    pub app: String,
    /// Cloud v4 host (signed event queries).
    pub cloud: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth: AUTH_API.into(),
            app: APP_API.into(),
            cloud: CLOUD_API.into(),
        }
    }
}

impl Endpoints {
    /// Point every surface at one base URL (mock servers, local proxies).
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_owned();
        Self {
            auth: base.clone(),
            app: base.clone(),
            cloud: base,
        }
    }
}

/// Account-level login material supplied by the user.
#[derive(Debug, Clone)]
pub struct Account {
    pub email: String,
    /// Plain password, or an already triple-hashed one prefixed `md5:`.
    pub password: SecretString,
    pub key_id: String,
    pub api_key: SecretString,
}

impl Account {
    pub fn new(
        email: impl Into<String>,
        password: SecretString,
        key_id: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self {
            email: email.into().trim().to_owned(),
            password,
            key_id: key_id.into().trim().to_owned(),
            api_key,
        }
    }

    /// All four fields present, as login requires.
    pub fn is_complete(&self) -> bool {
        !self.email.is_empty()
            && !self.password.expose_secret().is_empty()
            && !self.key_id.is_empty()
            && !self.api_key.expose_secret().trim().is_empty()
    }
}

/// Session tokens and identifiers for one account.
///
/// `Debug` output redacts both tokens.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub user_id: Option<String>,
    /// Per-install device identifier. Generated once and kept stable.
    pub phone_id: String,
    pub mfa_options: Option<Value>,
    pub mfa_details: Option<Value>,
    pub sms_session_id: Option<String>,
    pub email_session_id: Option<String>,
}

impl Default for Credential {
    fn default() -> Self {
        Self::with_phone_id(uuid::Uuid::new_v4().to_string())
    }
}

impl Credential {
    /// Empty credential bound to an existing install identifier.
    pub fn with_phone_id(phone_id: impl Into<String>) -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            user_id: None,
            phone_id: phone_id.into(),
            mfa_options: None,
            mfa_details: None,
            sms_session_id: None,
            email_session_id: None,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .filter(|t| !t.is_empty())
    }

    /// Whether the login response carried a multi-factor challenge.
    pub fn has_mfa_challenge(&self) -> bool {
        let non_empty = |v: &Option<Value>| match v {
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        };
        non_empty(&self.mfa_options)
            || non_empty(&self.mfa_details)
            || self.sms_session_id.is_some()
            || self.email_session_id.is_some()
    }
}

/// Holds the current [`Credential`]. Read and replace only.
#[derive(Debug)]
pub struct CredentialStore {
    inner: ArcSwap<Credential>,
}

impl CredentialStore {
    pub fn new(credential: Credential) -> Self {
        Self {
            inner: ArcSwap::from_pointee(credential),
        }
    }

    /// Snapshot of the current credential.
    pub fn current(&self) -> Arc<Credential> {
        self.inner.load_full()
    }

    pub fn replace(&self, credential: Credential) {
        self.inner.store(Arc::new(credential));
    }

    /// Current access token, exposed. For comparisons and header building.
    pub(crate) fn access_token(&self) -> Option<String> {
        self.inner.load().access_token().map(str::to_owned)
    }
}
