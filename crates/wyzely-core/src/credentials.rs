// Credential persistence seam
//
// The coordinator owns the live session; the host owns storage. After a
// successful poll the coordinator diffs the client's credential against
// what the host last stored and hands over only the changed fields.

use secrecy::{ExposeSecret, SecretString};
use wyzely_api::Credential;

use crate::config::StoredCredential;
use crate::error::CoreError;

/// Host-side storage for refreshed tokens.
pub trait CredentialSink: Send + Sync {
    fn persist(&self, update: &CredentialUpdate) -> Result<(), CoreError>;
}

/// Fields that changed since the host last stored them. `None` means
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub user_id: Option<String>,
    pub phone_id: Option<String>,
}

fn secret_differs(stored: Option<&SecretString>, current: Option<&str>) -> Option<SecretString> {
    let current = current?;
    let same = stored.is_some_and(|s| s.expose_secret() == current);
    (!same).then(|| SecretString::from(current.to_owned()))
}

fn text_differs(stored: Option<&str>, current: Option<&str>) -> Option<String> {
    let current = current.filter(|c| !c.is_empty())?;
    (stored != Some(current)).then(|| current.to_owned())
}

impl CredentialUpdate {
    /// Fields of `current` that differ from `stored`. Fields absent from
    /// `current` never clear stored ones.
    pub fn between(stored: &StoredCredential, current: &Credential) -> Self {
        Self {
            access_token: secret_differs(stored.access_token.as_ref(), current.access_token()),
            refresh_token: secret_differs(stored.refresh_token.as_ref(), current.refresh_token()),
            user_id: text_differs(stored.user_id.as_deref(), current.user_id.as_deref()),
            phone_id: text_differs(stored.phone_id.as_deref(), Some(&current.phone_id)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.user_id.is_none()
            && self.phone_id.is_none()
    }

    /// Names of the changed fields, for logs.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.access_token.is_some() {
            fields.push("access_token");
        }
        if self.refresh_token.is_some() {
            fields.push("refresh_token");
        }
        if self.user_id.is_some() {
            fields.push("user_id");
        }
        if self.phone_id.is_some() {
            fields.push("phone_id");
        }
        fields
    }
}

impl StoredCredential {
    /// Record a persisted update as the new stored state.
    pub(crate) fn absorb(&mut self, update: &CredentialUpdate) {
        if let Some(t) = &update.access_token {
            self.access_token = Some(t.clone());
        }
        if let Some(t) = &update.refresh_token {
            self.refresh_token = Some(t.clone());
        }
        if let Some(u) = &update.user_id {
            self.user_id = Some(u.clone());
        }
        if let Some(p) = &update.phone_id {
            self.phone_id = Some(p.clone());
        }
    }
}
