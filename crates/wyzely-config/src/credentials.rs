// Credential resolution and keyring storage
//
// Account secrets resolve env first, then keyring, then plaintext in the
// profile. Session tokens rotated by the coordinator live only in the
// keyring, one entry per field under `<profile>/<item>`.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use wyzely_core::{CoreError, CredentialSink, CredentialUpdate, StoredCredential};

use crate::{ConfigError, Profile};

/// Keyring service name for every stored secret.
pub const KEYRING_SERVICE: &str = "wyzely";

/// Keyring item for the developer API key.
pub const API_KEY: &str = "api-key";
/// Keyring item for the account password.
pub const PASSWORD: &str = "password";
const ACCESS_TOKEN: &str = "access-token";
const REFRESH_TOKEN: &str = "refresh-token";
const USER_ID: &str = "user-id";
const PHONE_ID: &str = "phone-id";

fn keyring_get(profile_name: &str, item: &str) -> Option<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{item}")).ok()?;
    entry.get_password().ok().filter(|s| !s.trim().is_empty())
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Write one secret to the keyring.
pub fn store_secret(profile_name: &str, item: &str, value: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{item}"))?;
    entry.set_password(value)?;
    Ok(())
}

/// Resolve the developer API key: profile's env var, keyring, plaintext.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(val) = profile.api_key_env.as_deref().and_then(env_nonempty) {
        return Ok(SecretString::from(val));
    }
    if let Some(val) = keyring_get(profile_name, API_KEY) {
        return Ok(SecretString::from(val));
    }
    if let Some(key) = profile.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        return Ok(SecretString::from(key.to_owned()));
    }
    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
        what: "API key",
    })
}

/// Resolve the account password: profile's env var, `WYZELY_PASSWORD`,
/// keyring, plaintext.
pub fn resolve_password(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    let from_env = profile
        .password_env
        .as_deref()
        .and_then(env_nonempty)
        .or_else(|| env_nonempty("WYZELY_PASSWORD"));
    if let Some(pw) = from_env {
        return Ok(SecretString::from(pw));
    }
    if let Some(pw) = keyring_get(profile_name, PASSWORD) {
        return Ok(SecretString::from(pw));
    }
    if let Some(pw) = profile.password.as_deref().filter(|p| !p.is_empty()) {
        return Ok(SecretString::from(pw.to_owned()));
    }
    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
        what: "password",
    })
}

/// Tokens a previous run left in the keyring. Missing entries stay `None`.
pub fn load_stored_credential(profile_name: &str) -> StoredCredential {
    StoredCredential {
        access_token: keyring_get(profile_name, ACCESS_TOKEN).map(SecretString::from),
        refresh_token: keyring_get(profile_name, REFRESH_TOKEN).map(SecretString::from),
        user_id: keyring_get(profile_name, USER_ID),
        phone_id: keyring_get(profile_name, PHONE_ID),
    }
}

/// Persists rotated session tokens for one profile into the keyring.
#[derive(Debug, Clone)]
pub struct KeyringCredentialSink {
    profile: String,
}

impl KeyringCredentialSink {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

impl CredentialSink for KeyringCredentialSink {
    fn persist(&self, update: &CredentialUpdate) -> Result<(), CoreError> {
        let items = [
            (ACCESS_TOKEN, update.access_token.as_ref().map(ExposeSecret::expose_secret)),
            (REFRESH_TOKEN, update.refresh_token.as_ref().map(ExposeSecret::expose_secret)),
            (USER_ID, update.user_id.as_deref()),
            (PHONE_ID, update.phone_id.as_deref()),
        ];
        for (item, value) in items {
            let Some(value) = value else { continue };
            store_secret(&self.profile, item, value).map_err(|e| CoreError::Config {
                message: format!("failed to store {item} for '{}': {e}", self.profile),
            })?;
            debug!(profile = %self.profile, item, "stored credential field");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // Profile names no keyring will hold, so lookups fall through.
    const NAME: &str = "wyzely-test-unstored-profile";

    #[test]
    fn plaintext_is_the_last_resort() {
        let profile = Profile {
            api_key: Some("plain".into()),
            api_key_env: Some("WYZELY_TEST_UNSET_API_KEY_VAR".into()),
            password: Some("pw".into()),
            password_env: Some("WYZELY_TEST_UNSET_PASSWORD_VAR".into()),
            ..Profile::default()
        };
        assert_eq!(resolve_api_key(&profile, NAME).unwrap().expose_secret(), "plain");
        if std::env::var("WYZELY_PASSWORD").is_err() {
            assert_eq!(resolve_password(&profile, NAME).unwrap().expose_secret(), "pw");
        }
    }

    #[test]
    fn missing_secrets_name_what_is_missing() {
        let profile = Profile {
            api_key: Some("   ".into()),
            ..Profile::default()
        };
        let err = resolve_api_key(&profile, NAME).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no API key configured for profile 'wyzely-test-unstored-profile'"
        );
    }

    #[test]
    fn nothing_stored_means_empty_credential() {
        let stored = load_stored_credential(NAME);
        assert!(stored.access_token.is_none());
        assert!(stored.phone_id.is_none());
    }

    #[test]
    fn empty_update_touches_nothing() {
        let sink = KeyringCredentialSink::new(NAME);
        assert_eq!(sink.profile(), NAME);
        sink.persist(&CredentialUpdate::default()).unwrap();
    }
}
