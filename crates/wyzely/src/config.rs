//! CLI configuration: thin wrapper around `wyzely_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` overrides (--email,
//! --api-key, --endpoint, ...) and decides whether tokens go through the
//! keyring.

use std::sync::Arc;

use secrecy::SecretString;

use wyzely_core::{CoordinatorConfig, CredentialSink, StoredCredential};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use wyzely_config::{
    API_KEY, Config, PASSWORD, Profile, config_path, load_config_or_default, save_config,
    store_secret,
};

/// Everything needed to start a coordinator for one account.
pub struct Resolved {
    pub profile_name: String,
    pub config: CoordinatorConfig,
    pub sink: Option<Arc<dyn CredentialSink>>,
}

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Merge flag overrides into the profile. Flags win.
fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref email) = global.email {
        profile.email.clone_from(email);
    }
    if let Some(ref key_id) = global.key_id {
        profile.key_id.clone_from(key_id);
    }
    if let Some(ref endpoint) = global.endpoint {
        profile.endpoint = Some(endpoint.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    // Plaintext fallbacks, so resolution succeeds when only flags are set.
    if global.api_key.is_some() {
        profile.api_key.clone_from(&global.api_key);
    }
    if global.password.is_some() {
        profile.password.clone_from(&global.password);
    }
}

/// Build the coordinator configuration from config file, profile, and flags.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.email.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            names.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if names.is_empty() {
                    "(none)".into()
                } else {
                    names.join(", ")
                },
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };
    apply_overrides(&mut profile, global);

    let mut config =
        wyzely_config::profile_to_coordinator_config(&profile, &profile_name, &cfg.defaults)?;

    // Flags beat the keyring, which the shared resolution consults first.
    if let Some(ref key) = global.api_key {
        config.account.api_key = SecretString::from(key.clone());
    }
    if let Some(ref password) = global.password {
        config.account.password = SecretString::from(password.clone());
    }

    let sink: Option<Arc<dyn CredentialSink>> = if global.no_keyring {
        config.credential = StoredCredential::default();
        None
    } else {
        Some(Arc::new(wyzely_config::KeyringCredentialSink::new(
            profile_name.clone(),
        )))
    };

    Ok(Resolved {
        profile_name,
        config,
        sink,
    })
}
