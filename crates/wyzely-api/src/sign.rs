// Request signing and password hashing
//
// Pure functions only: no state, no I/O. Every signed request calls
// `sign_msg` at send time so timestamp-bearing payloads are captured
// exactly as transmitted.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use serde_json::Value;

use crate::error::Error;

type HmacMd5 = Hmac<Md5>;

/// App id used for the v4 cloud endpoints.
pub const DEFAULT_APP_ID: &str = "9319141212m2ik";

/// Registered signing secrets, keyed by app id.
const APP_SECRETS: &[(&str, &str)] = &[(DEFAULT_APP_ID, "wyze_app_secret_key_132")];

/// Prefixes marking a password that is already triple-MD5 hashed.
const PREHASHED_PREFIXES: &[&str] = &["hashed:", "md5:"];

/// Secret registered for `app_id`, or the id itself when none is known.
///
/// Unknown ids still sign deterministically; the server decides validity.
fn secret_for(app_id: &str) -> &str {
    APP_SECRETS
        .iter()
        .find(|(id, _)| *id == app_id)
        .map_or(app_id, |(_, secret)| secret)
}

fn md5_hex(input: &[u8]) -> String {
    hex::encode(Md5::digest(input))
}

/// Hash a password the way the login service expects: MD5 applied three
/// times, hex-encoded at each step.
///
/// Input prefixed with `hashed:` or `md5:` (case-insensitive) is treated as
/// already hashed and returned without the prefix.
pub fn hash_password(password: &str) -> String {
    let trimmed = password.trim();
    for prefix in PREHASHED_PREFIXES {
        if trimmed.len() >= prefix.len()
            && trimmed.is_char_boundary(prefix.len())
            && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return trimmed[prefix.len()..].to_owned();
        }
    }

    let mut encoded = trimmed.to_owned();
    for _ in 0..3 {
        encoded = md5_hex(encoded.as_bytes());
    }
    encoded
}

/// Serialize JSON with object keys sorted at every depth and no whitespace.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sorted(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in ordered {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Compute the `signature2` digest over an already-canonical message:
/// `HMAC_MD5(key = hex(MD5(token + secret)), message)`.
pub fn sign_msg(app_id: &str, message: &str, token: &str) -> Result<String, Error> {
    let key = md5_hex(format!("{token}{}", secret_for(app_id)).as_bytes());
    let mut mac = HmacMd5::new_from_slice(key.as_bytes()).map_err(|e| Error::Validation {
        message: format!("signing key rejected: {e}"),
    })?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Canonicalize `payload` and sign it.
pub fn sign_payload(app_id: &str, payload: &Value, token: &str) -> Result<String, Error> {
    sign_msg(app_id, &canonical_json(payload), token)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn md5_matches_known_vector() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn hmac_md5_matches_rfc2104_vector() {
        // RFC 2104 test case 2: key "Jefe".
        let mut mac = HmacMd5::new_from_slice(b"Jefe").unwrap();
        mac.update(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "750c783e6ab0b503eaa86e310a5db738"
        );
    }

    #[test]
    fn password_is_hashed_three_times() {
        let once = md5_hex(b"hunter2");
        let twice = md5_hex(once.as_bytes());
        let thrice = md5_hex(twice.as_bytes());
        assert_eq!(hash_password("hunter2"), thrice);
        assert_eq!(hash_password("  hunter2 "), thrice);
    }

    #[test]
    fn prehashed_password_passes_through() {
        assert_eq!(hash_password("md5:abc123"), "abc123");
        assert_eq!(hash_password("MD5:abc123"), "abc123");
        assert_eq!(hash_password("hashed:ffee"), "ffee");
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let v = json!({"b": 1, "a": {"z": [1, {"y": 2, "x": 3}], "c": "s"}});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":{"c":"s","z":[1,{"x":3,"y":2}]},"b":1}"#
        );
    }

    #[test]
    fn signature_is_deterministic() {
        let payload = json!({"count": 20, "nonce": "1"});
        let a = sign_payload(DEFAULT_APP_ID, &payload, "tok").unwrap();
        let b = sign_payload(DEFAULT_APP_ID, &payload, "tok").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn signature_changes_with_each_input() {
        let payload = json!({"count": 20, "nonce": "1"});
        let base = sign_payload(DEFAULT_APP_ID, &payload, "tok").unwrap();

        assert_ne!(base, sign_payload("other-app", &payload, "tok").unwrap());
        assert_ne!(base, sign_payload(DEFAULT_APP_ID, &payload, "tok2").unwrap());
        assert_ne!(
            base,
            sign_payload(DEFAULT_APP_ID, &json!({"count": 19, "nonce": "1"}), "tok").unwrap()
        );
    }

    #[test]
    fn key_order_does_not_affect_signature() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(sign_payload("x", &a, "").unwrap(), sign_payload("x", &b, "").unwrap());
    }

    #[test]
    fn unknown_app_id_uses_itself_as_secret() {
        let msg = r#"{"a":1}"#;
        let expected = {
            let key = md5_hex(b"tokmystery");
            let mut mac = HmacMd5::new_from_slice(key.as_bytes()).unwrap();
            mac.update(msg.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        };
        assert_eq!(sign_msg("mystery", msg, "tok").unwrap(), expected);
    }
}
