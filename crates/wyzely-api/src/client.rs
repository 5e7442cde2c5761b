// Wyze cloud HTTP client
//
// Wraps `reqwest::Client` with header construction per endpoint class,
// envelope unwrapping, 429 detection, and a single-flight token refresh.
// Endpoint operations (devices, events) are inherent methods in separate
// files; this module keeps to transport mechanics and the auth flows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{Account, Credential, CredentialStore, Endpoints};
use crate::error::Error;
use crate::models::{CameraDevice, value_to_plain_string};
use crate::sign::{self, DEFAULT_APP_ID};
use crate::transport::{APP_VERSION, DEFAULT_TIMEOUT, TransportConfig, scale_user_agent};

/// Envelope code meaning the access token expired.
pub const TOKEN_EXPIRED_CODE: &str = "2001";

/// Envelope codes that mean success.
const SUCCESS_CODES: [&str; 2] = ["0", "1"];

/// Error bodies are cut to this many characters.
const BODY_SNIPPET_LEN: usize = 200;

const APP_NAME: &str = "com.hualai.WyzeCam";

/// `sc`/`sv` pair selector for classic envelope calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Default,
    GetDeviceInfo,
    SetDeviceInfo,
}

impl EnvelopeKind {
    const fn sc_sv(self) -> (&'static str, &'static str) {
        match self {
            Self::Default => (
                "9f275790cab94a72bd206c8876429f3c",
                "e1fe392906d54888a9b99b88de4162d7",
            ),
            Self::GetDeviceInfo => (
                "01dd431d098546f9baf5233724fa2ee2",
                "0bc2c3bedf6c4be688754c9ad42bbf2e",
            ),
            Self::SetDeviceInfo => (
                "01dd431d098546f9baf5233724fa2ee2",
                "e8e1db44128f4e31a2047a8f5f80b2bd",
            ),
        }
    }
}

/// An authenticated operation, described so it can be rebuilt and
/// replayed against whatever credential is current at send time.
#[derive(Debug)]
pub(crate) enum SignedCall<'a> {
    /// Classic app host: envelope fields merged with `params`.
    App {
        kind: EnvelopeKind,
        url: Url,
        params: &'a Map<String, Value>,
    },
    /// Cloud v4 host: canonical `params` body with a `signature2` header.
    Cloud {
        url: Url,
        params: &'a Map<String, Value>,
    },
}

/// Async client for the Wyze cloud.
///
/// Holds one account's credential. All operations are `&self`; the client
/// is meant to be shared behind an `Arc`.
pub struct WyzeClient {
    http: reqwest::Client,
    timeout: Duration,
    endpoints: Endpoints,
    account: Account,
    credentials: CredentialStore,
    refresh_lock: Mutex<()>,
    pub(crate) devices_by_mac: ArcSwap<HashMap<String, CameraDevice>>,
    pub(crate) event_image_cache: DashMap<String, (Instant, Option<String>)>,
}

impl WyzeClient {
    /// Build a client with its own HTTP transport.
    pub fn new(
        account: Account,
        credential: Credential,
        endpoints: Endpoints,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, account, credential, endpoints)
            .with_timeout(transport.timeout))
    }

    /// Build a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        account: Account,
        credential: Credential,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            http,
            timeout: DEFAULT_TIMEOUT,
            endpoints,
            account,
            credentials: CredentialStore::new(credential),
            refresh_lock: Mutex::new(()),
            devices_by_mac: ArcSwap::from_pointee(HashMap::new()),
            event_image_cache: DashMap::new(),
        }
    }

    /// Per-request timeout for cloud calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Snapshot of the current credential.
    pub fn credential(&self) -> Arc<Credential> {
        self.credentials.current()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The underlying HTTP client (shared with the image fetcher).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials.access_token().is_some()
    }

    // ── Auth flows ───────────────────────────────────────────────────

    /// Log in with the account's email and password.
    ///
    /// `POST {auth}/api/user/login`
    pub async fn login(&self) -> Result<Credential, Error> {
        if !self.account.is_complete() {
            return Err(Error::Authentication {
                message: "missing email, password, key id or API key".into(),
            });
        }

        let url = join(&self.endpoints.auth, "api/user/login")?;
        let body = json!({
            "email": self.account.email,
            "password": sign::hash_password(self.account.password.expose_secret()),
        });
        let data = self
            .execute(Method::POST, url, self.login_headers()?, Some(body.to_string()))
            .await?;

        let previous = self.credentials.current();
        let credential = Credential {
            access_token: string_field(&data, "access_token").map(SecretString::from),
            refresh_token: string_field(&data, "refresh_token").map(SecretString::from),
            user_id: string_field(&data, "user_id"),
            phone_id: previous.phone_id.clone(),
            mfa_options: data.get("mfa_options").filter(|v| !v.is_null()).cloned(),
            mfa_details: data.get("mfa_details").filter(|v| !v.is_null()).cloned(),
            sms_session_id: string_field(&data, "sms_session_id"),
            email_session_id: string_field(&data, "email_session_id"),
        };
        self.credentials.replace(credential.clone());

        if credential.access_token().is_none() {
            if credential.has_mfa_challenge() {
                return Err(Error::TwoFactorRequired);
            }
            return Err(Error::Authentication {
                message: "login did not return an access token".into(),
            });
        }

        info!(email = %self.account.email, "logged in");
        Ok(credential)
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// `POST {app}/user/refresh_token`
    pub async fn refresh(&self) -> Result<Credential, Error> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh unless another caller already replaced `stale` while we
    /// waited for the lock.
    async fn refresh_if_stale(&self, stale: Option<&str>) -> Result<(), Error> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.credentials.access_token();
        if current.is_some() && current.as_deref() != stale {
            debug!("token already refreshed by a concurrent caller");
            return Ok(());
        }
        self.refresh_locked().await.map(drop)
    }

    async fn refresh_locked(&self) -> Result<Credential, Error> {
        let current = self.credentials.current();
        let refresh_token = current
            .refresh_token()
            .ok_or_else(|| Error::Authentication {
                message: "no refresh token stored; log in again".into(),
            })?
            .to_owned();

        let url = join(&self.endpoints.app, "user/refresh_token")?;
        let mut payload = envelope(
            EnvelopeKind::Default,
            current.access_token().unwrap_or_default(),
            &current.phone_id,
        );
        payload.insert("refresh_token".into(), Value::String(refresh_token));

        let data = match self
            .execute(
                Method::POST,
                url,
                app_headers(),
                Some(Value::Object(payload).to_string()),
            )
            .await
        {
            Err(Error::TokenExpired) => {
                return Err(Error::Authentication {
                    message: "refresh token rejected".into(),
                });
            }
            other => other?,
        };

        let mut next = (*current).clone();
        if let Some(token) = string_field(&data, "access_token") {
            next.access_token = Some(SecretString::from(token));
        }
        if let Some(token) = string_field(&data, "refresh_token") {
            next.refresh_token = Some(SecretString::from(token));
        }
        self.credentials.replace(next.clone());
        debug!("access token refreshed");
        Ok(next)
    }

    // ── Request execution ────────────────────────────────────────────

    /// Send one request and unwrap the response envelope.
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: Url,
        mut headers: HeaderMap,
        body: Option<String>,
    ) -> Result<Value, Error> {
        debug!(%method, %url, "sending request");

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            request = request.body(body);
        }

        let result = match request.headers(headers).timeout(self.timeout).send().await {
            Ok(resp) => parse_response(resp).await,
            Err(e) => Err(Error::Transport(e)),
        };
        result.map_err(|e| match e {
            Error::Transport(e) if e.is_timeout() => Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            },
            other => other,
        })
    }

    /// Send an authenticated call, refreshing and replaying it once if the
    /// token has expired. A second expiry becomes an authentication error.
    pub(crate) async fn execute_authenticated(
        &self,
        call: &SignedCall<'_>,
    ) -> Result<Value, Error> {
        let token_used = self.credentials.access_token();
        match self.send_signed(call).await {
            Err(Error::TokenExpired) => {}
            other => return other,
        }

        debug!("access token expired; refreshing once and replaying");
        self.refresh_if_stale(token_used.as_deref()).await?;

        match self.send_signed(call).await {
            Err(Error::TokenExpired) => {
                warn!("access token rejected again after refresh");
                Err(Error::Authentication {
                    message: "access token rejected again after refresh".into(),
                })
            }
            other => other,
        }
    }

    /// Build the call from the current credential, sign it, and send it.
    async fn send_signed(&self, call: &SignedCall<'_>) -> Result<Value, Error> {
        let credential = self.credentials.current();
        let token = credential.access_token().ok_or_else(|| Error::Authentication {
            message: "not logged in (no access token)".into(),
        })?;

        match call {
            SignedCall::App { kind, url, params } => {
                let mut payload = envelope(*kind, token, &credential.phone_id);
                for (k, v) in params.iter() {
                    payload.insert(k.clone(), v.clone());
                }
                let body = Value::Object(payload).to_string();
                self.execute(Method::POST, url.clone(), app_headers(), Some(body))
                    .await
            }
            SignedCall::Cloud { url, params } => {
                let body = sign::canonical_json(&Value::Object((*params).clone()));
                let headers = cloud_headers(&credential.phone_id, token, &body)?;
                self.execute(Method::POST, url.clone(), headers, Some(body))
                    .await
            }
        }
    }

    fn login_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("apikey"),
            header_value(self.account.api_key.expose_secret().trim())?,
        );
        headers.insert(HeaderName::from_static("keyid"), header_value(&self.account.key_id)?);
        headers.insert(
            USER_AGENT,
            header_value(&format!("wyzely/{APP_VERSION}"))?,
        );
        Ok(headers)
    }

    pub(crate) fn app_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.endpoints.app, path)
    }

    pub(crate) fn cloud_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.endpoints.cloud, path)
    }
}

// ── Headers and payloads ─────────────────────────────────────────────

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| Error::Validation {
        message: "credential contains characters not allowed in an HTTP header".into(),
    })
}

/// Headers for classic app-host calls.
fn app_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(&scale_user_agent()) {
        headers.insert(USER_AGENT, ua);
    }
    headers.insert(
        HeaderName::from_static("appversion"),
        HeaderValue::from_static(APP_VERSION),
    );
    headers.insert(HeaderName::from_static("env"), HeaderValue::from_static("prod"));
    headers
}

/// Headers for v4 cloud calls, including the body signature.
fn cloud_headers(phone_id: &str, token: &str, body: &str) -> Result<HeaderMap, Error> {
    let app_info = format!("wyze_ios_{APP_VERSION}");
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(HeaderName::from_static("phoneid"), header_value(phone_id)?);
    headers.insert(USER_AGENT, header_value(&app_info)?);
    headers.insert(HeaderName::from_static("appinfo"), header_value(&app_info)?);
    headers.insert(
        HeaderName::from_static("appversion"),
        HeaderValue::from_static(APP_VERSION),
    );
    headers.insert(HeaderName::from_static("access_token"), header_value(token)?);
    headers.insert(
        HeaderName::from_static("appid"),
        HeaderValue::from_static(DEFAULT_APP_ID),
    );
    headers.insert(HeaderName::from_static("env"), HeaderValue::from_static("prod"));
    headers.insert(
        HeaderName::from_static("signature2"),
        header_value(&sign::sign_msg(DEFAULT_APP_ID, body, token)?)?,
    );
    Ok(headers)
}

/// Common fields of every classic envelope request. `ts` is taken now.
fn envelope(kind: EnvelopeKind, access_token: &str, phone_id: &str) -> Map<String, Value> {
    let (sc, sv) = kind.sc_sv();
    let mut payload = Map::new();
    payload.insert("sc".into(), sc.into());
    payload.insert("sv".into(), sv.into());
    payload.insert("app_ver".into(), format!("{APP_NAME}___{APP_VERSION}").into());
    payload.insert("app_version".into(), APP_VERSION.into());
    payload.insert("app_name".into(), APP_NAME.into());
    payload.insert("phone_system_type".into(), 1.into());
    payload.insert("ts".into(), Utc::now().timestamp_millis().into());
    payload.insert("access_token".into(), access_token.into());
    payload.insert("phone_id".into(), phone_id.into());
    payload
}

fn join(base: &str, path: &str) -> Result<Url, Error> {
    let full = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&full)?)
}

/// Non-empty string (or number rendered as one) at `key`.
fn string_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::Null => None,
        v => Some(value_to_plain_string(v)).filter(|s| !s.is_empty()),
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn parse_response(resp: reqwest::Response) -> Result<Value, Error> {
    let status = resp.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let headers = resp.headers().clone();
        let body = resp.text().await.unwrap_or_default();
        let err = rate_limit_error(&headers, &body);
        warn!(%err, "cloud rate limit hit");
        return Err(err);
    }

    let body = resp.text().await.map_err(Error::Transport)?;
    parse_envelope(status, &body)
}

/// Build the 429 error from the rate-limit headers.
pub(crate) fn rate_limit_error(headers: &HeaderMap, body: &str) -> Error {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    Error::RateLimited {
        remaining: header("x-ratelimit-remaining")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        reset_by: header("x-ratelimit-reset-by").and_then(parse_reset_by),
        retry_after: header("retry-after").map(str::to_owned),
        body: truncate(body, BODY_SNIPPET_LEN),
    }
}

/// Parse `X-RateLimit-Reset-By`, e.g. `Mon Jan 06 12:30:00 GMT 2025`.
///
/// The zone token is dropped and the time read as UTC.
pub(crate) fn parse_reset_by(raw: &str) -> Option<DateTime<Utc>> {
    let mut tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() != 6 {
        return None;
    }
    tokens.remove(4);
    NaiveDateTime::parse_from_str(&tokens.join(" "), "%a %b %d %H:%M:%S %Y")
        .ok()
        .map(|t| t.and_utc())
}

/// Classify an envelope: token expiry, error code, or success payload.
pub(crate) fn parse_envelope(status: StatusCode, body: &str) -> Result<Value, Error> {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return Err(Error::NonJson {
            status: status.as_u16(),
            body: truncate(body, BODY_SNIPPET_LEN),
        });
    };

    let code = json
        .get("code")
        .or_else(|| json.get("errorCode"))
        .map_or_else(|| "0".to_owned(), value_to_plain_string);

    if code == TOKEN_EXPIRED_CODE {
        return Err(Error::TokenExpired);
    }

    if !SUCCESS_CODES.contains(&code.as_str()) {
        let message = json
            .get("msg")
            .or_else(|| json.get("description"))
            .map_or_else(|| code.clone(), value_to_plain_string);
        return Err(Error::Api { code, message });
    }

    match json.get("data") {
        Some(data @ Value::Object(_)) => Ok(data.clone()),
        _ => Ok(json),
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn reset_by_parses_and_ignores_zone() {
        let t = parse_reset_by("Mon Jan 06 12:30:05 GMT 2025").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2025, 1, 6));
        assert_eq!((t.hour(), t.minute(), t.second()), (12, 30, 5));
        assert!(parse_reset_by("not a date").is_none());
        assert!(parse_reset_by("").is_none());
    }

    #[test]
    fn rate_limit_headers_default_sensibly() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("abc"));
        headers.insert("retry-after", HeaderValue::from_static("30"));
        let long = "x".repeat(500);
        match rate_limit_error(&headers, &long) {
            Error::RateLimited {
                remaining,
                reset_by,
                retry_after,
                body,
            } => {
                assert_eq!(remaining, 0);
                assert!(reset_by.is_none());
                assert_eq!(retry_after.as_deref(), Some("30"));
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn envelope_success_unwraps_data_object() {
        let v = parse_envelope(StatusCode::OK, r#"{"code":"1","data":{"a":1}}"#).unwrap();
        assert_eq!(v, json!({"a": 1}));

        let whole = parse_envelope(StatusCode::OK, r#"{"code":0,"data":[1,2]}"#).unwrap();
        assert_eq!(whole["data"], json!([1, 2]));

        let no_code = parse_envelope(StatusCode::OK, r#"{"access_token":"t"}"#).unwrap();
        assert_eq!(no_code["access_token"], "t");
    }

    #[test]
    fn envelope_error_codes() {
        assert!(matches!(
            parse_envelope(StatusCode::OK, r#"{"code":"2001","msg":"expired"}"#),
            Err(Error::TokenExpired)
        ));
        assert!(matches!(
            parse_envelope(StatusCode::OK, r#"{"code":2001}"#),
            Err(Error::TokenExpired)
        ));

        match parse_envelope(StatusCode::OK, r#"{"errorCode":1000,"description":"bad"}"#) {
            Err(Error::Api { code, message }) => {
                assert_eq!(code, "1000");
                assert_eq!(message, "bad");
            }
            other => panic!("unexpected {other:?}"),
        }

        match parse_envelope(StatusCode::OK, r#"{"code":"3044"}"#) {
            Err(Error::Api { message, .. }) => assert_eq!(message, "3044"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_json_body_carries_status() {
        match parse_envelope(StatusCode::BAD_GATEWAY, "<html>oops</html>") {
            Err(Error::NonJson { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "<html>oops</html>");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn envelope_fields_follow_kind() {
        let p = envelope(EnvelopeKind::SetDeviceInfo, "tok", "phone");
        assert_eq!(p["sc"], "01dd431d098546f9baf5233724fa2ee2");
        assert_eq!(p["sv"], "e8e1db44128f4e31a2047a8f5f80b2bd");
        assert_eq!(p["app_ver"], "com.hualai.WyzeCam___3.5.5.8");
        assert_eq!(p["phone_system_type"], 1);
        assert_eq!(p["access_token"], "tok");
        assert_eq!(p["phone_id"], "phone");
        assert!(p["ts"].as_i64().unwrap() > 0);
    }

    #[test]
    fn cloud_headers_carry_signature_of_body() {
        let headers = cloud_headers("phone", "tok", r#"{"a":1}"#).unwrap();
        assert_eq!(
            headers["signature2"].to_str().unwrap(),
            sign::sign_msg(DEFAULT_APP_ID, r#"{"a":1}"#, "tok").unwrap()
        );
        assert_eq!(headers["appid"], DEFAULT_APP_ID);
        assert_eq!(headers["access_token"], "tok");
    }
}
