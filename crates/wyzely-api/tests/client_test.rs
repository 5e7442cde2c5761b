#![allow(clippy::unwrap_used)]
// Integration tests for `WyzeClient` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wyzely_api::sign::{hash_password, sign_msg, DEFAULT_APP_ID};
use wyzely_api::{Account, Credential, Endpoints, Error, EventQuery, WyzeClient};

// ── Helpers ─────────────────────────────────────────────────────────

fn account() -> Account {
    Account::new(
        "me@example.com",
        SecretString::from("hunter2".to_owned()),
        "key-id",
        SecretString::from("api-key".to_owned()),
    )
}

fn logged_in(access: &str) -> Credential {
    let mut cred = Credential::with_phone_id("phone-1");
    cred.access_token = Some(SecretString::from(access.to_owned()));
    cred.refresh_token = Some(SecretString::from("refresh-1".to_owned()));
    cred.user_id = Some("user-1".into());
    cred
}

async fn setup(credential: Credential) -> (MockServer, WyzeClient) {
    let server = MockServer::start().await;
    let client = WyzeClient::with_client(
        reqwest::Client::new(),
        account(),
        credential,
        Endpoints::single(&server.uri()),
    );
    (server, client)
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"code": "1", "msg": "", "data": data}))
}

fn expired() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"code": "2001", "msg": "AccessTokenError"}))
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let (server, client) = setup(Credential::with_phone_id("phone-1")).await;

    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .and(header("keyid", "key-id"))
        .and(header("apikey", "api-key"))
        .and(body_partial_json(json!({
            "email": "me@example.com",
            "password": hash_password("hunter2"),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "user_id": "user-1",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cred = client.login().await.unwrap();
    assert_eq!(cred.access_token(), Some("access-1"));
    assert_eq!(cred.refresh_token(), Some("refresh-1"));
    assert_eq!(cred.user_id.as_deref(), Some("user-1"));
    assert_eq!(cred.phone_id, "phone-1");
    assert!(client.is_logged_in());
}

#[tokio::test]
async fn test_login_mfa_challenge_is_auth_error() {
    let (server, client) = setup(Credential::with_phone_id("phone-1")).await;

    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "",
            "mfa_options": ["PrimaryPhone"],
            "sms_session_id": "sms-1",
        })))
        .mount(&server)
        .await;

    let err = client.login().await.unwrap_err();
    assert!(matches!(err, Error::TwoFactorRequired), "got: {err:?}");
    assert!(err.is_auth_failure());
    assert_eq!(
        client.credential().sms_session_id.as_deref(),
        Some("sms-1")
    );
}

#[tokio::test]
async fn test_login_missing_fields_makes_no_request() {
    let server = MockServer::start().await;
    let incomplete = Account::new(
        "me@example.com",
        SecretString::from(String::new()),
        "key-id",
        SecretString::from("api-key".to_owned()),
    );
    let client = WyzeClient::with_client(
        reqwest::Client::new(),
        incomplete,
        Credential::default(),
        Endpoints::single(&server.uri()),
    );

    let err = client.login().await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "got: {err:?}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_without_refresh_token_fails() {
    let mut cred = Credential::with_phone_id("phone-1");
    cred.access_token = Some(SecretString::from("a".to_owned()));
    let (_server, client) = setup(cred).await;

    let err = client.refresh().await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
}

#[tokio::test]
async fn test_refresh_preserves_omitted_fields() {
    let (server, client) = setup(logged_in("old")).await;

    Mock::given(method("POST"))
        .and(path("/user/refresh_token"))
        .and(body_partial_json(json!({"refresh_token": "refresh-1"})))
        .respond_with(ok(json!({"access_token": "new"})))
        .expect(1)
        .mount(&server)
        .await;

    let cred = client.refresh().await.unwrap();
    assert_eq!(cred.access_token(), Some("new"));
    assert_eq!(cred.refresh_token(), Some("refresh-1"));
    assert_eq!(cred.user_id.as_deref(), Some("user-1"));
}

// ── Token expiry ────────────────────────────────────────────────────

#[tokio::test]
async fn test_expired_token_refreshes_once_and_replays() {
    let (server, client) = setup(logged_in("old")).await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .and(body_partial_json(json!({"access_token": "old"})))
        .respond_with(expired())
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .and(body_partial_json(json!({"access_token": "new", "phone_id": "phone-1"})))
        .respond_with(ok(json!({"device_list": []})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/user/refresh_token"))
        .respond_with(ok(json!({"access_token": "new", "refresh_token": "refresh-2"})))
        .expect(1)
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    assert!(devices.is_empty());
    assert_eq!(client.credential().access_token(), Some("new"));
    assert_eq!(client.credential().refresh_token(), Some("refresh-2"));
}

#[tokio::test]
async fn test_concurrent_expiry_shares_one_refresh() {
    let (server, client) = setup(logged_in("old")).await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .and(body_partial_json(json!({"access_token": "old"})))
        .respond_with(expired())
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .and(body_partial_json(json!({"access_token": "new"})))
        .respond_with(ok(json!({"device_list": []})))
        .expect(3)
        .mount(&server)
        .await;

    // Slow enough that the other callers queue on the refresh lock.
    Mock::given(method("POST"))
        .and(path("/user/refresh_token"))
        .respond_with(
            ok(json!({"access_token": "new", "refresh_token": "refresh-2"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (a, b, c) = tokio::join!(
        client.list_devices(),
        client.list_devices(),
        client.list_devices()
    );
    assert!(a.unwrap().is_empty());
    assert!(b.unwrap().is_empty());
    assert!(c.unwrap().is_empty());
    assert_eq!(client.credential().access_token(), Some("new"));
}

#[tokio::test]
async fn test_repeated_expiry_propagates_after_one_refresh() {
    let (server, client) = setup(logged_in("old")).await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .respond_with(expired())
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/user/refresh_token"))
        .respond_with(ok(json!({"access_token": "new"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_not_logged_in_is_auth_error() {
    let (server, client) = setup(Credential::with_phone_id("p")).await;
    let err = client.list_devices().await.unwrap_err();
    assert!(err.is_auth_failure());
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ── Envelope and rate limiting ──────────────────────────────────────

#[tokio::test]
async fn test_rate_limit_parses_headers() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-RateLimit-Remaining", "3")
                .insert_header("X-RateLimit-Reset-By", "Mon Jan 06 12:30:00 GMT 2025")
                .insert_header("Retry-After", "120")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let err = client.list_devices().await.unwrap_err();
    assert!(err.is_rate_limited());
    match err {
        Error::RateLimited {
            remaining,
            reset_by,
            retry_after,
            body,
        } => {
            assert_eq!(remaining, 3);
            assert_eq!(reset_by.unwrap().to_rfc3339(), "2025-01-06T12:30:00+00:00");
            assert_eq!(retry_after.as_deref(), Some("120"));
            assert_eq!(body, "slow down");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_response_reports_configured_timeout() {
    let server = MockServer::start().await;
    let client = WyzeClient::with_client(
        reqwest::Client::new(),
        account(),
        logged_in("tok"),
        Endpoints::single(&server.uri()),
    )
    .with_timeout(Duration::from_secs(1));

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .respond_with(ok(json!({"device_list": []})).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;

    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_secs: 1 }), "got: {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_api_error_code_surfaces() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v2/device/get_device_Info"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": "1003", "msg": "DeviceIsOffline"})),
        )
        .mount(&server)
        .await;

    let err = client.get_extended_info("AA", "WYZE_CAKP2JFUS").await.unwrap_err();
    match err {
        Error::Api { code, message } => {
            assert_eq!(code, "1003");
            assert_eq!(message, "DeviceIsOffline");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_response() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client.list_devices().await.unwrap_err();
    assert!(
        matches!(err, Error::NonJson { status: 503, .. }),
        "got: {err:?}"
    );
}

// ── Devices ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_filters_cameras() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .and(body_partial_json(json!({"sc": "9f275790cab94a72bd206c8876429f3c"})))
        .respond_with(ok(json!({
            "device_list": [
                {
                    "product_type": "Camera", "mac": "CAM1", "product_model": "WYZE_CAKP2JFUS",
                    "nickname": "Porch", "conn_state": 1,
                    "device_params": {
                        "power_switch": 0,
                        "camera_thumbnails": {"thumbnails_url": "https://img/cam1.jpg"}
                    }
                },
                {"product_type": "Camera", "mac": "CAM2"},
                {"product_type": "Plug", "mac": "PLUG1", "product_model": "WLPP1"},
                {
                    "product_type": "Camera",
                    "mac": "CAM3",
                    "product_model": "HL_CAM4",
                    "power_switch": 1
                },
                "junk"
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    let macs: Vec<&str> = devices.iter().map(|d| d.mac.as_str()).collect();
    assert_eq!(macs, ["CAM1", "CAM3"]);
    assert_eq!(devices[0].power_switch, 0);
    assert_eq!(devices[0].conn_state, 1);
    assert_eq!(devices[1].power_switch, 1);

    // Served from the index; no second list call.
    let url = client.image_url("CAM1").await.unwrap();
    assert_eq!(url.as_deref(), Some("https://img/cam1.jpg"));
}

#[tokio::test]
async fn test_device_list_under_legacy_key() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .respond_with(ok(json!({
            "device_list": [],
            "device_info_list": [
                {"product_type": "Camera", "mac": "CAM9", "product_model": "M"}
            ]
        })))
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].mac, "CAM9");
}

#[tokio::test]
async fn test_device_list_not_a_list() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v2/home_page/get_object_list"))
        .respond_with(ok(json!({"device_list": {"oops": true}})))
        .mount(&server)
        .await;

    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedPayload { .. }));
}

#[tokio::test]
async fn test_set_property_normalizes_pid_and_value() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v2/device/set_property"))
        .and(body_partial_json(json!({
            "device_mac": "CAM1",
            "device_model": "WYZE_CAKP2JFUS",
            "pid": "P3",
            "pvalue": "1",
        })))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client
        .set_property("CAM1", "WYZE_CAKP2JFUS", " p3 ", &json!(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_set_field_uses_set_device_info_envelope() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/device/set_device_Info"))
        .and(body_partial_json(json!({
            "device_mac": "CAM1",
            "push_switch": 2,
            "sv": "e8e1db44128f4e31a2047a8f5f80b2bd",
        })))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.set_field("CAM1", "push_switch", json!(2)).await.unwrap();
}

#[tokio::test]
async fn test_extended_info_property_list() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v2/device/get_device_Info"))
        .and(body_partial_json(json!({"device_mac": "CAM1", "device_model": "M"})))
        .respond_with(ok(json!({
            "property_list": [
                {"pid": "P3", "value": "1"},
                {"pid": "p1047", "value": "0"}
            ]
        })))
        .mount(&server)
        .await;

    let info = client.get_extended_info("CAM1", "M").await.unwrap();
    assert_eq!(info.properties.len(), 2);
    assert_eq!(info.property("P1047"), Some(&json!("0")));
}

// ── Events ──────────────────────────────────────────────────────────

fn two_events() -> serde_json::Value {
    json!({
        "event_list": [
            {
                "event_id": "e100", "event_ts": 100,
                "file_list": [
                    {"type": 2, "url": "https://v/100.mp4"},
                    {"type": 1, "url": "https://i/100.jpg"}
                ]
            },
            {
                "event_id": "e200", "event_ts": 200,
                "file_list": [
                    {"type": 2, "url": "https://v/200.mp4"},
                    {"type": 1, "url": "https://i/200.jpg"}
                ]
            }
        ]
    })
}

#[tokio::test]
async fn test_event_list_request_is_signed() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v4/device/get_event_list"))
        .and(header("appid", DEFAULT_APP_ID))
        .and(header("access_token", "tok"))
        .and(header_exists("signature2"))
        .and(body_partial_json(json!({"count": 5, "device_id_list": ["CAM1"]})))
        .respond_with(ok(two_events()))
        .expect(1)
        .mount(&server)
        .await;

    let events = client
        .list_events(&EventQuery::for_device("CAM1").count(5))
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_ts, 200);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let signature = requests[0].headers.get("signature2").unwrap().to_str().unwrap();
    assert_eq!(signature, sign_msg(DEFAULT_APP_ID, &body, "tok").unwrap());
    assert!(!body.contains(' '), "body must be compact: {body}");
}

#[tokio::test]
async fn test_event_validation_makes_no_request() {
    let (server, client) = setup(logged_in("tok")).await;

    let err = client
        .list_events(&EventQuery::for_device("CAM1").count(21))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_latest_image_prefers_newest_event_and_caches() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v4/device/get_event_list"))
        .respond_with(ok(two_events()))
        .expect(1)
        .mount(&server)
        .await;

    let ttl = Duration::from_secs(60);
    let url = client.resolve_latest_image("CAM1", ttl).await;
    assert_eq!(url.as_deref(), Some("https://i/200.jpg"));

    let again = client.resolve_latest_image("CAM1", ttl).await;
    assert_eq!(again.as_deref(), Some("https://i/200.jpg"));
}

#[tokio::test]
async fn test_latest_image_widens_window() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v4/device/get_event_list"))
        .respond_with(ok(json!({"event_list": []})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v4/device/get_event_list"))
        .and(body_partial_json(json!({"begin_time": 0})))
        .respond_with(ok(two_events()))
        .expect(1)
        .mount(&server)
        .await;

    let url = client
        .resolve_latest_image("CAM1", Duration::from_secs(60))
        .await;
    assert_eq!(url.as_deref(), Some("https://i/200.jpg"));
}

#[tokio::test]
async fn test_latest_image_api_error_degrades_to_none() {
    let (server, client) = setup(logged_in("tok")).await;

    Mock::given(method("POST"))
        .and(path("/v4/device/get_event_list"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let ttl = Duration::from_secs(60);
    assert!(client.resolve_latest_image("CAM1", ttl).await.is_none());
    // The miss is cached too.
    assert!(client.resolve_latest_image("CAM1", ttl).await.is_none());
}
