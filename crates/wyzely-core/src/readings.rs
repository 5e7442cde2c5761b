// ── Sensor readings ──
//
// Read-only projections of a camera snapshot: connectivity, battery,
// signal, network identity, firmware, climate, and recent motion. The
// cloud scatters these fields between `device_params`, the raw item, and
// the top level, and spells some of them several ways.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use wyzely_api::models::{coerce_int, is_truthy, value_to_plain_string};

use crate::model::Device;

const BATTERY_KEYS: &[&str] = &[
    "electricity",
    "battery",
    "battery_level",
    "battery_percent",
    "battery_percentage",
    "battery_value",
];

const RSSI_KEYS: &[&str] = &[
    "rssi",
    "wifi_rssi",
    "wifiRSSI",
    "signal",
    "signal_strength",
    "wifi_signal",
];

/// Motion counts as current for this long after the last thumbnail.
pub const MOTION_WINDOW: chrono::Duration = chrono::Duration::seconds(120);

/// Every sensor value for one camera.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readings {
    /// `"online"` or `"offline"`.
    pub connection: &'static str,
    pub battery: Option<i64>,
    pub rssi: Option<i64>,
    pub last_thumbnail: Option<DateTime<Utc>>,
    pub motion: bool,
    pub ssid: Option<String>,
    pub ip: Option<String>,
    pub public_ip: Option<String>,
    pub firmware: Option<String>,
    pub hardware: Option<String>,
    pub property_count: usize,
    pub property_pids: Vec<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl Readings {
    pub fn from_device(device: &Device, now: DateTime<Utc>) -> Self {
        let last_thumbnail = last_thumbnail(device);
        Self {
            connection: connection(device),
            battery: battery(device),
            rssi: rssi(device),
            last_thumbnail,
            motion: last_thumbnail.is_some_and(|ts| now - ts <= MOTION_WINDOW),
            ssid: plain(device, "ssid"),
            ip: plain(device, "ip"),
            public_ip: plain(device, "public_ip"),
            firmware: trimmed(device, "firmware_ver"),
            hardware: trimmed(device, "hardware_ver"),
            property_count: device.properties.len(),
            property_pids: device.properties.sorted_pids(),
            temperature: climate(device, "temperature"),
            humidity: climate(device, "humidity"),
        }
    }
}

/// First of `keys` present in params, the raw item, or the top level.
///
/// Presence wins, not truthiness: a `null` under the first key found is
/// returned as-is.
pub fn extract_first(device: &Device, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|&key| {
        device
            .param(key)
            .or_else(|| device.raw_field(key))
            .cloned()
            .or_else(|| top_level(device, key))
    })
}

fn top_level(device: &Device, key: &str) -> Option<Value> {
    match key {
        "mac" => Some(device.mac.clone().into()),
        "nickname" => Some(device.nickname.clone().into()),
        "product_model" => Some(device.model.clone().into()),
        "conn_state" => Some(device.conn_state.into()),
        "power_switch" => Some(device.power_switch.into()),
        "thumbnail_url" => device.thumbnail_url.clone().map(Value::from),
        _ => None,
    }
}

fn int_of(device: &Device, keys: &[&str]) -> Option<i64> {
    extract_first(device, keys).as_ref().and_then(coerce_int)
}

pub fn connection(device: &Device) -> &'static str {
    if int_of(device, &["conn_state"]) == Some(1) {
        "online"
    } else {
        "offline"
    }
}

/// Battery percentage, dropped outside 0..=100.
pub fn battery(device: &Device) -> Option<i64> {
    int_of(device, BATTERY_KEYS).filter(|v| (0..=100).contains(v))
}

/// Wi-Fi signal in dBm, dropped outside -120..=0 (percent scales are ignored).
pub fn rssi(device: &Device) -> Option<i64> {
    int_of(device, RSSI_KEYS).filter(|v| (-120..=0).contains(v))
}

pub fn last_thumbnail(device: &Device) -> Option<DateTime<Utc>> {
    let ts = device
        .param("camera_thumbnails")
        .and_then(|t| t.get("thumbnails_ts"))
        .and_then(coerce_int)
        .unwrap_or(0);
    if ts <= 0 {
        return None;
    }
    DateTime::from_timestamp_millis(ts)
}

fn plain(device: &Device, key: &str) -> Option<String> {
    extract_first(device, &[key])
        .filter(|v| !v.is_null())
        .map(|v| value_to_plain_string(&v))
}

fn trimmed(device: &Device, key: &str) -> Option<String> {
    plain(device, key)
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

/// Temperature or humidity.
///
/// Cameras flag support with `is_temperature_humidity`. Without the flag
/// a reading of exactly zero is treated as "no sensor", since that is
/// what unsupported models report.
#[allow(clippy::float_cmp)]
fn climate(device: &Device, key: &str) -> Option<f64> {
    let supports = match device.param("is_temperature_humidity") {
        None => None,
        Some(flag) if !is_truthy(flag) => Some(false),
        Some(flag) => coerce_int(flag).map(|v| v == 1),
    };
    if supports == Some(false) {
        return None;
    }

    let value = extract_first(device, &[key]).as_ref().and_then(coerce_float)?;
    if value == 0.0 && supports.is_none() {
        return None;
    }
    Some(value)
}
