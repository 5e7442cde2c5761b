// Response models for the Wyze cloud API
//
// The cloud's payloads are loosely typed: integers arrive as strings,
// lists arrive under alternate keys, and fields come and go between app
// versions. These types pull out the fields we rely on and keep the raw
// JSON alongside for everything else.

use serde::Serialize;
use serde_json::{Map, Value};

/// Product type string identifying cameras in the device list.
pub const CAMERA_PRODUCT_TYPE: &str = "Camera";

/// Event file type marking a still image (video clips use other values).
pub const EVENT_FILE_IMAGE: i64 = 1;

// ── Coercion helpers ─────────────────────────────────────────────────

/// Integer coercion matching the cloud's loose typing: numbers, numeric
/// strings and booleans convert; anything else is `None`.
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(f64_to_i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(f64_to_i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn f64_to_i64(f: f64) -> Option<i64> {
    (f.is_finite() && f.abs() < 9.0e15).then(|| f.trunc() as i64)
}

/// Python-style truthiness for JSON values.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Non-empty string at `key`.
pub fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Render a scalar the way the cloud stringifies it (`"1"`, not `"\"1\""`).
pub fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ── Devices ──────────────────────────────────────────────────────────

/// A camera from the home-page object list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraDevice {
    pub mac: String,
    pub nickname: String,
    pub product_model: String,
    /// `1` when the camera is online.
    pub conn_state: i64,
    /// `0` is a real "off" reading, distinct from the field being absent.
    pub power_switch: i64,
    pub device_params: Map<String, Value>,
    pub thumbnail_url: String,
    /// Full upstream object, kept for fields not modeled here.
    pub raw: Value,
}

impl CameraDevice {
    /// Extract a camera from one device-list item.
    ///
    /// Returns `None` for non-camera products and for items missing a MAC
    /// or model.
    pub fn from_raw(item: &Value) -> Option<Self> {
        let obj = item.as_object()?;
        if obj.get("product_type").and_then(Value::as_str) != Some(CAMERA_PRODUCT_TYPE) {
            return None;
        }
        let mac = non_empty_str(obj, "mac")?.to_owned();
        let product_model = non_empty_str(obj, "product_model")?.to_owned();

        let device_params = obj
            .get("device_params")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let thumbnail_url = thumbnail_url_from_params(&device_params)
            .unwrap_or_default()
            .to_owned();

        let conn_state = obj.get("conn_state").and_then(coerce_int).unwrap_or(0);

        // First non-null source wins: device_params, then the top level.
        let power_switch = device_params
            .get("power_switch")
            .filter(|v| !v.is_null())
            .or_else(|| obj.get("power_switch"))
            .and_then(coerce_int)
            .unwrap_or(0);

        let nickname = obj
            .get("nickname")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        Some(Self {
            mac,
            nickname,
            product_model,
            conn_state,
            power_switch,
            device_params,
            thumbnail_url,
            raw: item.clone(),
        })
    }

    /// Thumbnail URL, falling back to the raw payload's nested field.
    pub fn best_thumbnail_url(&self) -> Option<&str> {
        if !self.thumbnail_url.is_empty() {
            return Some(&self.thumbnail_url);
        }
        self.raw
            .get("device_params")
            .and_then(Value::as_object)
            .and_then(thumbnail_url_from_params)
    }
}

fn thumbnail_url_from_params(params: &Map<String, Value>) -> Option<&str> {
    params
        .get("camera_thumbnails")
        .and_then(Value::as_object)
        .and_then(|t| t.get("thumbnails_url"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

// ── Extended device info ─────────────────────────────────────────────

/// One `(pid, value)` entry from a device's property list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyEntry {
    /// Uppercased property id (e.g. `P3`).
    pub pid: String,
    pub value: Value,
}

/// Extended per-device payload from `get_device_Info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedInfo {
    /// Property list in upstream order, entries without a pid dropped.
    pub properties: Vec<PropertyEntry>,
    pub raw: Value,
}

impl ExtendedInfo {
    pub fn from_value(raw: Value) -> Self {
        let properties = raw
            .get("property_list")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(property_entry).collect())
            .unwrap_or_default();
        Self { properties, raw }
    }

    /// Value of `pid` (case-insensitive), if listed.
    pub fn property(&self, pid: &str) -> Option<&Value> {
        let pid = pid.trim().to_uppercase();
        self.properties
            .iter()
            .find(|p| p.pid == pid)
            .map(|p| &p.value)
    }
}

/// Entries carry their value under `value` or, on older firmware, `pvalue`.
fn property_entry(item: &Value) -> Option<PropertyEntry> {
    let obj = item.as_object()?;
    let pid = obj.get("pid").and_then(Value::as_str)?.trim().to_uppercase();
    if pid.is_empty() {
        return None;
    }
    let value = obj
        .get("value")
        .filter(|v| !v.is_null())
        .or_else(|| obj.get("pvalue"))
        .cloned()
        .unwrap_or(Value::Null);
    Some(PropertyEntry { pid, value })
}

// ── Events ───────────────────────────────────────────────────────────

/// Attachment of an event (still image or clip).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventFile {
    pub file_type: Option<i64>,
    pub url: Option<String>,
}

/// One entry of the v4 event list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event_id: Option<String>,
    pub device_mac: Option<String>,
    /// Event time in epoch milliseconds; `-1` when unparseable or absent.
    pub event_ts: i64,
    pub files: Vec<EventFile>,
    /// `thumbnail`, falling back to `thumbnail_url`.
    pub thumbnail: Option<String>,
    pub raw: Value,
}

impl Event {
    pub fn from_raw(item: &Value) -> Option<Self> {
        let obj = item.as_object()?;
        let files = obj
            .get("file_list")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_object)
                    .map(|f| EventFile {
                        file_type: f.get("type").and_then(coerce_int),
                        url: non_empty_str(f, "url").map(str::to_owned),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            event_id: obj.get("event_id").and_then(Value::as_str).map(str::to_owned),
            device_mac: obj.get("device_mac").and_then(Value::as_str).map(str::to_owned),
            event_ts: obj.get("event_ts").and_then(coerce_int).unwrap_or(-1),
            files,
            thumbnail: non_empty_str(obj, "thumbnail")
                .or_else(|| non_empty_str(obj, "thumbnail_url"))
                .map(str::to_owned),
            raw: item.clone(),
        })
    }

    /// Best still-image URL: an image attachment, any attachment, then the
    /// event thumbnail.
    pub fn image_url(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.file_type == Some(EVENT_FILE_IMAGE) && f.url.is_some())
            .or_else(|| self.files.iter().find(|f| f.url.is_some()))
            .and_then(|f| f.url.as_deref())
            .or(self.thumbnail.as_deref())
    }
}

/// Pick the most recent event (strictly greatest `event_ts`, first wins on
/// ties, first overall when none parse) and return its image URL.
pub fn pick_event_image_url(events: &[Event]) -> Option<&str> {
    let mut best: Option<&Event> = None;
    let mut best_ts = -1;
    for event in events {
        if event.event_ts > best_ts {
            best = Some(event);
            best_ts = event.event_ts;
        }
    }
    best.or_else(|| events.first())?.image_url()
}
