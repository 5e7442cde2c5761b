use serde::Serialize;
use serde_json::{Map, Value};

use super::property::PropertySet;

/// One camera as last seen by the coordinator.
///
/// Records are replaced whole, never edited in place, so a reader holding
/// an `Arc<Device>` always sees one consistent poll result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub mac: String,
    pub nickname: String,
    /// Product model (e.g. `HL_CAM4`). Property reads and writes need it.
    pub model: String,
    /// `1` when online.
    pub conn_state: i64,
    pub power_switch: i64,
    pub params: Map<String, Value>,
    pub thumbnail_url: Option<String>,
    /// Extended properties from the slow poll (or optimistic writes).
    pub properties: PropertySet,
    /// Full upstream device-list item.
    pub raw: Value,
}

impl Device {
    pub fn is_online(&self) -> bool {
        self.conn_state == 1
    }

    /// Nickname, or the MAC when the camera has none.
    pub fn display_name(&self) -> &str {
        if self.nickname.is_empty() {
            &self.mac
        } else {
            &self.nickname
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn raw_field(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn has_model(&self) -> bool {
        !self.model.trim().is_empty()
    }
}
