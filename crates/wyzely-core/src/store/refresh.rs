// ── Poll result application ──
//
// Commits device-list polls and property fetches into the DataStore.
// Every path that touches both the cache and the camera records holds
// the cache lock for the whole update.

use chrono::Utc;
use serde_json::Value;

use super::DataStore;
use crate::model::{Device, PropertySet};

impl DataStore {
    /// Replace the camera collection with one poll's result.
    ///
    /// Cached properties are applied to each record before it is
    /// published; cameras absent from `devices` are dropped.
    pub(crate) fn commit_devices(&self, devices: Vec<Device>) {
        let cache = self.lock_cache();
        let entries = devices
            .into_iter()
            .map(|mut device| {
                if let Some(props) = cache.get(&device.mac) {
                    device.properties = props.clone();
                }
                (device.mac.clone(), device)
            })
            .collect();
        self.devices.replace_all(entries);
        drop(cache);

        self.last_full_refresh.send_replace(Some(Utc::now()));
    }

    /// Store a fresh property fetch for `mac`, replacing the cached set.
    ///
    /// The published record is left alone; the next commit applies it.
    pub(crate) fn cache_properties(&self, mac: &str, properties: PropertySet) {
        self.lock_cache().insert(mac.trim().to_owned(), properties);
    }

    /// Store a property fetch and publish it on the live record at once.
    pub(crate) fn apply_properties(&self, mac: &str, properties: PropertySet) {
        let mac = mac.trim();
        let mut cache = self.lock_cache();
        self.devices
            .update(mac, |device| device.properties = properties.clone());
        cache.insert(mac.to_owned(), properties);
    }

    /// Write one property into the cache and into the live record.
    ///
    /// Returns `false` for an empty MAC or pid.
    pub(crate) fn set_cached_property(&self, mac: &str, pid: &str, value: Value) -> bool {
        let mac = mac.trim();
        let pid = pid.trim().to_uppercase();
        if mac.is_empty() || pid.is_empty() {
            return false;
        }

        let mut cache = self.lock_cache();
        cache
            .entry(mac.to_owned())
            .or_default()
            .set(&pid, value.clone());
        self.devices
            .update(mac, |device| device.properties.set(&pid, value));
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Map, json};

    use super::*;

    fn device(mac: &str) -> Device {
        Device {
            mac: mac.into(),
            nickname: String::new(),
            model: "HL_CAM4".into(),
            conn_state: 1,
            power_switch: 1,
            params: Map::new(),
            thumbnail_url: None,
            properties: PropertySet::new(),
            raw: json!({}),
        }
    }

    #[test]
    fn commit_applies_cached_properties() {
        let store = DataStore::new();
        let mut props = PropertySet::new();
        props.set("P4", json!("1"));
        store.cache_properties("AA", props);

        store.commit_devices(vec![device("AA"), device("BB")]);

        let aa = store.device_by_mac("AA").unwrap();
        assert_eq!(aa.properties.get("P4"), Some(&json!("1")));
        assert!(store.device_by_mac("BB").unwrap().properties.is_empty());
        assert!(store.last_full_refresh().is_some());
    }

    #[test]
    fn commit_replaces_the_whole_collection() {
        let store = DataStore::new();
        store.commit_devices(vec![device("AA"), device("BB")]);
        store.commit_devices(vec![device("BB")]);
        assert_eq!(store.device_count(), 1);
        assert!(store.device_by_mac("AA").is_none());
    }

    #[test]
    fn set_cached_property_updates_cache_and_record() {
        let store = DataStore::new();
        store.commit_devices(vec![device("AA")]);
        let before = store.device_by_mac("AA").unwrap();

        assert!(store.set_cached_property(" AA ", " p1047 ", json!(1)));

        let after = store.device_by_mac("AA").unwrap();
        assert_eq!(after.properties.get("P1047"), Some(&json!(1)));
        assert!(before.properties.is_empty());
        assert_eq!(
            store.cached_properties("AA").unwrap().get("P1047"),
            Some(&json!(1))
        );

        // Survives the next poll.
        store.commit_devices(vec![device("AA")]);
        assert_eq!(
            store.device_by_mac("AA").unwrap().properties.get("P1047"),
            Some(&json!(1))
        );
    }

    #[test]
    fn empty_identifiers_are_ignored() {
        let store = DataStore::new();
        assert!(!store.set_cached_property("", "P3", json!(1)));
        assert!(!store.set_cached_property("AA", "  ", json!(1)));
        assert!(store.cached_properties("AA").is_none());
    }

    #[test]
    fn cached_property_for_unknown_camera_waits_for_commit() {
        let store = DataStore::new();
        assert!(store.set_cached_property("CC", "P3", json!("0")));
        assert!(store.device_by_mac("CC").is_none());
        store.commit_devices(vec![device("CC")]);
        assert_eq!(
            store.device_by_mac("CC").unwrap().properties.get("P3"),
            Some(&json!("0"))
        );
    }
}
