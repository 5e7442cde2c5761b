// ── Central reactive data store ──
//
// Thread-safe storage for camera records. Mutations are broadcast to
// subscribers via `watch` channels.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::EntityCollection;
use crate::model::{Device, PropertySet};
use crate::stream::DeviceStream;

/// Central reactive store for one account's cameras.
///
/// Reads are lock-free snapshots. The property cache sits behind a mutex
/// that is also held while a poll result is committed, so an optimistic
/// property write and a commit never interleave.
pub struct DataStore {
    pub(crate) devices: EntityCollection<Device>,
    pub(crate) property_cache: Mutex<HashMap<String, PropertySet>>,
    pub(crate) last_full_refresh: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new() -> Self {
        let (last_full_refresh, _) = watch::channel(None);

        Self {
            devices: EntityCollection::new(),
            property_cache: Mutex::new(HashMap::new()),
            last_full_refresh,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    /// All cameras from the last committed poll, sorted by MAC.
    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn device_by_mac(&self, mac: &str) -> Option<Arc<Device>> {
        self.devices.get_by_key(mac.trim())
    }

    /// Cached extended properties for `mac`, if any were ever fetched.
    pub fn cached_properties(&self, mac: &str) -> Option<PropertySet> {
        self.lock_cache().get(mac.trim()).cloned()
    }

    // ── Counts ───────────────────────────────────────────────────────

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Bumped on every change to the camera collection.
    pub fn version(&self) -> u64 {
        self.devices.version()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_devices(&self) -> DeviceStream {
        DeviceStream::new(self.devices.subscribe())
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_full_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_full_refresh.borrow()
    }

    /// How long ago the last successful poll was committed.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_full_refresh().map(|t| Utc::now() - t)
    }

    pub(crate) fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, PropertySet>> {
        self.property_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
