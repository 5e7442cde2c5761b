// ── Camera snapshot subscriptions ──
//
// Hosts follow the camera collection through a `DeviceStream`: the
// snapshot in hand, a wait for the next committed change, and a diff
// between the two keyed by MAC.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Device;

type Snapshot = Arc<Vec<Arc<Device>>>;

/// What one committed change did to the camera collection.
#[derive(Debug, Default)]
pub struct SnapshotChange {
    pub added: Vec<Arc<Device>>,
    /// MACs no longer in the collection.
    pub removed: Vec<String>,
    /// `(before, after)` for records whose contents changed.
    pub updated: Vec<(Arc<Device>, Arc<Device>)>,
}

impl SnapshotChange {
    /// Diff two snapshots. Records shared by pointer are skipped cheaply.
    pub fn between(before: &[Arc<Device>], after: &[Arc<Device>]) -> Self {
        let old: HashMap<&str, &Arc<Device>> =
            before.iter().map(|d| (d.mac.as_str(), d)).collect();
        let mut change = Self::default();

        for device in after {
            match old.get(device.mac.as_str()) {
                None => change.added.push(Arc::clone(device)),
                Some(prev) if Arc::ptr_eq(prev, device) || ***prev == **device => {}
                Some(prev) => change.updated.push((Arc::clone(prev), Arc::clone(device))),
            }
        }
        change.removed = before
            .iter()
            .filter(|d| !after.iter().any(|a| a.mac == d.mac))
            .map(|d| d.mac.clone())
            .collect();
        change
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// A subscription to the camera collection.
pub struct DeviceStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation time (or at the last `changed()`).
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// A camera from the snapshot in hand.
    pub fn get(&self, mac: &str) -> Option<Arc<Device>> {
        let mac = mac.trim();
        self.current.iter().find(|d| d.mac == mac).cloned()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Wait for the next change and report what it did. Commits that
    /// left every record as it was are skipped.
    pub async fn next_change(&mut self) -> Option<SnapshotChange> {
        loop {
            let before = self.current.clone();
            let after = self.changed().await?;
            let change = SnapshotChange::between(&before, &after);
            if !change.is_empty() {
                return Some(change);
            }
        }
    }

    /// Convert into a `Stream` of snapshots for `StreamExt` combinators.
    pub fn into_stream(self) -> DeviceWatchStream {
        DeviceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by the collection's `watch::Receiver`.
pub struct DeviceWatchStream {
    inner: WatchStream<Snapshot>,
}

impl Stream for DeviceWatchStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Map, json};
    use tokio_stream::StreamExt;

    use super::*;
    use crate::model::PropertySet;

    fn cam(mac: &str, power: i64) -> Arc<Device> {
        Arc::new(Device {
            mac: mac.into(),
            nickname: format!("Cam {mac}"),
            model: "HL_CAM4".into(),
            conn_state: 1,
            power_switch: power,
            params: Map::new(),
            thumbnail_url: None,
            properties: PropertySet::new(),
            raw: json!({}),
        })
    }

    #[test]
    fn diff_reports_added_removed_and_updated() {
        let a = cam("AA", 1);
        let before = vec![Arc::clone(&a), cam("BB", 1), cam("CC", 0)];
        let after = vec![a, cam("BB", 0), cam("CC", 0), cam("DD", 1)];

        let change = SnapshotChange::between(&before, &after);
        assert_eq!(change.added.len(), 1);
        assert_eq!(change.added[0].mac, "DD");
        assert!(change.removed.is_empty());
        assert_eq!(change.updated.len(), 1);
        let (old, new) = &change.updated[0];
        assert_eq!((old.power_switch, new.power_switch), (1, 0));

        let gone = SnapshotChange::between(&after, &after[..1]);
        assert_eq!(gone.removed, vec!["BB", "CC", "DD"]);
        assert!(SnapshotChange::between(&after, &after).is_empty());
    }

    #[tokio::test]
    async fn next_change_reports_updates() {
        let (tx, rx) = watch::channel(Arc::new(vec![cam("AA", 1)]));
        let mut stream = DeviceStream::new(rx);
        assert!(stream.get(" AA ").is_some());

        tx.send_replace(Arc::new(vec![cam("AA", 1)]));
        tx.send_replace(Arc::new(vec![cam("AA", 0)]));
        let change = stream.next_change().await.unwrap();
        assert_eq!(change.updated.len(), 1);
        assert_eq!(stream.get("AA").unwrap().power_switch, 0);

        drop(tx);
        assert!(stream.next_change().await.is_none());
    }

    #[tokio::test]
    async fn stream_yields_snapshots() {
        let (tx, rx) = watch::channel(Arc::new(Vec::new()));
        let mut stream = DeviceStream::new(rx).into_stream();
        assert_eq!(stream.next().await.unwrap().len(), 0);
        tx.send_replace(Arc::new(vec![cam("AA", 1)]));
        assert_eq!(stream.next().await.unwrap().len(), 1);
    }
}
