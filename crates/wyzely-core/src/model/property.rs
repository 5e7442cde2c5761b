// Extended property set
//
// Two views of one camera's property list: the upstream order, and a pid
// lookup. Both are only ever changed together through `set`, so a reader
// can never find them disagreeing.

use std::collections::HashMap;

use serde::{Serialize, Serializer};
use serde_json::Value;
use wyzely_api::PropertyEntry;

/// A camera's extended properties, keyed by uppercased pid.
///
/// Each pid appears once in the list; a duplicate in the upstream payload
/// keeps its first position and its last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySet {
    entries: Vec<PropertyEntry>,
    by_pid: HashMap<String, Value>,
}

fn normalize_pid(pid: &str) -> String {
    pid.trim().to_uppercase()
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = PropertyEntry>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.set(&entry.pid, entry.value);
        }
        set
    }

    /// Insert or overwrite one property. Empty pids are ignored.
    pub fn set(&mut self, pid: &str, value: Value) {
        let pid = normalize_pid(pid);
        if pid.is_empty() {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.pid == pid) {
            entry.value = value.clone();
        } else {
            self.entries.push(PropertyEntry {
                pid: pid.clone(),
                value: value.clone(),
            });
        }
        self.by_pid.insert(pid, value);
    }

    pub fn get(&self, pid: &str) -> Option<&Value> {
        self.by_pid.get(&normalize_pid(pid))
    }

    pub fn contains(&self, pid: &str) -> bool {
        self.by_pid.contains_key(&normalize_pid(pid))
    }

    /// Entries in upstream order.
    pub fn entries(&self) -> &[PropertyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sorted_pids(&self) -> Vec<String> {
        let mut pids: Vec<String> = self.by_pid.keys().cloned().collect();
        pids.sort();
        pids
    }
}

impl Serialize for PropertySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}
