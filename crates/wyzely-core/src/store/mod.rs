// ── Reactive data store ──
//
// Camera snapshots with push-based change notification, plus the
// extended-property cache that survives between slow polls.

mod collection;
mod data_store;
mod refresh;

pub use data_store::DataStore;
