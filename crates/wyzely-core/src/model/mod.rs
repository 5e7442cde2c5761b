// ── Domain model ──
//
// The canonical camera record consumers (CLI, controls, readings) work
// from. Built from the API's device-list item plus the property cache.

pub mod device;
pub mod property;

pub use device::Device;
pub use property::PropertySet;
