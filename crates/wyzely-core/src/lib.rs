// wyzely-core: Polling coordinator and camera state between wyzely-api and consumers.

pub mod backoff;
pub mod camera;
pub mod config;
pub mod control;
pub mod convert;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod model;
pub mod readings;
pub mod store;
pub mod stream;
pub mod verifier;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backoff::{Backoff, RateLimitPolicy};
pub use camera::{CameraImage, ImageFetcher, PlaceholderImage, render_stream_url, slugify};
pub use config::{CoordinatorConfig, StoredCredential};
pub use control::{CONTROLS, ControlKey, ControlReading, ControlSpec};
pub use coordinator::{Coordinator, SyncState};
pub use credentials::{CredentialSink, CredentialUpdate};
pub use error::CoreError;
pub use model::{Device, PropertySet};
pub use readings::Readings;
pub use store::DataStore;
pub use stream::{DeviceStream, SnapshotChange};
pub use verifier::{CommandVerifier, VerifierPolicy};

// Types consumers need from the API layer.
pub use wyzely_api::{Account, Endpoints, Event, EventQuery};
