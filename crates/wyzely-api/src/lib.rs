// wyzely-api: Async Rust client for the Wyze camera cloud API

pub mod auth;
pub mod client;
mod devices;
pub mod error;
mod events;
pub mod models;
pub mod sign;
pub mod transport;

pub use auth::{Account, Credential, CredentialStore, Endpoints};
pub use client::{EnvelopeKind, TOKEN_EXPIRED_CODE, WyzeClient};
pub use error::Error;
pub use events::{DEFAULT_EVENT_IMAGE_TTL, EventQuery, MAX_EVENT_COUNT};
pub use models::{CameraDevice, Event, EventFile, ExtendedInfo, PropertyEntry};
pub use transport::TransportConfig;
