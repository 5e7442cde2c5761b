// ── Coordinator ──
//
// Lifecycle management for one Wyze account: login, the device-list
// poll, the slow extended-property poll, rate-limit backoff, and token
// persistence. Consumers read camera snapshots from the DataStore and
// write through the command helpers here and in `control`.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wyzely_api::{Event, EventQuery, TransportConfig, WyzeClient};

use crate::backoff::{Backoff, RateLimitPolicy};
use crate::config::{CoordinatorConfig, StoredCredential};
use crate::control::ControlKey;
use crate::credentials::{CredentialSink, CredentialUpdate};
use crate::error::CoreError;
use crate::model::{Device, PropertySet};
use crate::store::DataStore;
use crate::stream::DeviceStream;
use crate::verifier::CommandVerifier;

// ── SyncState ────────────────────────────────────────────────────

/// Sync state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Connecting,
    Connected,
    /// The device-list poll is suspended until `resume_at`.
    RateLimited { resume_at: DateTime<Utc> },
    /// The last poll failed for another reason.
    Failed { message: String },
}

// ── Coordinator ──────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    client: Arc<WyzeClient>,
    store: Arc<DataStore>,
    sink: Option<Arc<dyn CredentialSink>>,
    /// What the host last stored, for change detection.
    persisted: StdMutex<StoredCredential>,
    /// Held for a whole poll cycle; polls never overlap.
    poll: Mutex<PollState>,
    state: watch::Sender<SyncState>,
    verifiers: DashMap<(String, ControlKey), CommandVerifier>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug, Default)]
struct PollState {
    device_backoff: Backoff,
    property_backoff: Backoff,
    properties_refreshed_at: Option<Instant>,
}

impl Coordinator {
    /// Create a coordinator. Does NOT connect -- call
    /// [`connect()`](Self::connect) to log in and start polling.
    pub fn new(
        config: CoordinatorConfig,
        sink: Option<Arc<dyn CredentialSink>>,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig::default().with_timeout(config.timeout);
        let client = WyzeClient::new(
            config.account.clone(),
            config.credential.to_credential(),
            config.endpoints.clone(),
            &transport,
        )?;
        let (state, _) = watch::channel(SyncState::Disconnected);

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                persisted: StdMutex::new(config.credential.clone()),
                config,
                client: Arc::new(client),
                store: Arc::new(DataStore::new()),
                sink,
                poll: Mutex::new(PollState::default()),
                state,
                verifiers: DashMap::new(),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    /// The API client, for calls the coordinator does not wrap.
    pub fn client(&self) -> &Arc<WyzeClient> {
        &self.inner.client
    }

    pub(crate) fn verifiers(&self) -> &DashMap<(String, ControlKey), CommandVerifier> {
        &self.inner.verifiers
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Log in (unless restored tokens are present), run the first poll,
    /// and start background polling.
    ///
    /// Restored tokens the cloud rejects trigger one fresh login.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::CoordinatorStopped);
        }
        self.inner.state.send_replace(SyncState::Connecting);

        let restored = self.inner.client.is_logged_in();
        if !restored {
            self.login().await?;
        }

        match self.refresh().await {
            Err(CoreError::AuthenticationFailed { message }) if restored => {
                debug!(%message, "restored session rejected, logging in again");
                self.login().await?;
                self.refresh().await?;
            }
            other => other?,
        }

        let interval = self.inner.config.poll_interval;
        if !interval.is_zero() {
            let coordinator = self.clone();
            let cancel = self.inner.cancel.clone();
            self.inner
                .task_handles
                .lock()
                .await
                .push(tokio::spawn(poll_task(coordinator, cancel)));
        }

        info!(cameras = self.inner.store.device_count(), "connected to Wyze cloud");
        Ok(())
    }

    /// Stop background polling and wait for it to finish.
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner.state.send_replace(SyncState::Disconnected);
        debug!("disconnected");
    }

    /// Fresh password login.
    pub async fn login(&self) -> Result<(), CoreError> {
        if let Err(e) = self.inner.client.login().await {
            let err = CoreError::from(e);
            self.inner.state.send_replace(SyncState::Failed {
                message: err.to_string(),
            });
            return Err(err);
        }
        info!("logged in");
        Ok(())
    }

    /// One-shot: connect, run closure, disconnect. Background polling is
    /// disabled.
    pub async fn oneshot<F, Fut, T>(
        config: CoordinatorConfig,
        sink: Option<Arc<dyn CredentialSink>>,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Coordinator) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.poll_interval = Duration::ZERO;

        let coordinator = Coordinator::new(cfg, sink)?;
        coordinator.connect().await?;
        let result = f(coordinator.clone()).await;
        coordinator.disconnect().await;
        result
    }

    // ── Polling ──────────────────────────────────────────────────

    /// Run one poll cycle: the device list, then (when due) extended
    /// properties, then commit.
    ///
    /// While the device poll is backing off from a rate limit this
    /// returns `RateLimited` without touching the network.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::CoordinatorStopped);
        }
        let mut poll = self.inner.poll.lock().await;

        if let Some(wait) = poll.device_backoff.remaining(Instant::now()) {
            let reset_by = poll.device_backoff.state().and_then(|s| s.reset_by);
            debug!(wait_secs = wait.as_secs(), "device poll suspended by rate limit");
            return Err(CoreError::RateLimited {
                retry_after_secs: wait.as_secs(),
                reset_by,
            });
        }

        let cameras = match self.inner.client.list_devices().await {
            Ok(cameras) => cameras,
            Err(wyzely_api::Error::RateLimited {
                remaining,
                reset_by,
                ..
            }) => {
                let delay = self.engage_backoff(&mut poll.device_backoff, remaining, reset_by);
                warn!(
                    remaining,
                    wait_secs = delay.as_secs(),
                    "device list rate limited, backing off"
                );
                self.inner.state.send_replace(SyncState::RateLimited {
                    resume_at: resume_at(delay),
                });
                return Err(CoreError::RateLimited {
                    retry_after_secs: delay.as_secs(),
                    reset_by,
                });
            }
            Err(e) => {
                warn!(error = %e, "device list refresh failed");
                let err = CoreError::from(e);
                self.inner.state.send_replace(SyncState::Failed {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        poll.device_backoff.clear();
        self.persist_credentials();

        let devices: Vec<Device> = cameras.into_iter().map(Device::from).collect();
        self.refresh_properties(&mut poll, &devices).await;

        let count = devices.len();
        self.inner.store.commit_devices(devices);
        self.inner.state.send_replace(SyncState::Connected);
        debug!(cameras = count, "refresh complete");
        Ok(())
    }

    /// Refresh now, logging instead of returning failures.
    pub async fn request_refresh(&self) {
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "requested refresh failed");
        }
    }

    /// Sweep extended properties when the slow interval has elapsed.
    ///
    /// Sequential, with a pause after each success. A rate limit stops
    /// the sweep and suspends only this poller; any other per-camera
    /// failure skips that camera.
    async fn refresh_properties(&self, poll: &mut PollState, devices: &[Device]) {
        let config = &self.inner.config;
        let now = Instant::now();

        if !config.sweep_properties {
            return;
        }
        if let Some(wait) = poll.property_backoff.remaining(now) {
            debug!(wait_secs = wait.as_secs(), "property poll suspended by rate limit");
            return;
        }
        if let Some(last) = poll.properties_refreshed_at {
            if now.duration_since(last) < config.property_refresh_interval {
                return;
            }
        }

        for device in devices {
            if device.mac.is_empty() || !device.has_model() {
                continue;
            }
            match self
                .inner
                .client
                .get_extended_info(&device.mac, &device.model)
                .await
            {
                Ok(info) => {
                    let properties = PropertySet::from_entries(info.properties);
                    self.inner.store.cache_properties(&device.mac, properties);
                    tokio::time::sleep(config.property_delay).await;
                }
                Err(wyzely_api::Error::RateLimited {
                    remaining,
                    reset_by,
                    ..
                }) => {
                    let delay =
                        self.engage_backoff(&mut poll.property_backoff, remaining, reset_by);
                    warn!(
                        mac = %device.mac,
                        wait_secs = delay.as_secs(),
                        "property refresh rate limited, pausing property polling"
                    );
                    return;
                }
                Err(e) => {
                    debug!(mac = %device.mac, error = %e, "property fetch failed, skipping camera");
                }
            }
        }

        poll.property_backoff.clear();
        poll.properties_refreshed_at = Some(Instant::now());
    }

    fn engage_backoff(
        &self,
        backoff: &mut Backoff,
        remaining: u32,
        reset_by: Option<DateTime<Utc>>,
    ) -> Duration {
        let policy = RateLimitPolicy {
            floor: self.inner.config.rate_limit_floor,
            fallback: self.inner.config.rate_limit_fallback,
        };
        let delay = policy.delay(reset_by, Utc::now());
        backoff.engage(Instant::now(), delay, remaining, reset_by);
        delay
    }

    /// Time until the next scheduled poll.
    async fn next_poll_delay(&self) -> Duration {
        let poll = self.inner.poll.lock().await;
        poll.device_backoff
            .remaining(Instant::now())
            .unwrap_or(self.inner.config.poll_interval)
    }

    /// Hand changed tokens to the host. Storage failures are logged, and
    /// retried after the next successful poll.
    fn persist_credentials(&self) {
        let Some(sink) = &self.inner.sink else {
            return;
        };
        let current = self.inner.client.credential();
        let mut stored = self
            .inner
            .persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let update = CredentialUpdate::between(&stored, &current);
        if update.is_empty() {
            return;
        }
        match sink.persist(&update) {
            Ok(()) => {
                debug!(fields = ?update.changed_fields(), "persisted credentials");
                stored.absorb(&update);
            }
            Err(e) => warn!(error = %e, "failed to persist credentials"),
        }
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Record a property value locally (cache and live record) without
    /// calling the cloud.
    pub fn set_cached_property(&self, mac: &str, pid: &str, value: Value) {
        if !self.inner.store.set_cached_property(mac, pid, value) {
            debug!(mac, pid, "ignoring cached property with empty identifier");
        }
    }

    /// Write one device field (`set_device_Info`).
    pub async fn set_field(&self, mac: &str, field: &str, value: Value) -> Result<(), CoreError> {
        let device = self.require_device(mac)?;
        self.inner.client.set_field(&device.mac, field, value).await?;
        Ok(())
    }

    /// Write one typed property and mirror it into the cache.
    pub async fn set_property(&self, mac: &str, pid: &str, value: Value) -> Result<(), CoreError> {
        let device = self.require_device(mac)?;
        if !device.has_model() {
            return Err(CoreError::MissingModel { mac: device.mac.clone() });
        }
        self.inner
            .client
            .set_property(&device.mac, &device.model, pid, &value)
            .await?;
        self.set_cached_property(&device.mac, pid, value);
        Ok(())
    }

    /// Fetch one camera's extended properties now, outside the sweep.
    pub async fn fetch_properties(&self, mac: &str) -> Result<PropertySet, CoreError> {
        let device = self.require_device(mac)?;
        if !device.has_model() {
            return Err(CoreError::MissingModel { mac: device.mac.clone() });
        }
        let info = self
            .inner
            .client
            .get_extended_info(&device.mac, &device.model)
            .await?;
        let properties = PropertySet::from_entries(info.properties);
        self.inner
            .store
            .apply_properties(&device.mac, properties.clone());
        Ok(properties)
    }

    // ── Events and images ────────────────────────────────────────

    pub async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>, CoreError> {
        Ok(self.inner.client.list_events(query).await?)
    }

    /// Cached latest-event image URL, `None` on any failure.
    pub async fn latest_event_image(&self, mac: &str) -> Option<String> {
        self.inner
            .client
            .resolve_latest_image(mac, self.inner.config.event_image_ttl)
            .await
    }

    /// Thumbnail URL from the last poll, fetched on demand for a camera
    /// not yet seen.
    pub async fn image_url(&self, mac: &str) -> Result<Option<String>, CoreError> {
        if let Some(device) = self.device(mac) {
            return Ok(device.thumbnail_url.clone());
        }
        Ok(self.inner.client.image_url(mac.trim()).await?)
    }

    // ── State observation ────────────────────────────────────────

    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    // ── Snapshot accessors ───────────────────────────────────────

    pub fn device(&self, mac: &str) -> Option<Arc<Device>> {
        self.inner.store.device_by_mac(mac)
    }

    pub fn require_device(&self, mac: &str) -> Result<Arc<Device>, CoreError> {
        self.device(mac).ok_or_else(|| CoreError::DeviceNotFound {
            identifier: mac.trim().to_owned(),
        })
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.store.devices_snapshot()
    }

    pub fn devices(&self) -> DeviceStream {
        self.inner.store.subscribe_devices()
    }
}

fn resume_at(delay: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default()
}

// ── Background tasks ─────────────────────────────────────────────

/// Poll the device list on the configured interval, stretched to the
/// backoff while rate limited.
async fn poll_task(coordinator: Coordinator, cancel: CancellationToken) {
    loop {
        let wait = coordinator.next_poll_delay().await;
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(wait) => {
                if let Err(e) = coordinator.refresh().await {
                    debug!(error = %e, "scheduled refresh failed");
                }
            }
        }
    }
}
