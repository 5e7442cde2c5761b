// Event endpoints
//
// Event history comes from the v4 cloud host, which signs the canonical
// request body instead of using the classic envelope. On top of it sits
// the latest-event image resolver, a cached best-effort fallback for
// cameras whose thumbnail field is empty or stale.

use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::client::{SignedCall, WyzeClient};
use crate::error::Error;
use crate::models::{Event, pick_event_image_url};

/// Largest page the event endpoint accepts.
pub const MAX_EVENT_COUNT: u8 = 20;

/// The server's end-of-window fuzz: "now" is taken 60s in the future.
const END_FUZZ_SECS: i64 = 60;

/// Default look-back window when no begin time is given.
const DEFAULT_WINDOW_MS: i64 = 1_000_000;

const DAY_MS: i64 = 86_400_000;

/// Default lifetime of a resolved latest-event image URL.
pub const DEFAULT_EVENT_IMAGE_TTL: Duration = Duration::from_secs(60);

/// Parameters for [`WyzeClient::list_events`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub device_ids: Vec<String>,
    /// Window start, epoch ms. Computed from `end` and `last_ts` if absent.
    pub begin_ms: Option<i64>,
    /// Window end, epoch ms. `None` or `0` means "now + 60s".
    pub end_ms: Option<i64>,
    /// Page size, 1 to 20.
    pub count: u8,
    /// Sort order code, `1` or `2`.
    pub order_by: u8,
    /// Only events after this epoch second (when `begin_ms` is absent).
    pub last_ts: i64,
    pub event_values: Vec<Value>,
    pub event_tags: Vec<Value>,
}

impl EventQuery {
    /// Latest events for one camera, default window.
    pub fn for_device(mac: impl Into<String>) -> Self {
        Self {
            device_ids: vec![mac.into()],
            begin_ms: None,
            end_ms: None,
            count: MAX_EVENT_COUNT,
            order_by: 1,
            last_ts: 0,
            event_values: Vec::new(),
            event_tags: Vec::new(),
        }
    }

    pub fn count(mut self, count: u8) -> Self {
        self.count = count;
        self
    }

    pub fn window(mut self, begin_ms: Option<i64>, end_ms: Option<i64>) -> Self {
        self.begin_ms = begin_ms;
        self.end_ms = end_ms;
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if !(1..=MAX_EVENT_COUNT).contains(&self.count) {
            return Err(Error::Validation {
                message: format!("count {} must be between 1 and {MAX_EVENT_COUNT}", self.count),
            });
        }
        if !matches!(self.order_by, 1 | 2) {
            return Err(Error::Validation {
                message: format!("order_by {} must be 1 or 2", self.order_by),
            });
        }
        Ok(())
    }

    /// Resolve the `(begin, end)` window against `now_ms`.
    fn resolve_window(&self, now_ms: i64) -> (i64, i64) {
        let current = (now_ms / 1000 + END_FUZZ_SECS) * 1000;
        let end = self.end_ms.filter(|&e| e != 0).unwrap_or(current);
        let begin = self
            .begin_ms
            .unwrap_or_else(|| ((self.last_ts + 1) * 1000).max(end - DEFAULT_WINDOW_MS));
        (begin, end)
    }

    fn to_params(&self, now_ms: i64) -> Map<String, Value> {
        let (begin, end) = self.resolve_window(now_ms);

        let mut ids: Vec<&str> = Vec::with_capacity(self.device_ids.len());
        for id in &self.device_ids {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }

        let mut params = Map::new();
        params.insert("count".into(), self.count.into());
        params.insert("order_by".into(), self.order_by.into());
        params.insert("begin_time".into(), begin.into());
        params.insert("end_time".into(), end.into());
        params.insert("nonce".into(), now_ms.to_string().into());
        params.insert("device_id_list".into(), ids.into());
        params.insert("event_value_list".into(), self.event_values.clone().into());
        params.insert("event_tag_list".into(), self.event_tags.clone().into());
        params
    }
}

impl WyzeClient {
    /// List events for one or more cameras.
    ///
    /// `POST {cloud}/v4/device/get_event_list` (signed body)
    pub async fn list_events(&self, query: &EventQuery) -> Result<Vec<Event>, Error> {
        query.validate()?;

        let url = self.cloud_url("v4/device/get_event_list")?;
        let params = query.to_params(Utc::now().timestamp_millis());
        let data = self
            .execute_authenticated(&SignedCall::Cloud {
                url,
                params: &params,
            })
            .await?;

        let events = match data.get("event_list") {
            Some(Value::Array(list)) => list.iter().filter_map(Event::from_raw).collect(),
            _ => Vec::new(),
        };
        Ok(events)
    }

    /// Best-effort image URL from a camera's most recent event.
    ///
    /// Tries the default window, then the last 24 hours, then the full
    /// history, stopping at the first window that yields a URL. Any API
    /// failure resolves to `None`. Results (including `None`) are cached
    /// per camera for `ttl`.
    pub async fn resolve_latest_image(&self, mac: &str, ttl: Duration) -> Option<String> {
        if let Some(entry) = self.event_image_cache.get(mac) {
            let (cached_at, url) = entry.value();
            if cached_at.elapsed() < ttl {
                return url.clone();
            }
        }

        let url = match self.search_event_image(mac).await {
            Ok(url) => url,
            Err(e) => {
                debug!(mac, error = %e, "latest event image lookup failed");
                None
            }
        };

        self.event_image_cache
            .insert(mac.to_owned(), (Instant::now(), url.clone()));
        url
    }

    async fn search_event_image(&self, mac: &str) -> Result<Option<String>, Error> {
        let base = EventQuery::for_device(mac);

        let events = self.list_events(&base).await?;
        if let Some(url) = pick_event_image_url(&events) {
            return Ok(Some(url.to_owned()));
        }

        let end = (Utc::now().timestamp() + END_FUZZ_SECS) * 1000;
        for begin in [end - DAY_MS, 0] {
            let query = base.clone().window(Some(begin), Some(end));
            let events = self.list_events(&query).await?;
            if let Some(url) = pick_event_image_url(&events) {
                return Ok(Some(url.to_owned()));
            }
        }
        Ok(None)
    }

    /// Forget cached latest-event image URLs.
    pub fn clear_event_image_cache(&self) {
        self.event_image_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_and_order_are_validated() {
        assert!(EventQuery::for_device("A").validate().is_ok());
        assert!(EventQuery::for_device("A").count(0).validate().is_err());
        assert!(EventQuery::for_device("A").count(21).validate().is_err());
        let mut q = EventQuery::for_device("A");
        q.order_by = 3;
        assert!(matches!(q.validate(), Err(Error::Validation { .. })));
    }

    #[test]
    fn default_window_is_anchored_sixty_seconds_ahead() {
        let now_ms = 1_700_000_000_500;
        let (begin, end) = EventQuery::for_device("A").resolve_window(now_ms);
        assert_eq!(end, 1_700_000_060_000);
        assert_eq!(begin, end - 1_000_000);
    }

    #[test]
    fn last_ts_narrows_the_window() {
        let now_ms = 1_700_000_000_000;
        let mut q = EventQuery::for_device("A");
        q.last_ts = 1_699_999_999;
        let (begin, _) = q.resolve_window(now_ms);
        assert_eq!(begin, 1_700_000_000_000);
    }

    #[test]
    fn explicit_window_and_zero_end() {
        let (begin, end) = EventQuery::for_device("A")
            .window(Some(5), Some(0))
            .resolve_window(1_000_000_000);
        assert_eq!(begin, 5);
        assert_eq!(end, 1_000_060_000);
    }

    #[test]
    fn params_dedupe_device_ids() {
        let mut q = EventQuery::for_device("A");
        q.device_ids.extend(["B".to_owned(), "A".to_owned()]);
        let params = q.to_params(1_000);
        assert_eq!(params["device_id_list"], serde_json::json!(["A", "B"]));
        assert_eq!(params["nonce"], "1000");
        assert_eq!(params["count"], 20);
    }
}
