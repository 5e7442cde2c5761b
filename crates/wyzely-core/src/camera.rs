// ── Camera stills and stream URLs ──
//
// Thumbnails are short-lived signed URLs on a CDN that also wants
// browser-style headers. The fetcher walks a fallback chain (current
// thumbnail, a refreshed one, the newest event image), then serves the
// last good image or a placeholder so a snapshot is never empty.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;
use wyzely_api::transport::scale_user_agent;

use crate::coordinator::Coordinator;
use crate::error::CoreError;
use crate::model::Device;

const WEB_ORIGIN: &str = "https://my.wyze.com";
const WEB_REFERER: &str = "https://my.wyze.com/";
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// A fresh image is served again without refetching for this long.
pub const IMAGE_CACHE_TTL: Duration = Duration::from_secs(10);

/// Image bytes with their media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraImage {
    #[serde(skip)]
    pub bytes: Bytes,
    pub content_type: String,
}

// ── Magic bytes ──────────────────────────────────────────────────

/// Media type from the file signature (JPEG, PNG, GIF, WebP).
pub fn sniff_image_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP".as_slice()) {
        Some("image/webp")
    } else {
        None
    }
}

pub fn looks_like_image(data: &[u8]) -> bool {
    sniff_image_type(data).is_some()
}

fn guess_content_type(data: &[u8]) -> &'static str {
    sniff_image_type(data).unwrap_or("application/octet-stream")
}

// ── Placeholder ──────────────────────────────────────────────────

/// Image served when nothing else can be fetched.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderImage {
    image: Option<CameraImage>,
}

impl PlaceholderImage {
    /// Load the first candidate file that reads and looks like an image.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Self {
        for path in candidates {
            let path = path.as_ref();
            match std::fs::read(path) {
                Ok(data) if looks_like_image(&data) => {
                    let content_type = guess_content_type(&data).to_owned();
                    return Self {
                        image: Some(CameraImage {
                            bytes: Bytes::from(data),
                            content_type,
                        }),
                    };
                }
                Ok(_) => debug!(path = %path.display(), "placeholder is not an image"),
                Err(e) => debug!(path = %path.display(), error = %e, "failed reading placeholder"),
            }
        }
        Self::default()
    }

    pub fn image(&self) -> Option<&CameraImage> {
        self.image.as_ref()
    }
}

// ── Fetcher ──────────────────────────────────────────────────────

/// Why the fetch chain stopped early.
enum ChainError {
    Transport(reqwest::Error),
}

/// Fetches stills for the coordinator's cameras.
pub struct ImageFetcher {
    coordinator: Coordinator,
    placeholder: PlaceholderImage,
    last_images: DashMap<String, (Instant, CameraImage)>,
    last_errors: DashMap<String, String>,
}

impl ImageFetcher {
    /// Fetcher using the coordinator's configured placeholder, if any.
    pub fn new(coordinator: Coordinator) -> Self {
        let placeholder = coordinator
            .config()
            .placeholder_image
            .as_ref()
            .map(|p| PlaceholderImage::load(&[p]))
            .unwrap_or_default();
        Self {
            coordinator,
            placeholder,
            last_images: DashMap::new(),
            last_errors: DashMap::new(),
        }
    }

    pub fn with_placeholder(mut self, placeholder: PlaceholderImage) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Short code for the last failure on `mac` (`thumb_http_403`,
    /// `no_thumbnail_url`, ...). Cleared by a successful fetch.
    pub fn last_error(&self, mac: &str) -> Option<String> {
        self.last_errors.get(mac.trim()).map(|e| e.value().clone())
    }

    /// Best available still for `mac`.
    ///
    /// `None` only when nothing was ever fetched and no placeholder is
    /// configured.
    pub async fn image(&self, mac: &str) -> Result<Option<CameraImage>, CoreError> {
        let mac = mac.trim();
        if let Some(entry) = self.last_images.get(mac) {
            let (fetched_at, image) = entry.value();
            if fetched_at.elapsed() < IMAGE_CACHE_TTL {
                return Ok(Some(image.clone()));
            }
        }

        let Some(device) = self.coordinator.device(mac) else {
            self.set_error(mac, "device_not_found");
            return Err(CoreError::DeviceNotFound {
                identifier: mac.to_owned(),
            });
        };

        match self.fetch_chain(&device).await {
            Ok(Some(image)) => {
                let image = CameraImage {
                    content_type: guess_content_type(&image.bytes).to_owned(),
                    bytes: image.bytes,
                };
                self.last_images
                    .insert(mac.to_owned(), (Instant::now(), image.clone()));
                self.last_errors.remove(mac);
                return Ok(Some(image));
            }
            Ok(None) => {}
            Err(ChainError::Transport(e)) => {
                debug!(mac, error = %e, "thumbnail fetch failed");
                self.set_error(mac, &format!("thumb_error_{}", transport_kind(&e)));
            }
        }

        if let Some(entry) = self.last_images.get(mac) {
            return Ok(Some(entry.value().1.clone()));
        }
        Ok(self.placeholder.image().cloned())
    }

    async fn fetch_chain(&self, device: &Device) -> Result<Option<CameraImage>, ChainError> {
        let mac = device.mac.as_str();

        if let Some(url) = device.thumbnail_url.as_deref() {
            if let Some(image) = self.fetch(mac, url).await? {
                return Ok(Some(image));
            }

            // The signed URL may have expired; poll once and retry. A
            // failed poll (backoff included) leaves the old URL in place.
            self.coordinator.request_refresh().await;
            let fresh = self
                .coordinator
                .device(mac)
                .and_then(|d| d.thumbnail_url.clone())
                .unwrap_or_else(|| url.to_owned());
            if let Some(image) = self.fetch(mac, &fresh).await? {
                return Ok(Some(image));
            }
        }

        match self.coordinator.latest_event_image(mac).await {
            Some(url) => self.fetch(mac, &url).await,
            None => {
                debug!(mac, "no thumbnail URL and no recent event image");
                self.set_error(mac, "no_thumbnail_url");
                Ok(None)
            }
        }
    }

    /// One GET. Auth refusals and non-images are `Ok(None)` with the
    /// reason recorded; other HTTP failures are errors.
    async fn fetch(&self, mac: &str, url: &str) -> Result<Option<CameraImage>, ChainError> {
        let response = self
            .coordinator
            .client()
            .http()
            .get(url)
            .header(ORIGIN, WEB_ORIGIN)
            .header(REFERER, WEB_REFERER)
            .header(USER_AGENT, scale_user_agent())
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(ChainError::Transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.set_error(mac, &format!("thumb_http_{}", status.as_u16()));
            return Ok(None);
        }
        let response = response.error_for_status().map_err(ChainError::Transport)?;

        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await.map_err(ChainError::Transport)?;

        if bytes.is_empty() {
            self.set_error(mac, "thumb_empty_body");
            return Ok(None);
        }
        if !looks_like_image(&bytes) {
            debug!(
                mac,
                content_type = ?header_type,
                len = bytes.len(),
                "thumbnail body is not an image"
            );
            self.set_error(mac, "thumb_not_image");
            return Ok(None);
        }

        let content_type = header_type.unwrap_or_else(|| guess_content_type(&bytes).to_owned());
        Ok(Some(CameraImage {
            bytes,
            content_type,
        }))
    }

    fn set_error(&self, mac: &str, code: &str) {
        self.last_errors.insert(mac.to_owned(), code.to_owned());
    }
}

fn transport_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_status() {
        "status"
    } else if e.is_body() || e.is_decode() {
        "body"
    } else {
        "request"
    }
}

// ── Stream URL template ──────────────────────────────────────────

/// URL-safe slug: lowercase ASCII alphanumerics joined by `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if slug.is_empty() {
        "unknown".to_owned()
    } else {
        slug
    }
}

/// Fill a stream URL template for `device`.
///
/// Placeholders: `{mac}`, `{nickname}` (falls back to the MAC), `{name}`
/// (slug of the nickname), `{model}`, `{ip}`. `{{` and `}}` are literal
/// braces. An empty template, an unknown placeholder, or an unbalanced
/// brace yields `None`.
pub fn render_stream_url(template: &str, device: &Device) -> Option<String> {
    let template = template.trim();
    if template.is_empty() {
        return None;
    }

    let nickname = device.display_name();
    let ip = device
        .param("ip")
        .filter(|v| wyzely_api::models::is_truthy(v))
        .map(wyzely_api::models::value_to_plain_string)
        .unwrap_or_default();

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return None,
                    }
                }
                let value = match field.as_str() {
                    "mac" => device.mac.clone(),
                    "nickname" => nickname.to_owned(),
                    "name" => slugify(nickname),
                    "model" => device.model.clone(),
                    "ip" => ip.clone(),
                    _ => return None,
                };
                out.push_str(&value);
            }
            '}' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

impl Coordinator {
    /// Stream URL from the configured template, if one is set.
    pub fn stream_url(&self, mac: &str) -> Result<Option<String>, CoreError> {
        let device = self.require_device(mac)?;
        Ok(self
            .config()
            .stream_url_template
            .as_deref()
            .and_then(|t| render_stream_url(t, &device)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use serde_json::{Map, Value, json};

    use super::*;
    use crate::model::PropertySet;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn device(nickname: &str, params: Value) -> Device {
        let params: Map<String, Value> = params.as_object().cloned().unwrap_or_default();
        Device {
            mac: "2CAA8E000001".into(),
            nickname: nickname.into(),
            model: "HL_CAM4".into(),
            conn_state: 1,
            power_switch: 1,
            params,
            thumbnail_url: None,
            properties: PropertySet::new(),
            raw: json!({}),
        }
    }

    #[test]
    fn signatures_are_recognized() {
        assert_eq!(sniff_image_type(JPEG), Some("image/jpeg"));
        assert_eq!(sniff_image_type(b"\x89PNG\r\n\x1a\nrest"), Some("image/png"));
        assert_eq!(sniff_image_type(b"GIF89a..."), Some("image/gif"));
        assert_eq!(sniff_image_type(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image_type(b"RIFF\0\0\0\0WAVE"), None);
        assert_eq!(sniff_image_type(b"<html>"), None);
        assert_eq!(guess_content_type(b""), "application/octet-stream");
    }

    #[test]
    fn placeholder_skips_unreadable_and_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("placeholder.jpg");
        std::fs::File::create(&text)
            .unwrap()
            .write_all(b"not an image")
            .unwrap();
        let icon = dir.path().join("icon.png");
        std::fs::write(&icon, b"\x89PNG\r\n\x1a\n0000").unwrap();

        let missing = dir.path().join("missing.jpg");
        let placeholder = PlaceholderImage::load(&[missing, text, icon]);
        assert_eq!(placeholder.image().unwrap().content_type, "image/png");

        assert!(PlaceholderImage::load::<&Path>(&[]).image().is_none());
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Front Door!"), "front_door");
        assert_eq!(slugify("  Garage -- Cam 2 "), "garage_cam_2");
        assert_eq!(slugify("***"), "unknown");
    }

    #[test]
    fn template_placeholders() {
        let d = device("Front Door", json!({"ip": "192.168.1.20"}));
        assert_eq!(
            render_stream_url(
                " rtsp://{ip}:8554/{name}?mac={mac}&model={model}&n={nickname} ",
                &d
            )
            .as_deref(),
            Some("rtsp://192.168.1.20:8554/front_door?mac=2CAA8E000001&model=HL_CAM4&n=Front Door")
        );
    }

    #[test]
    fn template_defaults_and_failures() {
        let d = device("", json!({}));
        assert_eq!(
            render_stream_url("{nickname}/{ip}", &d).as_deref(),
            Some("2CAA8E000001/")
        );
        assert_eq!(render_stream_url("{{literal}}", &d).as_deref(), Some("{literal}"));
        assert_eq!(render_stream_url("   ", &d), None);
        assert_eq!(render_stream_url("{serial}", &d), None);
        assert_eq!(render_stream_url("{mac", &d), None);
        assert_eq!(render_stream_url("mac}", &d), None);
    }
}
