// ── Camera controls ──
//
// Every on/off control a camera exposes is one row of a static table:
// how to tell whether the camera has it, how to read it from a snapshot,
// how to write it, and how to confirm the write. The coordinator methods
// at the bottom drive a row against the cloud.

use serde::Serialize;
use serde_json::{Value, json};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, info};
use wyzely_api::models::{coerce_int, is_truthy};

use crate::coordinator::Coordinator;
use crate::error::CoreError;
use crate::model::Device;
use crate::verifier::{CommandVerifier, VerifierPolicy};

/// Property id of the power switch.
const POWER_PID: &str = "P3";
const POWER_FIELD: &str = "power_switch";

/// Night vision is written as 3 (on) or 2 (off); reads of 1 or 3 mean on.
const NIGHT_VISION_FIELD: &str = "night_vision";
const NIGHT_VISION_ON: i64 = 3;
const NIGHT_VISION_OFF: i64 = 2;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ControlKey {
    Power,
    EventRecording,
    MotionRecording,
    SoundRecording,
    Notifications,
    PowerSaving,
    Spotlight,
    EventsMaster,
    Accessory,
    AiNotifications,
    Dongle,
    NightVision,
}

/// Which payload a field control reads first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Raw,
    Params,
}

/// Where a control's value lives upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Power,
    Property { pid: &'static str },
    Field { key: &'static str, source: FieldSource },
    NightVision,
}

/// How a write is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Report the requested value until the device agrees, re-checking
    /// and finally re-issuing the write through the other path.
    Confirmed(VerifierPolicy),
    /// Cache the requested value, then read the property back.
    ReadBack,
    /// Trust the next poll.
    RefreshOnly,
}

impl Binding {
    pub fn verification(self) -> Verification {
        match self {
            Binding::Power => Verification::Confirmed(VerifierPolicy::default()),
            Binding::Property { .. } => Verification::ReadBack,
            Binding::Field { .. } | Binding::NightVision => Verification::RefreshOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSpec {
    pub key: ControlKey,
    pub name: &'static str,
    pub binding: Binding,
    /// Hosts may hide controls that are off by default.
    pub enabled_by_default: bool,
}

const fn field(
    key: ControlKey,
    name: &'static str,
    field: &'static str,
    source: FieldSource,
    enabled_by_default: bool,
) -> ControlSpec {
    ControlSpec {
        key,
        name,
        binding: Binding::Field { key: field, source },
        enabled_by_default,
    }
}

const fn property(key: ControlKey, name: &'static str, pid: &'static str) -> ControlSpec {
    ControlSpec {
        key,
        name,
        binding: Binding::Property { pid },
        enabled_by_default: true,
    }
}

const POWER: ControlSpec = ControlSpec {
    key: ControlKey::Power,
    name: "Power",
    binding: Binding::Power,
    enabled_by_default: true,
};
const EVENT_RECORDING: ControlSpec = property(ControlKey::EventRecording, "Event Recording", "P4");
const MOTION_RECORDING: ControlSpec =
    property(ControlKey::MotionRecording, "Record Motion Events", "P1047");
const SOUND_RECORDING: ControlSpec =
    property(ControlKey::SoundRecording, "Record Sound Events", "P1048");
const NOTIFICATIONS: ControlSpec = field(
    ControlKey::Notifications,
    "Notifications",
    "push_switch",
    FieldSource::Raw,
    true,
);
const POWER_SAVING: ControlSpec = field(
    ControlKey::PowerSaving,
    "Power Saving Mode",
    "power_saving_mode_switch",
    FieldSource::Params,
    true,
);
const SPOTLIGHT: ControlSpec = field(
    ControlKey::Spotlight,
    "Spotlight",
    "spotlight_status",
    FieldSource::Params,
    true,
);
const EVENTS_MASTER: ControlSpec = field(
    ControlKey::EventsMaster,
    "Events Master",
    "event_master_switch",
    FieldSource::Raw,
    false,
);
const ACCESSORY: ControlSpec = field(
    ControlKey::Accessory,
    "Accessory",
    "accessory_switch",
    FieldSource::Params,
    false,
);
const AI_NOTIFICATIONS: ControlSpec = field(
    ControlKey::AiNotifications,
    "AI Notifications",
    "ai_notification_v2",
    FieldSource::Params,
    false,
);
const DONGLE: ControlSpec = field(
    ControlKey::Dongle,
    "Dongle",
    "dongle_switch",
    FieldSource::Params,
    false,
);
const NIGHT_VISION: ControlSpec = ControlSpec {
    key: ControlKey::NightVision,
    name: "Night Vision",
    binding: Binding::NightVision,
    enabled_by_default: true,
};

/// Every control, in display order.
pub static CONTROLS: [&ControlSpec; 12] = [
    &POWER,
    &EVENT_RECORDING,
    &MOTION_RECORDING,
    &SOUND_RECORDING,
    &NOTIFICATIONS,
    &POWER_SAVING,
    &SPOTLIGHT,
    &EVENTS_MASTER,
    &ACCESSORY,
    &AI_NOTIFICATIONS,
    &DONGLE,
    &NIGHT_VISION,
];

impl ControlKey {
    pub fn spec(self) -> &'static ControlSpec {
        match self {
            Self::Power => &POWER,
            Self::EventRecording => &EVENT_RECORDING,
            Self::MotionRecording => &MOTION_RECORDING,
            Self::SoundRecording => &SOUND_RECORDING,
            Self::Notifications => &NOTIFICATIONS,
            Self::PowerSaving => &POWER_SAVING,
            Self::Spotlight => &SPOTLIGHT,
            Self::EventsMaster => &EVENTS_MASTER,
            Self::Accessory => &ACCESSORY,
            Self::AiNotifications => &AI_NOTIFICATIONS,
            Self::Dongle => &DONGLE,
            Self::NightVision => &NIGHT_VISION,
        }
    }

    /// Parse a user-supplied control name (`motion_recording`, `night-vision`).
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        name.trim()
            .replace('-', "_")
            .to_lowercase()
            .parse()
            .map_err(|_| CoreError::UnknownControl {
                name: name.to_owned(),
            })
    }
}

fn is_one(value: Option<&Value>) -> bool {
    value.and_then(coerce_int) == Some(1)
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

impl ControlSpec {
    /// Whether `device` exposes this control.
    pub fn is_available(&self, device: &Device) -> bool {
        match self.binding {
            Binding::Power => true,
            Binding::Property { pid } => device.properties.contains(pid),
            Binding::Field { key, .. } => {
                device.param(key).is_some() || device.raw_field(key).is_some()
            }
            Binding::NightVision => {
                device.param(NIGHT_VISION_FIELD).is_some()
                    || device.param("night_vision_status").is_some()
            }
        }
    }

    /// Current value in `device`, as the camera last reported it.
    pub fn read(&self, device: &Device) -> bool {
        match self.binding {
            Binding::Power => device.power_switch == 1,
            Binding::Property { pid } => is_one(device.properties.get(pid)),
            Binding::Field { key, source } => {
                let (first, second) = match source {
                    FieldSource::Raw => (device.raw_field(key), device.param(key)),
                    FieldSource::Params => (device.param(key), device.raw_field(key)),
                };
                is_one(non_null(first).or(second))
            }
            Binding::NightVision => {
                let value = [
                    device.param(NIGHT_VISION_FIELD),
                    device.param("night_vision_status"),
                    device.raw_field(NIGHT_VISION_FIELD),
                    device.raw_field("night_vision_status"),
                ]
                .into_iter()
                .flatten()
                .find(|v| is_truthy(v));
                matches!(value.and_then(coerce_int), Some(1 | 3))
            }
        }
    }
}

// ── Runtime ──────────────────────────────────────────────────────

/// One control's state on one camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlReading {
    pub key: ControlKey,
    pub name: &'static str,
    pub on: bool,
    /// A write is still waiting for the camera to agree.
    pub pending: bool,
    pub enabled_by_default: bool,
}

/// Which write a power command went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerPath {
    Property,
    Field,
}

impl Coordinator {
    /// Every control the camera exposes, with its reported value.
    pub fn controls(&self, mac: &str) -> Result<Vec<ControlReading>, CoreError> {
        let device = self.require_device(mac)?;
        Ok(CONTROLS
            .iter()
            .filter(|spec| spec.is_available(&device))
            .map(|spec| self.reading(&device, spec))
            .collect())
    }

    /// Reported value of one control, masked by any pending command.
    pub fn control_state(&self, mac: &str, key: ControlKey) -> Result<bool, CoreError> {
        let device = self.require_device(mac)?;
        let spec = key.spec();
        if !spec.is_available(&device) {
            return Err(unavailable(key, &device));
        }
        Ok(self.reading(&device, spec).on)
    }

    fn reading(&self, device: &Device, spec: &ControlSpec) -> ControlReading {
        let actual = spec.read(device);
        let (on, pending) = match self.verifiers().get_mut(&(device.mac.clone(), spec.key)) {
            Some(mut verifier) => {
                let on = verifier.observe(actual, std::time::Instant::now());
                (on, verifier.is_pending())
            }
            None => (actual, false),
        };
        ControlReading {
            key: spec.key,
            name: spec.name,
            on,
            pending,
            enabled_by_default: spec.enabled_by_default,
        }
    }

    /// Turn a control on or off and confirm it the way its row says.
    ///
    /// Write failures propagate; confirmation is best-effort.
    pub async fn set_control(&self, mac: &str, key: ControlKey, on: bool) -> Result<(), CoreError> {
        let device = self.require_device(mac)?;
        let spec = key.spec();
        if !spec.is_available(&device) {
            return Err(unavailable(key, &device));
        }
        info!(mac = %device.mac, control = %key, on, "setting control");

        match spec.binding {
            Binding::Power => self.write_power(&device, on).await,
            Binding::Property { pid } => self.write_property(&device, pid, on).await,
            Binding::Field { key: field, .. } => {
                self.client()
                    .set_field(&device.mac, field, json!(i64::from(on)))
                    .await?;
                self.request_refresh().await;
                Ok(())
            }
            Binding::NightVision => {
                let value = if on { NIGHT_VISION_ON } else { NIGHT_VISION_OFF };
                self.client()
                    .set_field(&device.mac, NIGHT_VISION_FIELD, json!(value))
                    .await?;
                self.request_refresh().await;
                Ok(())
            }
        }
    }

    async fn write_power(&self, device: &Device, on: bool) -> Result<(), CoreError> {
        let key = (device.mac.clone(), ControlKey::Power);
        let Verification::Confirmed(policy) = Binding::Power.verification() else {
            return Ok(());
        };
        self.verifiers()
            .entry(key.clone())
            .or_insert_with(|| CommandVerifier::new(policy))
            .begin(&device.mac, POWER_FIELD, on, std::time::Instant::now());

        let path = match self.issue_power(device, on).await {
            Ok(path) => path,
            Err(e) => {
                if let Some(mut verifier) = self.verifiers().get_mut(&key) {
                    verifier.cancel();
                }
                return Err(e);
            }
        };

        let settle = self.config().power_settle;
        for _ in 0..2 {
            tokio::time::sleep(settle).await;
            self.request_refresh().await;
            if self.device(&device.mac).is_some_and(|d| POWER.read(&d) == on) {
                return Ok(());
            }
        }

        let alternate = match path {
            PowerPath::Property => PowerPath::Field,
            PowerPath::Field if device.has_model() => PowerPath::Property,
            PowerPath::Field => PowerPath::Field,
        };
        debug!(mac = %device.mac, ?alternate, "power not confirmed, reissuing");
        if let Err(e) = self.issue_power_via(device, on, alternate).await {
            debug!(mac = %device.mac, error = %e, "power reissue failed");
        }
        tokio::time::sleep(settle).await;
        self.request_refresh().await;
        Ok(())
    }

    /// Property write when the model is known, falling back to the field.
    async fn issue_power(&self, device: &Device, on: bool) -> Result<PowerPath, CoreError> {
        if device.has_model() {
            match self.issue_power_via(device, on, PowerPath::Property).await {
                Ok(()) => return Ok(PowerPath::Property),
                Err(e) => {
                    debug!(
                        mac = %device.mac,
                        error = %e,
                        "power property write failed, trying field"
                    );
                }
            }
        }
        self.issue_power_via(device, on, PowerPath::Field).await?;
        Ok(PowerPath::Field)
    }

    async fn issue_power_via(
        &self,
        device: &Device,
        on: bool,
        path: PowerPath,
    ) -> Result<(), CoreError> {
        let value = json!(i64::from(on));
        match path {
            PowerPath::Property => {
                self.client()
                    .set_property(&device.mac, &device.model, POWER_PID, &value)
                    .await?;
            }
            PowerPath::Field => {
                self.client()
                    .set_field(&device.mac, POWER_FIELD, value)
                    .await?;
            }
        }
        Ok(())
    }

    async fn write_property(&self, device: &Device, pid: &str, on: bool) -> Result<(), CoreError> {
        if !device.has_model() {
            return Err(CoreError::MissingModel {
                mac: device.mac.clone(),
            });
        }
        let value = json!(i64::from(on));
        self.client()
            .set_property(&device.mac, &device.model, pid, &value)
            .await?;
        self.set_cached_property(&device.mac, pid, value);

        tokio::time::sleep(self.config().property_grace).await;
        match self
            .client()
            .get_extended_info(&device.mac, &device.model)
            .await
        {
            Ok(info) => {
                if let Some(actual) = info.property(pid) {
                    self.set_cached_property(&device.mac, pid, actual.clone());
                }
            }
            Err(e) => debug!(mac = %device.mac, pid, error = %e, "property read-back failed"),
        }

        self.request_refresh().await;
        Ok(())
    }
}

fn unavailable(key: ControlKey, device: &Device) -> CoreError {
    CoreError::ControlUnavailable {
        control: key.to_string(),
        mac: device.mac.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Map, json};
    use strum::IntoEnumIterator;

    use super::*;
    use crate::model::PropertySet;

    fn device(params: Value, raw: Value) -> Device {
        let params: Map<String, Value> = params.as_object().cloned().unwrap_or_default();
        Device {
            mac: "AA".into(),
            nickname: "Porch".into(),
            model: "HL_CAM4".into(),
            conn_state: 1,
            power_switch: 0,
            params,
            thumbnail_url: None,
            properties: PropertySet::new(),
            raw,
        }
    }

    #[test]
    fn table_covers_every_key_once() {
        for key in ControlKey::iter() {
            assert_eq!(key.spec().key, key);
        }
        assert_eq!(CONTROLS.len(), ControlKey::iter().count());
        let defaults_off: Vec<_> = CONTROLS
            .iter()
            .filter(|s| !s.enabled_by_default)
            .map(|s| s.key)
            .collect();
        assert_eq!(
            defaults_off,
            vec![
                ControlKey::EventsMaster,
                ControlKey::Accessory,
                ControlKey::AiNotifications,
                ControlKey::Dongle
            ]
        );
    }

    #[test]
    fn names_parse_leniently() {
        assert_eq!(ControlKey::parse("Night-Vision").unwrap(), ControlKey::NightVision);
        assert_eq!(ControlKey::parse("power").unwrap(), ControlKey::Power);
        assert!(matches!(
            ControlKey::parse("siren"),
            Err(CoreError::UnknownControl { .. })
        ));
        assert_eq!(ControlKey::AiNotifications.to_string(), "ai_notifications");
    }

    #[test]
    fn power_reads_the_switch() {
        let mut d = device(json!({}), json!({}));
        assert!(POWER.is_available(&d));
        assert!(!POWER.read(&d));
        d.power_switch = 1;
        assert!(POWER.read(&d));
    }

    #[test]
    fn property_controls_need_the_pid() {
        let mut d = device(json!({}), json!({}));
        assert!(!MOTION_RECORDING.is_available(&d));
        d.properties.set("P1047", json!("1"));
        assert!(MOTION_RECORDING.is_available(&d));
        assert!(MOTION_RECORDING.read(&d));
        d.properties.set("P1047", json!("0"));
        assert!(!MOTION_RECORDING.read(&d));
    }

    #[test]
    fn field_controls_prefer_their_source() {
        let d = device(json!({"push_switch": 0}), json!({"push_switch": 1}));
        assert!(NOTIFICATIONS.read(&d));

        let d = device(json!({"push_switch": 1}), json!({"push_switch": null}));
        assert!(NOTIFICATIONS.read(&d));

        let d = device(json!({"spotlight_status": "0"}), json!({"spotlight_status": 1}));
        assert!(SPOTLIGHT.is_available(&d));
        assert!(!SPOTLIGHT.read(&d));

        let d = device(json!({}), json!({"dongle_switch": 1}));
        assert!(DONGLE.is_available(&d));
        assert!(DONGLE.read(&d));

        assert!(!ACCESSORY.is_available(&device(json!({}), json!({}))));
    }

    #[test]
    fn night_vision_reads_modes() {
        let d = device(json!({"night_vision": 3}), json!({}));
        assert!(NIGHT_VISION.is_available(&d));
        assert!(NIGHT_VISION.read(&d));

        let d = device(json!({"night_vision": 0, "night_vision_status": 1}), json!({}));
        assert!(NIGHT_VISION.read(&d));

        let d = device(json!({"night_vision": 2}), json!({}));
        assert!(!NIGHT_VISION.read(&d));

        // Only params decide availability.
        assert!(!NIGHT_VISION.is_available(&device(json!({}), json!({"night_vision": 3}))));
    }

    #[test]
    fn verification_per_binding() {
        assert!(matches!(
            Binding::Power.verification(),
            Verification::Confirmed(_)
        ));
        assert_eq!(EVENT_RECORDING.binding.verification(), Verification::ReadBack);
        assert_eq!(NOTIFICATIONS.binding.verification(), Verification::RefreshOnly);
    }
}
