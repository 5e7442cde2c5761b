// Device endpoints
//
// Device list, extended info, and the two write paths (per-field
// `set_device_Info` and typed `set_property`). The device list also
// refreshes the client's mac → camera index used for URL lookups.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{EnvelopeKind, SignedCall, WyzeClient};
use crate::error::Error;
use crate::models::{CameraDevice, ExtendedInfo, is_truthy, value_to_plain_string};

impl WyzeClient {
    /// List cameras on the account.
    ///
    /// `POST {app}/v2/home_page/get_object_list`
    ///
    /// Non-camera products and items without a MAC or model are skipped.
    pub async fn list_devices(&self) -> Result<Vec<CameraDevice>, Error> {
        let url = self.app_url("v2/home_page/get_object_list")?;
        let params = Map::new();
        let data = self
            .execute_authenticated(&SignedCall::App {
                kind: EnvelopeKind::Default,
                url,
                params: &params,
            })
            .await?;

        // Older app versions answer under `device_info_list`.
        let list = ["device_list", "device_info_list"]
            .iter()
            .filter_map(|key| data.get(*key))
            .find(|v| is_truthy(v))
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        let Value::Array(items) = list else {
            return Err(Error::UnexpectedPayload {
                message: "device_list is not a list".into(),
            });
        };

        let cameras: Vec<CameraDevice> = items.iter().filter_map(CameraDevice::from_raw).collect();
        debug!(total = items.len(), cameras = cameras.len(), "device list fetched");

        let index: HashMap<String, CameraDevice> = cameras
            .iter()
            .map(|c| (c.mac.clone(), c.clone()))
            .collect();
        self.devices_by_mac.store(Arc::new(index));

        Ok(cameras)
    }

    /// Camera from the last device-list fetch, if known.
    pub fn cached_device(&self, mac: &str) -> Option<CameraDevice> {
        self.devices_by_mac.load().get(mac).cloned()
    }

    /// Fetch the extended payload for one device, including its property list.
    ///
    /// `POST {app}/v2/device/get_device_Info`
    pub async fn get_extended_info(&self, mac: &str, model: &str) -> Result<ExtendedInfo, Error> {
        let url = self.app_url("v2/device/get_device_Info")?;
        let mut params = Map::new();
        params.insert("device_mac".into(), mac.into());
        params.insert("device_model".into(), model.into());

        debug!(mac, model, "fetching extended device info");
        let data = self
            .execute_authenticated(&SignedCall::App {
                kind: EnvelopeKind::GetDeviceInfo,
                url,
                params: &params,
            })
            .await?;
        Ok(ExtendedInfo::from_value(data))
    }

    /// Write one device field. Which fields a device honors depends on
    /// its model and firmware.
    ///
    /// `POST {app}/device/set_device_Info`
    pub async fn set_field(&self, mac: &str, field: &str, value: Value) -> Result<Value, Error> {
        if field.trim().is_empty() {
            return Err(Error::Validation {
                message: "field name must not be empty".into(),
            });
        }
        let url = self.app_url("device/set_device_Info")?;
        let mut params = Map::new();
        params.insert("device_mac".into(), mac.into());
        params.insert(field.to_owned(), value);

        debug!(mac, field, "setting device field");
        self.execute_authenticated(&SignedCall::App {
            kind: EnvelopeKind::SetDeviceInfo,
            url,
            params: &params,
        })
        .await
    }

    /// Write one typed property. The pid is uppercased and the value sent
    /// as a string.
    ///
    /// `POST {app}/v2/device/set_property`
    pub async fn set_property(
        &self,
        mac: &str,
        model: &str,
        pid: &str,
        value: &Value,
    ) -> Result<Value, Error> {
        let pid = pid.trim().to_uppercase();
        if pid.is_empty() {
            return Err(Error::Validation {
                message: "property id must not be empty".into(),
            });
        }
        let url = self.app_url("v2/device/set_property")?;
        let mut params = Map::new();
        params.insert("device_mac".into(), mac.into());
        params.insert("device_model".into(), model.into());
        params.insert("pid".into(), Value::String(pid.clone()));
        params.insert("pvalue".into(), Value::String(value_to_plain_string(value)));

        debug!(mac, model, pid, "setting device property");
        self.execute_authenticated(&SignedCall::App {
            kind: EnvelopeKind::Default,
            url,
            params: &params,
        })
        .await
    }

    /// Latest thumbnail URL for a camera.
    ///
    /// Uses the device index, fetching the device list once when the MAC is
    /// not in it yet.
    pub async fn image_url(&self, mac: &str) -> Result<Option<String>, Error> {
        let device = match self.cached_device(mac) {
            Some(d) => Some(d),
            None => self.list_devices().await?.into_iter().find(|d| d.mac == mac),
        };
        Ok(device.and_then(|d| d.best_thumbnail_url().map(str::to_owned)))
    }
}
