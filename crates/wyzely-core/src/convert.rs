// ── API-to-domain type conversions ──
//
// Bridges `wyzely_api` response types into `wyzely_core::model`.
// Extended properties are filled later from the property cache.

use wyzely_api::CameraDevice;

use crate::model::{Device, PropertySet};

impl From<CameraDevice> for Device {
    fn from(cam: CameraDevice) -> Self {
        let thumbnail_url = cam.best_thumbnail_url().map(str::to_owned);
        Device {
            mac: cam.mac,
            nickname: cam.nickname,
            model: cam.product_model,
            conn_state: cam.conn_state,
            power_switch: cam.power_switch,
            params: cam.device_params,
            thumbnail_url,
            properties: PropertySet::new(),
            raw: cam.raw,
        }
    }
}
