//! Camera list and detail handlers.

use std::fmt::Write as _;

use chrono::Utc;
use serde::Serialize;
use tabled::Tabled;

use wyzely_core::{ControlReading, Coordinator, Device, PropertySet, Readings};

use crate::cli::{DeviceArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Views ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CameraSummary {
    mac: String,
    name: String,
    model: String,
    power: bool,
    readings: Readings,
    properties: PropertySet,
}

impl CameraSummary {
    fn new(device: &Device) -> Self {
        Self {
            mac: device.mac.clone(),
            name: device.display_name().to_owned(),
            model: device.model.clone(),
            power: device.power_switch == 1,
            readings: Readings::from_device(device, Utc::now()),
            properties: device.properties.clone(),
        }
    }
}

#[derive(Serialize)]
struct CameraDetail {
    #[serde(flatten)]
    summary: CameraSummary,
    thumbnail_url: Option<String>,
    stream_url: Option<String>,
    controls: Vec<ControlReading>,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct CameraRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Battery")]
    battery: String,
    #[tabled(rename = "Signal")]
    rssi: String,
    #[tabled(rename = "Props")]
    props: usize,
}

fn row(c: &CameraSummary, color: bool) -> CameraRow {
    CameraRow {
        mac: c.mac.clone(),
        name: c.name.clone(),
        model: c.model.clone(),
        state: output::connection(c.readings.connection == "online", color),
        power: output::on_off(c.power, color),
        battery: c.readings.battery.map(|b| format!("{b}%")).unwrap_or_default(),
        rssi: c.readings.rssi.map(|r| format!("{r} dBm")).unwrap_or_default(),
        props: c.readings.property_count,
    }
}

fn detail(d: &CameraDetail, color: bool) -> String {
    let s = &d.summary;
    let r = &s.readings;
    let mut out = [
        format!("MAC:        {}", s.mac),
        format!("Name:       {}", s.name),
        format!("Model:      {}", s.model),
        format!("State:      {}", output::connection(r.connection == "online", color)),
        format!("Firmware:   {}", util::or_dash(r.firmware.as_deref())),
        format!("Hardware:   {}", util::or_dash(r.hardware.as_deref())),
        format!("IP:         {}", util::or_dash(r.ip.as_deref())),
        format!("Public IP:  {}", util::or_dash(r.public_ip.as_deref())),
        format!("SSID:       {}", util::or_dash(r.ssid.as_deref())),
        format!("Signal:     {}", util::or_dash(r.rssi.map(|v| format!("{v} dBm")))),
        format!("Battery:    {}", util::or_dash(r.battery.map(|v| format!("{v}%")))),
        format!("Motion:     {}", if r.motion { "detected" } else { "-" }),
        format!("Thumbnail:  {}", util::or_dash(r.last_thumbnail.map(|t| t.to_rfc3339()))),
    ]
    .join("\n");

    if let Some(t) = r.temperature {
        let _ = write!(out, "\nTemp:       {t:.1}");
    }
    if let Some(h) = r.humidity {
        let _ = write!(out, "\nHumidity:   {h:.0}%");
    }
    if let Some(ref url) = d.stream_url {
        let _ = write!(out, "\nStream:     {url}");
    }

    if !d.controls.is_empty() {
        out.push_str("\n\nControls:");
        for c in &d.controls {
            let pending = if c.pending { " (pending)" } else { "" };
            let _ = write!(
                out,
                "\n  {:<18} {}{pending}",
                c.key.as_ref().replace('_', "-"),
                output::on_off(c.on, color)
            );
        }
    }

    if !s.properties.is_empty() {
        out.push_str("\n\nProperties:");
        for pid in s.properties.sorted_pids() {
            let value = s
                .properties
                .get(&pid)
                .map(util::plain)
                .unwrap_or_default();
            let _ = write!(out, "\n  {pid:<8} {value}");
        }
    }
    out
}

// ── Handlers ────────────────────────────────────────────────────────

pub fn list(coordinator: &Coordinator, global: &GlobalOpts) -> Result<(), CliError> {
    let snapshot = coordinator.devices_snapshot();
    let cameras: Vec<CameraSummary> = snapshot.iter().map(|d| CameraSummary::new(d)).collect();
    let color = util::color(global);

    let out = output::render_list(
        &global.output,
        &cameras,
        |c| row(c, color),
        |c| c.mac.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn show(
    coordinator: &Coordinator,
    args: DeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.properties {
        coordinator.fetch_properties(&args.mac).await?;
    }
    let device = coordinator.require_device(&args.mac)?;

    let view = CameraDetail {
        summary: CameraSummary::new(&device),
        thumbnail_url: device.thumbnail_url.clone(),
        stream_url: coordinator.stream_url(&device.mac)?,
        controls: coordinator.controls(&device.mac)?,
    };
    let color = util::color(global);

    let out = output::render_single(
        &global.output,
        &view,
        |d| detail(d, color),
        |d| d.summary.mac.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
