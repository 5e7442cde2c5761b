//! Long-running watch: keep polling and print what changes.

use std::time::Duration;

use chrono::Local;

use wyzely_core::config::DEFAULT_POLL_INTERVAL;
use wyzely_core::{Coordinator, Device, SnapshotChange, SyncState};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

fn stamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

fn emit(line: &str, global: &GlobalOpts) {
    if !global.quiet {
        println!("[{}] {line}", stamp());
    }
}

/// Whether a change is worth a line: connectivity, power, or name.
fn noteworthy(before: &Device, after: &Device) -> bool {
    before.is_online() != after.is_online()
        || before.power_switch != after.power_switch
        || before.display_name() != after.display_name()
}

fn print_camera(device: &Device, global: &GlobalOpts, color: bool) {
    if matches!(global.output, OutputFormat::Json | OutputFormat::JsonCompact) {
        // One object per line so the output can be piped.
        if !global.quiet {
            let line = serde_json::json!({
                "mac": device.mac,
                "name": device.display_name(),
                "online": device.is_online(),
                "power": device.power_switch == 1,
            });
            println!("{line}");
        }
        return;
    }
    emit(
        &format!(
            "{} {} {} power {}",
            device.mac,
            device.display_name(),
            output::connection(device.is_online(), color),
            output::on_off(device.power_switch == 1, color)
        ),
        global,
    );
}

fn report_change(change: &SnapshotChange, global: &GlobalOpts, color: bool) {
    for device in &change.added {
        print_camera(device, global, color);
    }
    for (before, after) in &change.updated {
        if noteworthy(before, after) {
            print_camera(after, global, color);
        }
    }
    for mac in &change.removed {
        emit(&format!("{mac} removed"), global);
    }
}

fn report_state(state: &SyncState, global: &GlobalOpts) {
    match state {
        SyncState::RateLimited { resume_at } => emit(
            &format!(
                "rate limited, polling resumes at {}",
                resume_at.with_timezone(&Local).format("%H:%M:%S")
            ),
            global,
        ),
        SyncState::Failed { message } => emit(&format!("poll failed: {message}"), global),
        SyncState::Connected | SyncState::Connecting | SyncState::Disconnected => {}
    }
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let mut cfg = resolved.config;
    if let Some(secs) = args.interval {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "interval".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        cfg.poll_interval = Duration::from_secs(secs);
    }
    if cfg.poll_interval.is_zero() {
        cfg.poll_interval = DEFAULT_POLL_INTERVAL;
    }
    let interval = cfg.poll_interval;

    let coordinator = Coordinator::new(cfg, resolved.sink)?;
    coordinator.connect().await?;

    let color = util::color(global);
    let mut devices = coordinator.devices();
    let mut state = coordinator.sync_state();
    for device in devices.current().iter() {
        print_camera(device, global, color);
    }
    tracing::info!(
        profile = %resolved.profile_name,
        interval_secs = interval.as_secs(),
        "watching cameras, Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            change = devices.next_change() => {
                let Some(change) = change else { break };
                report_change(&change, global, color);
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                report_state(&current, global);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    coordinator.disconnect().await;
    Ok(())
}
