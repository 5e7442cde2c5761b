//! Control and raw write handlers.

use serde_json::Value;

use wyzely_core::control::Binding;
use wyzely_core::{ControlKey, Coordinator};

use crate::cli::{ControlArgs, GlobalOpts, SetFieldArgs, SetPropertyArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn set_control(
    coordinator: &Coordinator,
    args: ControlArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let key = ControlKey::parse(&args.control)?;
    let device = coordinator.require_device(&args.mac)?;

    // Property-backed controls are only visible once properties are loaded.
    let spec = key.spec();
    if matches!(spec.binding, Binding::Property { .. }) && device.properties.is_empty() {
        coordinator.fetch_properties(&device.mac).await?;
    }

    let on = args.state.is_on();
    coordinator.set_control(&device.mac, key, on).await?;

    let now = coordinator.control_state(&device.mac, key)?;
    let color = util::color(global);
    let mut line = format!(
        "{} {}: {}",
        device.display_name(),
        spec.name,
        output::on_off(now, color)
    );
    if now != on {
        line.push_str(" (camera has not confirmed yet)");
    }
    output::print_output(&line, global.quiet);
    Ok(())
}

pub async fn set_property(
    coordinator: &Coordinator,
    args: SetPropertyArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let pid = args.pid.trim().to_uppercase();
    if pid.is_empty() {
        return Err(CliError::Validation {
            field: "pid".into(),
            reason: "must not be empty".into(),
        });
    }
    let value = util::parse_value(&args.value);
    coordinator.set_property(&args.mac, &pid, value.clone()).await?;
    output::print_output(
        &format!("{} {pid} = {}", args.mac.trim(), util::plain(&value)),
        global.quiet,
    );
    Ok(())
}

pub async fn set_field(
    coordinator: &Coordinator,
    args: SetFieldArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let value: Value = util::parse_value(&args.value);
    coordinator
        .set_field(&args.mac, args.field.trim(), value.clone())
        .await?;
    output::print_output(
        &format!("{} {} = {}", args.mac.trim(), args.field.trim(), util::plain(&value)),
        global.quiet,
    );
    Ok(())
}
