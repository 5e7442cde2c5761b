//! Command dispatch: bridges CLI args -> coordinator calls -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod events;
pub mod util;
pub mod watch;

use wyzely_core::Coordinator;

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Dispatch an account-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    coordinator: &Coordinator,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices(_) => devices::list(coordinator, global),
        Command::Device(args) => devices::show(coordinator, args, global).await,
        Command::Events(args) => events::list(coordinator, args, global).await,
        Command::ImageUrl(args) => events::image_url(coordinator, &args.mac, global).await,
        Command::Snapshot(args) => events::snapshot(coordinator, args, global).await,
        Command::Control(args) => control::set_control(coordinator, args, global).await,
        Command::SetProperty(args) => control::set_property(coordinator, args, global).await,
        Command::SetField(args) => control::set_field(coordinator, args, global).await,
        Command::Login | Command::Watch(_) | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Validation {
                field: "command".into(),
                reason: "not an account-bound one-shot command".into(),
            })
        }
    }
}

/// Whether the first poll should sweep every camera's extended properties.
pub fn wants_property_sweep(cmd: &Command) -> bool {
    matches!(cmd, Command::Devices(args) if args.properties)
}

/// Fresh password login; the new tokens are stored after the first poll.
pub async fn login(global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let mut cfg = resolved.config;
    cfg.poll_interval = std::time::Duration::ZERO;
    cfg.sweep_properties = false;

    let coordinator = Coordinator::new(cfg, resolved.sink)?;
    coordinator.login().await?;
    let result = coordinator.refresh().await;
    coordinator.disconnect().await;
    result?;

    let stored = if global.no_keyring {
        "tokens not stored"
    } else {
        "tokens stored in the system keyring"
    };
    output::print_output(
        &format!(
            "Logged in as {} (profile '{}'): {} cameras, {stored}",
            coordinator.config().account.email,
            resolved.profile_name,
            coordinator.store().device_count(),
        ),
        global.quiet,
    );
    Ok(())
}
