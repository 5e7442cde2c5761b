mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wyzely_core::Coordinator;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need an account
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "wyzely", &mut std::io::stdout());
            Ok(())
        }

        Command::Login => commands::login(&cli.global).await,

        Command::Watch(args) => commands::watch::handle(args, &cli.global).await,

        // Everything else is one poll, one action
        cmd => {
            let resolved = config::resolve(&cli.global)?;
            let mut cfg = resolved.config;
            cfg.sweep_properties = commands::wants_property_sweep(&cmd);

            tracing::debug!(
                command = ?cmd,
                profile = %resolved.profile_name,
                "dispatching command"
            );
            let global = &cli.global;
            Coordinator::oneshot(cfg, resolved.sink, |coordinator| async move {
                Ok(commands::dispatch(cmd, &coordinator, global).await)
            })
            .await?
        }
    }
}
