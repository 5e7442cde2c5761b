//! Clap derive structures for the `wyzely` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// wyzely -- Wyze cameras from the command line
#[derive(Debug, Parser)]
#[command(
    name = "wyzely",
    version,
    about = "Inspect and control Wyze cameras from the command line",
    long_about = "Talks to the Wyze cloud API: lists cameras, reads their properties \
        and sensors, flips controls (power, recording, notifications, night vision), \
        fetches snapshots and event history.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "WYZELY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Account email (overrides profile)
    #[arg(long, env = "WYZELY_EMAIL", global = true)]
    pub email: Option<String>,

    /// Developer API key id (overrides profile)
    #[arg(long, env = "WYZELY_KEY_ID", global = true)]
    pub key_id: Option<String>,

    /// Developer API key (overrides profile)
    #[arg(long, env = "WYZELY_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Account password (overrides profile)
    #[arg(long, env = "WYZELY_PASSWORD", global = true, hide_env = true)]
    pub password: Option<String>,

    /// Single base URL for every API surface
    #[arg(long, env = "WYZELY_ENDPOINT", global = true, hide = true)]
    pub endpoint: Option<String>,

    /// Neither restore nor store session tokens in the system keyring
    #[arg(long, env = "WYZELY_NO_KEYRING", global = true)]
    pub no_keyring: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "WYZELY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds
    #[arg(long, env = "WYZELY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in with the account password and store fresh tokens
    Login,

    /// List cameras
    #[command(alias = "ls")]
    Devices(DevicesArgs),

    /// Show one camera: readings, controls, and properties
    #[command(alias = "dev")]
    Device(DeviceArgs),

    /// List recent events for a camera
    Events(EventsArgs),

    /// Print a camera's current thumbnail URL
    ImageUrl(MacArg),

    /// Save a camera still to a file
    Snapshot(SnapshotArgs),

    /// Turn a camera control on or off
    #[command(alias = "ctl")]
    Control(ControlArgs),

    /// Write a raw device property (PID)
    SetProperty(SetPropertyArgs),

    /// Write a raw device-info field
    SetField(SetFieldArgs),

    /// Poll continuously and print camera changes
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Also fetch extended properties (one request per camera)
    #[arg(long)]
    pub properties: bool,
}

#[derive(Debug, Args)]
pub struct MacArg {
    /// Camera MAC
    pub mac: String,
}

#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Camera MAC
    pub mac: String,

    /// Also fetch extended properties
    #[arg(long)]
    pub properties: bool,
}

#[derive(Debug, Args)]
pub struct EventsArgs {
    /// Camera MAC
    pub mac: String,

    /// Events to return (1-20)
    #[arg(
        long,
        short = 'n',
        default_value = "20",
        value_parser = clap::value_parser!(u8).range(1..=20)
    )]
    pub count: u8,

    /// Only events from the last N minutes
    #[arg(long, short = 'w')]
    pub window: Option<u32>,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Camera MAC
    pub mac: String,

    /// Output file
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Image written when the camera has none to offer
    #[arg(long)]
    pub placeholder: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ControlArgs {
    /// Camera MAC
    pub mac: String,

    /// Control name (power, motion-recording, night-vision, ...)
    pub control: String,

    /// Desired state
    pub state: Switch,
}

#[derive(Debug, Args)]
pub struct SetPropertyArgs {
    /// Camera MAC
    pub mac: String,

    /// Property id, e.g. P1047
    pub pid: String,

    /// Value to write
    pub value: String,
}

#[derive(Debug, Args)]
pub struct SetFieldArgs {
    /// Camera MAC
    pub mac: String,

    /// Device-info field name
    pub field: String,

    /// Value to write (parsed as JSON when possible)
    pub value: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Device-list poll interval in seconds
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration (secrets masked)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
