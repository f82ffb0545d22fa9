//! Clap derive structures for the `tankless` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tankless -- control a tankless water heater from the command line
#[derive(Debug, Parser)]
#[command(
    name = "tankless",
    version,
    about = "Monitor and control tankless water heaters from the command line",
    long_about = "Reads and controls a tankless water heater through its cloud account,\n\
        its local control port, or both (hybrid: local first, cloud as fallback).",
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
    /// Heater profile to use
    #[arg(long, short = 'p', env = "TANKLESS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Connection mode (overrides profile)
    #[arg(long, short = 'm', env = "TANKLESS_MODE", global = true)]
    pub mode: Option<ModeArg>,

    /// Local control port, host or host:port (overrides profile)
    #[arg(long, env = "TANKLESS_HOST", global = true)]
    pub host: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TANKLESS_OUTPUT",
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

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Cloud,
    Local,
    Hybrid,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    /// One JSON object per line
    Json,
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
    /// Show current readings
    #[command(alias = "st")]
    Status(DeviceArg),

    /// Keep polling and print every change until interrupted
    Watch(WatchArgs),

    /// List discovered heaters
    #[command(alias = "ls")]
    Devices,

    /// Set the domestic hot water temperature (°F)
    SetTemp(SetTempArgs),

    /// Turn the heater on or off
    Power(SwitchArgs),

    /// Start or stop recirculation
    #[command(alias = "recirculation")]
    Recirc(RecircArgs),

    /// Turn vacation (holiday) mode on or off
    Vacation(SwitchArgs),

    /// Ask the heater to refresh its maintenance counters
    Maintenance(DeviceArg),

    /// Show connection health per heater (tokens are never printed)
    #[command(alias = "diag")]
    Diagnostics,

    /// Log in to the cloud account and store the session tokens
    Login(LoginArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DeviceArg {
    /// Heater id, serial or name (optional with a single heater)
    #[arg(long, short = 'd')]
    pub device: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub target: DeviceArg,

    /// Poll interval, e.g. "30s" (overrides profile)
    #[arg(long, short = 'i', value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct SetTempArgs {
    /// Target temperature in °F (110-140)
    pub fahrenheit: u16,

    #[command(flatten)]
    pub target: DeviceArg,
}

#[derive(Debug, Args)]
pub struct SwitchArgs {
    pub state: Switch,

    #[command(flatten)]
    pub target: DeviceArg,
}

#[derive(Debug, Args)]
pub struct RecircArgs {
    pub state: Switch,

    /// Run time in minutes (5-300; defaults to the profile setting)
    #[arg(long)]
    pub minutes: Option<u16>,

    #[command(flatten)]
    pub target: DeviceArg,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Cloud account e-mail (defaults to the profile's username)
    #[arg(long, short = 'u', env = "TANKLESS_USERNAME")]
    pub username: Option<String>,

    /// Also save the password in the system keyring
    #[arg(long)]
    pub save_password: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the active profile (secrets redacted)
    Show,
    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
