//! Clap derive structures for the `huesync` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// huesync -- talk to a Philips Hue bridge from the command line
#[derive(Debug, Parser)]
#[command(
    name = "huesync",
    version,
    about = "Pair with a Hue bridge, inspect entertainment areas and drive lights",
    long_about = "A CLI for the Philips Hue bridge CLIP v2 API.\n\n\
        Handles pairing, entertainment area discovery, light/group/scene\n\
        control and the bridge's live event stream.",
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
    /// Bridge profile to use
    #[arg(long, short = 'p', env = "HUESYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Bridge address (overrides profile)
    #[arg(long, short = 'b', env = "HUESYNC_BRIDGE", global = true)]
    pub bridge: Option<String>,

    /// Application key (overrides profile and keyring)
    #[arg(long, env = "HUESYNC_APPLICATION_KEY", global = true, hide_env = true)]
    pub application_key: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HUESYNC_OUTPUT",
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

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "HUESYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register this machine with the bridge (press the link button first)
    Pair(PairArgs),

    /// List and inspect entertainment areas
    #[command(alias = "area", alias = "a")]
    Areas(AreasArgs),

    /// Dump every resource the bridge knows about
    #[command(alias = "res")]
    Resources,

    /// Change the state of a light
    #[command(alias = "l")]
    Light(StateArgs),

    /// Change the state of a room or zone (grouped light)
    #[command(alias = "g")]
    Group(StateArgs),

    /// Recall a scene
    Scene(SceneArgs),

    /// Follow the bridge's live event stream
    #[command(alias = "ev")]
    Events(EventsArgs),

    /// Inspect CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Pair ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PairArgs {
    /// Keep retrying for this many seconds while waiting for the link button
    #[arg(long, short = 'w', default_value = "30")]
    pub wait: u64,
}

// ── Areas ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AreasArgs {
    #[command(subcommand)]
    pub command: AreasCommand,
}

#[derive(Debug, Subcommand)]
pub enum AreasCommand {
    /// List entertainment areas
    #[command(alias = "ls")]
    List,

    /// Show one area and its channel layout
    Show {
        /// Area id or name (defaults to the profile's area)
        area: Option<String>,
    },
}

// ── Light / Group ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Resource id
    pub id: String,

    /// Switch on
    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    /// Switch off
    #[arg(long)]
    pub off: bool,

    /// Brightness in percent (0-100)
    #[arg(long, short = 'B', value_parser = clap::value_parser!(u8).range(0..=100))]
    pub brightness: Option<u8>,

    /// Raw JSON state merged over the flags
    #[arg(long)]
    pub json: Option<String>,

    /// Fire and forget: don't wait for the bridge's answer
    #[arg(long)]
    pub no_wait: bool,
}

// ── Scene ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SceneArgs {
    /// Scene id
    pub id: String,

    /// Recall mode
    #[arg(long, default_value = "active")]
    pub action: SceneAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SceneAction {
    Active,
    Static,
    DynamicPalette,
}

impl SceneAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Static => "static",
            Self::DynamicPalette => "dynamic_palette",
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EventsArgs {
    /// Exit after this many event records
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Reconnect attempts when the stream drops (overrides profile)
    #[arg(long)]
    pub retries: Option<u32>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration (secrets masked)
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from(["huesync", "areas", "list", "-b", "10.0.0.2", "-o", "json"])
            .unwrap();
        assert_eq!(cli.global.bridge.as_deref(), Some("10.0.0.2"));
        assert_eq!(cli.global.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Command::Areas(AreasArgs {
                command: AreasCommand::List
            })
        ));
    }

    #[test]
    fn on_and_off_conflict() {
        assert!(Cli::try_parse_from(["huesync", "light", "abc", "--on", "--off"]).is_err());
    }

    #[test]
    fn brightness_is_a_percentage() {
        assert!(Cli::try_parse_from(["huesync", "light", "abc", "-B", "101"]).is_err());
        let cli = Cli::try_parse_from(["huesync", "group", "abc", "-B", "40"]).unwrap();
        let Command::Group(args) = cli.command else {
            panic!("expected group command");
        };
        assert_eq!(args.brightness, Some(40));
    }

    #[test]
    fn scene_action_defaults_to_active() {
        let cli = Cli::try_parse_from(["huesync", "scene", "s1"]).unwrap();
        let Command::Scene(args) = cli.command else {
            panic!("expected scene command");
        };
        assert_eq!(args.action.as_str(), "active");
    }
}
