//! Clap derive structures for the `chime` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// chime -- alarm calendar resource manager
#[derive(Debug, Parser)]
#[command(
    name = "chime",
    version,
    about = "Manage alarm calendars and their resources from the command line",
    long_about = "Keeps alarm calendars consistent across storage resources.\n\n\
        Every run loads the backend state file, makes sure each alarm type has\n\
        a resource, applies the requested change and saves the state again.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "CHIME_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Backend state file (overrides the config)
    #[arg(long, env = "CHIME_STATE", global = true)]
    pub state: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CHIME_OUTPUT",
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

/// Alarm types as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    Active,
    Archived,
    Template,
}

impl From<CategoryArg> for chime_core::AlarmCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Active => Self::Active,
            CategoryArg::Archived => Self::Archived,
            CategoryArg::Template => Self::Template,
        }
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create missing default resources and migrate legacy calendars
    Bootstrap,

    /// Manage calendar resources
    #[command(alias = "res", alias = "r")]
    Resources(ResourcesArgs),

    /// Manage alarms
    #[command(alias = "a")]
    Alarms(AlarmsArgs),

    /// Show the next alarm due
    Next(NextArgs),

    /// Inspect the configuration
    Config(ConfigArgs),
}

// ── Resources ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ResourcesArgs {
    #[command(subcommand)]
    pub command: ResourcesCommand,
}

#[derive(Debug, Subcommand)]
pub enum ResourcesCommand {
    /// List resources
    #[command(alias = "ls")]
    List {
        /// Only resources able to hold this alarm type
        #[arg(long, short = 't', value_enum)]
        category: Option<CategoryArg>,
    },

    /// Enable an alarm type on a resource
    Enable {
        #[arg(value_name = "RESOURCE")]
        resource: String,
        #[arg(value_enum)]
        category: CategoryArg,
    },

    /// Disable an alarm type on a resource
    Disable {
        #[arg(value_name = "RESOURCE")]
        resource: String,
        #[arg(value_enum)]
        category: CategoryArg,
    },

    /// Make a resource the standard one for the given alarm types
    Standard {
        #[arg(value_name = "RESOURCE")]
        resource: String,
        /// Alarm types; none clears every standard flag
        #[arg(value_enum)]
        categories: Vec<CategoryArg>,
    },

    /// Set or clear a resource's background colour
    Colour {
        #[arg(value_name = "RESOURCE")]
        resource: String,
        /// Colour as #rrggbb; omit to clear
        #[arg(value_name = "COLOUR")]
        colour: Option<String>,
    },

    /// Reload a resource's alarms from storage
    Sync {
        #[arg(value_name = "RESOURCE")]
        resource: String,
    },

    /// Remove a resource and all its alarms
    #[command(alias = "rm")]
    Remove {
        #[arg(value_name = "RESOURCE")]
        resource: String,
    },
}

// ── Alarms ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AlarmsArgs {
    #[command(subcommand)]
    pub command: AlarmsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlarmsCommand {
    /// List alarms
    #[command(alias = "ls")]
    List {
        /// Only alarms held by this resource
        #[arg(long, short = 'r')]
        resource: Option<String>,
        /// Only alarms of this type
        #[arg(long, short = 't', value_enum)]
        category: Option<CategoryArg>,
    },

    /// Add an alarm
    Add {
        /// Text shown when the alarm fires
        #[arg(long, short = 'm')]
        summary: String,
        /// Trigger time (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Alarm type
        #[arg(long, short = 't', value_enum, default_value = "active")]
        category: CategoryArg,
        /// Target resource; defaults to the standard one for the type
        #[arg(long, short = 'r')]
        resource: Option<String>,
        /// Trigger on the date only, ignoring the time
        #[arg(long)]
        date_only: bool,
        /// Create the alarm disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Delete an alarm
    #[command(alias = "rm")]
    Delete {
        /// Alarm ID
        #[arg(value_name = "ID")]
        id: String,
        /// Resource holding the alarm, when the ID is not unique
        #[arg(long, short = 'r')]
        resource: Option<String>,
    },
}

// ── Next ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct NextArgs {
    /// Only consider this resource
    #[arg(long, short = 'r')]
    pub resource: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
}
