//! CLI argument definitions for Ticketwatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{ConfigOverrides, OutputFormat};
use crate::notify::NotificationPermission;
use crate::transport::StreamProtocol;

/// Ticketwatch - live support-ticket dashboard.
///
/// Start with `tw tickets` to see the current tickets, or `tw watch` to follow
/// creations and updates as they happen.
#[derive(Parser, Debug)]
#[command(name = "tw")]
#[command(author, version, about = "Live support-ticket dashboard", long_about = None)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TW_GIT_COMMIT"),
    ", built ",
    env!("TW_BUILD_TIMESTAMP"),
    ")"
))]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Log filter (e.g. "info", "ticketwatch=debug"). Can also be set via TW_LOG.
    #[arg(long = "log-level", global = true, env = "TW_LOG", default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,

    /// Read and write config.kdl in <DIR> instead of the default location
    #[arg(long = "config-dir", global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Endpoint flags shared by every command that talks to the backend.
///
/// These override the environment and config.kdl.
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// Base URL of the ticket REST API
    #[arg(long = "api-base", global = true)]
    pub api_base: Option<String>,

    /// WebSocket URL of the event stream
    #[arg(long = "stream-url", global = true)]
    pub stream_url: Option<String>,

    /// Framing spoken on the event stream
    #[arg(long = "protocol", global = true, value_enum)]
    pub protocol: Option<ProtocolArg>,

    /// STOMP destination to subscribe to
    #[arg(long = "topic", global = true)]
    pub topic: Option<String>,

    /// Desktop notification permission
    #[arg(long = "notifications", global = true, value_enum)]
    pub notifications: Option<PermissionArg>,

    /// How long NEW/UPDATED badges stay visible, in milliseconds
    #[arg(long = "badge-expiry-ms", global = true)]
    pub badge_expiry_ms: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolArg {
    Stomp,
    Json,
}

impl From<ProtocolArg> for StreamProtocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Stomp => StreamProtocol::Stomp,
            ProtocolArg::Json => StreamProtocol::Json,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionArg {
    Default,
    Granted,
    Denied,
}

impl From<PermissionArg> for NotificationPermission {
    fn from(arg: PermissionArg) -> Self {
        match arg {
            PermissionArg::Default => NotificationPermission::Default,
            PermissionArg::Granted => NotificationPermission::Granted,
            PermissionArg::Denied => NotificationPermission::Denied,
        }
    }
}

impl Cli {
    /// CLI-level overrides for config resolution.
    pub fn overrides(&self) -> ConfigOverrides {
        let args = &self.connection;
        ConfigOverrides {
            api_base: args.api_base.clone(),
            stream_url: args.stream_url.clone(),
            stream_protocol: args.protocol.map(Into::into),
            topic: args.topic.clone(),
            notifications: args.notifications.map(Into::into),
            badge_expiry_ms: args.badge_expiry_ms,
            output_format: self.human_readable.then_some(OutputFormat::Human),
        }
    }
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the current tickets once and print them
    Tickets {
        /// Only show tickets in this category (e.g. BUG, QUESTION)
        #[arg(long)]
        category: Option<String>,

        /// Show at most this many tickets
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one ticket with its full message history
    Show {
        /// Ticket ID
        id: String,
    },

    /// Follow the event stream and print every reconciled update
    ///
    /// Runs until interrupted, unless --max-events or --duration-secs is given.
    Watch {
        /// Stop after this many reconciled events
        #[arg(long)]
        max_events: Option<u64>,

        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Start the live terminal dashboard (requires 'tui' feature)
    #[cfg(feature = "tui")]
    Tui,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show every resolved configuration value and where it came from
    Show,

    /// Set a configuration value in config.kdl
    Set {
        /// Configuration key (e.g. api-base, badge-expiry-ms)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Print the path of config.kdl
    Path,
}
