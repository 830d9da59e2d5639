//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the relay (`run`, the default)
//! - Showing the effective configuration (`config`)

mod config;

pub use config::{format_settings, run_config_command};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "assistant-relay")]
#[command(about = "Relays Slack assistant threads to an OpenAI assistant")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "RELAY_LOG_JSON")]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the relay (default if no subcommand given)
    Run,

    /// Print the effective configuration with secrets redacted
    Config {
        /// Show only settings matching this prefix (e.g., "slack", "relay.poll")
        #[arg(short, long)]
        filter: Option<String>,
    },
}
