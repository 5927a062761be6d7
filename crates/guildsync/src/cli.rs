//! Command-line interface for guildsync.
//!
//! Useful for checking a token and the bot's reach from a shell:
//!
//! - `guildsync guilds --user-id <id> --token <access token>` lists the user's
//!   guilds with bot status and role labels
//! - `guildsync config` prints the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// guildsync CLI - cached Discord guild lookups.
#[derive(Debug, Parser)]
#[command(name = "guildsync")]
#[command(about = "Look up a user's Discord guilds through the guild cache", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Load configuration from this file instead of the default locations
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List a user's guilds with bot status
    Guilds {
        /// Discord user id
        #[arg(short, long)]
        user_id: String,

        /// The user's OAuth access token
        #[arg(short, long)]
        token: String,

        /// Only guilds the bot is installed in
        #[arg(short, long)]
        shared: bool,

        /// Verification concurrency (1-8)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration (bot token redacted)
    Config,
}
