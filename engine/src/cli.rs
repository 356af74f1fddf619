//! CLI interface for Elicit
//!
//! This module provides the command-line interface using clap's derive API.
//! The engine itself is a library; the binary replays scripted turns against
//! it and inspects what was persisted.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Elicit adaptive interview engine
///
/// Picks the questioning strategy and focus concept for each turn of an
/// interview from the concept graph and the latest response.
#[derive(Parser, Debug)]
#[command(name = "elicit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a JSON script of turns through the engine
    Simulate {
        /// Script file: a JSON array of turn inputs
        script: PathBuf,

        /// Session id (default: a fresh UUID)
        #[arg(short, long)]
        session: Option<String>,

        /// Keep session state in memory instead of the session database
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show the persisted state of a session
    Inspect {
        /// Session id
        session: String,
    },

    /// List persisted sessions, most recently updated first
    Sessions {
        /// Number of sessions to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Validate the configuration and report strategy weight problems
    Check,
}
