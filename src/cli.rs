//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::lifecycle::Action;

#[derive(Parser)]
#[command(name = "nft-blackhole")]
#[command(author, version, about = "Block IP addresses in nftables by country and blacklists")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Render the base table from this template instead of the built-in layout
    #[arg(long, global = true)]
    pub template: Option<PathBuf>,

    /// Print the nft documents and commands instead of running nft
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Quiet mode (errors only, for systemd)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output, including every applied document)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Create the blackhole table and load all sets
    Start,

    /// Delete the blackhole table
    Stop,

    /// Stop, then start
    Restart,

    /// Refresh set contents without touching the chains
    Reload,
}

impl From<Commands> for Action {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Start => Action::Start,
            Commands::Stop => Action::Stop,
            Commands::Restart => Action::Restart,
            Commands::Reload => Action::Reload,
        }
    }
}
