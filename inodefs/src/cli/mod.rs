use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod debug;
pub mod server;

#[derive(Parser)]
#[command(name = "inodefs")]
#[command(author, version, about = "Multi-tenant inode filesystem over HTTP", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a default configuration file
    Init {
        #[arg(default_value = "inodefs.toml")]
        path: PathBuf,
    },
    /// Run the filesystem server
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Debug commands for inspecting the database
    Debug {
        #[command(subcommand)]
        subcommand: DebugCommands,
    },
}

#[derive(Subcommand)]
pub enum DebugCommands {
    /// List all keys in the database, grouped by tenant
    ListKeys {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
