use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "locshare")]
#[command(about = "End-to-end encrypted location sharing client")]
#[command(version)]
pub struct Cli {
    /// Directory holding the local secret store
    #[arg(long, env = "LOCSHARE_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a new identity, replacing any existing one
    Init {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Set the location server base URL
    Server { url: String },
    /// Register the public key with the server
    Register,
    /// Run the challenge/response handshake and store a bearer token
    Login,
    /// Forget the bearer token
    Logout,
    /// Print the key id of the current identity
    Whoami,
    /// Print the armored public key
    ExportKey,
    /// List groups
    Groups,
    /// Create a group
    CreateGroup {
        #[arg(long)]
        name: String,
        /// Comma-separated member key ids
        #[arg(long, default_value = "")]
        members: String,
    },
    /// Share one position with every group
    Send {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Fetch and decrypt recent positions
    Fetch {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Drop a cached member key so it is fetched and verified again
    ForgetKey { key_id: String },
    /// Share a fixed position and poll for others until Ctrl+C
    Run {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}
