use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fabric-config")]
#[command(version)]
#[command(about = "Render, diff and push network device configuration", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root holding data/, templates/, build/ and backups/
    #[arg(long, global = true, env = "FABRIC_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render the desired configuration of one device, or of all devices
    Render {
        /// Device to render; every device in the inventory when omitted
        hostname: Option<String>,
    },

    /// Show what differs between a device's running and desired configuration
    Diff {
        hostname: String,
    },

    /// Print the commands missing from a device, and push them with --deploy
    Push {
        hostname: String,

        /// Apply the commands and save; without it nothing is sent to the device
        #[arg(long)]
        deploy: bool,
    },
}
