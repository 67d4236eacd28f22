mod artifacts;
mod cli;
mod commands;
mod compare;
mod config;
mod context;
mod data;
mod device;
mod error;
mod models;
mod reconcile;
mod render;
mod utils;

use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use config::{Config, Credentials};
use device::{DeviceAccess, SshDeviceAccess};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so FABRIC_ROOT can feed the --root default
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for diff and plan output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fabric_config=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = Config::load(cli.root.as_deref());
    tracing::debug!("Data: {}", cfg.data_dir.display());
    tracing::debug!("Templates: {}", cfg.templates_dir.display());
    tracing::debug!("Build: {}", cfg.build_dir.display());

    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Commands::Render { hostname } => {
            commands::render(&cfg, hostname.as_deref(), &mut stdout)?;
        }
        Commands::Diff { hostname } => {
            let access = device_access(&cfg)?;
            commands::diff(&cfg, access, &hostname, &mut stdout).await?;
        }
        Commands::Push { hostname, deploy } => {
            let access = device_access(&cfg)?;
            commands::push(&cfg, access, &hostname, deploy, &mut stdout).await?;
        }
    }

    Ok(())
}

/// SSH access for commands that talk to devices; credentials are read once here
fn device_access(cfg: &Config) -> anyhow::Result<Arc<dyn DeviceAccess>> {
    let credentials = Credentials::from_env()?;
    Ok(Arc::new(SshDeviceAccess::new(
        credentials,
        cfg.device.clone(),
        cfg.device_timeout_secs,
    )))
}
