mod checksum;
mod migrate;

pub use checksum::ChecksumCommand;
pub use migrate::{StatusCommand, UpCommand};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use migrago_core::config::MigragoConfig;

/// migrago - apply, verify and revert ordered SQL migrations
#[derive(Parser)]
#[command(name = "migrago")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Revert removed migrations and apply pending ones.
    Up(UpCommand),

    /// Show kept, to-be-reverted and pending migrations without changing anything.
    Status(StatusCommand),

    /// Print the checksum recorded for a script file.
    Checksum(ChecksumCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Up(cmd) => cmd.execute().await,
            Commands::Status(cmd) => cmd.execute().await,
            Commands::Checksum(cmd) => cmd.execute(),
        }
    }
}

/// Options shared by commands that talk to the database.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Configuration file path.
    #[arg(short, long, default_value = "migrago.toml")]
    pub config: PathBuf,

    /// Manifest path (overrides config).
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Scripts directory (overrides config).
    #[arg(long)]
    pub scripts_dir: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load `.env`, the config file and command-line overrides, then start logging.
    pub fn load(&self) -> Result<MigragoConfig> {
        dotenvy::dotenv().ok();

        if !Path::new(&self.config).exists() {
            anyhow::bail!("Configuration file not found: {}", self.config.display());
        }

        let mut config = MigragoConfig::from_file(&self.config)
            .with_context(|| format!("Loading {}", self.config.display()))?;

        if let Some(manifest) = &self.manifest {
            config.source.manifest = manifest.clone();
        }
        if let Some(scripts_dir) = &self.scripts_dir {
            config.source.scripts_dir = scripts_dir.clone();
        }

        crate::logging::init(&config.logging);
        Ok(config)
    }
}
