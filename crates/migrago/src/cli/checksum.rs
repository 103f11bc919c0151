use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

/// Print the checksum of a forward script.
#[derive(Parser)]
pub struct ChecksumCommand {
    /// Script file.
    pub file: PathBuf,
}

impl ChecksumCommand {
    pub fn execute(self) -> Result<()> {
        let script = std::fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        println!("{}", migrago_core::checksum(&script));
        Ok(())
    }
}
