//! Core types for migrago: desired migrations, changelog entries,
//! the error taxonomy and configuration.

pub mod changelog;
pub mod config;
pub mod error;
pub mod migration;

pub use changelog::ChangelogEntry;
pub use config::MigragoConfig;
pub use error::{MigrateError, Result};
pub use migration::{checksum, DesiredSet, Migration};
