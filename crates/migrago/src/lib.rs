//! migrago - apply, verify and revert an ordered set of SQL migrations.
//!
//! The desired set is declared in a manifest; what has been applied is kept in
//! a changelog table. Each run reverts trailing migrations that are no longer
//! declared, verifies the checksums of the ones that are, and applies the rest
//! in declared order.
//!
//! ```ignore
//! use migrago::prelude::*;
//!
//! let config = MigragoConfig::from_file("migrago.toml")?;
//! let report = Migrago::new(config).run().await?;
//! ```

mod runtime;

pub use migrago_core;
pub use migrago_runtime;

pub use runtime::prelude;
pub use runtime::Migrago;
