//! Test support: an in-memory changelog store and explicit PostgreSQL
//! provisioning for integration tests.

mod db;
mod memory;

pub use db::{IsolatedTestDb, TestDatabase};
pub use memory::{Fault, MemoryChangelogStore, ScriptEvent};
