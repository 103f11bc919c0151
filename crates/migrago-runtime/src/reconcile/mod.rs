//! Reconciliation of the desired migration set against the changelog.

mod engine;
mod plan;

pub use engine::{EngineOptions, CHANGELOG_STEP, ReconciliationEngine, RunReport, RunState};
pub use plan::{plan, ReconcilePlan};
