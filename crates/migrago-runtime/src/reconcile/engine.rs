use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use migrago_core::error::{MigrateError, Result};
use migrago_core::DesiredSet;

use super::plan::{plan, ReconcilePlan};
use crate::changelog::ChangelogStore;

/// Step name reported when reading or creating the changelog is cancelled or times out.
pub const CHANGELOG_STEP: &str = "<changelog>";

/// Stage of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    SchemaEnsured,
    /// Reverts done, kept entries checksum-verified.
    Reconciled,
    /// Pending migrations applied.
    Converged,
    Done,
    Failed,
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Upper bound for a single apply or revert transaction.
    pub step_timeout: Option<Duration>,
    /// Aborts the in-flight transaction and fails the run.
    pub cancel: CancellationToken,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Reverted ids, in the order they were reverted.
    pub reverted: Vec<String>,
    /// Ids that were already applied and verified.
    pub kept: Vec<String>,
    /// Newly applied ids, in declared order.
    pub applied: Vec<String>,
}

impl RunReport {
    pub fn is_noop(&self) -> bool {
        self.reverted.is_empty() && self.applied.is_empty()
    }
}

/// Converges the changelog to a desired migration set.
///
/// Holds no state between runs; construct one per run. The caller is
/// responsible for excluding concurrent runs against the same changelog.
pub struct ReconciliationEngine<S: ChangelogStore> {
    store: S,
    options: EngineOptions,
}

impl<S: ChangelogStore> ReconciliationEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, EngineOptions::default())
    }

    pub fn with_options(store: S, options: EngineOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Revert undesired trailing migrations, then apply pending ones.
    ///
    /// Fails fast. Steps committed before a failure stay committed.
    pub async fn run(&self, desired: &DesiredSet) -> Result<RunReport> {
        let mut state = RunState::Init;
        let result = self.run_inner(desired, &mut state).await;

        match &result {
            Ok(report) => {
                transition(&mut state, RunState::Done);
                info!(
                    "Reconciliation done: {} reverted, {} kept, {} applied",
                    report.reverted.len(),
                    report.kept.len(),
                    report.applied.len()
                );
            }
            Err(e) => {
                error!(stage = ?state, "Reconciliation failed: {}", e);
                transition(&mut state, RunState::Failed);
            }
        }

        result
    }

    /// Compute what `run` would do without reverting or applying anything.
    pub async fn status(&self, desired: &DesiredSet) -> Result<ReconcilePlan> {
        self.step(CHANGELOG_STEP, self.store.ensure_schema()).await?;
        let applied = self.step(CHANGELOG_STEP, self.store.list_applied()).await?;
        plan(desired, &applied)
    }

    async fn run_inner(&self, desired: &DesiredSet, state: &mut RunState) -> Result<RunReport> {
        self.step(CHANGELOG_STEP, self.store.ensure_schema()).await?;
        transition(state, RunState::SchemaEnsured);

        let applied = self.step(CHANGELOG_STEP, self.store.list_applied()).await?;
        debug!(
            "Applied: {:?}",
            applied.iter().map(|e| e.id.as_str()).collect::<Vec<_>>()
        );

        let plan = plan(desired, &applied)?;
        let mut report = RunReport {
            kept: plan.kept,
            ..Default::default()
        };

        for entry in &plan.reverts {
            info!("Reverting migration: {}", entry.id);
            self.step(&entry.id, self.store.revert_migration(entry))
                .await?;
            info!("Migration reverted: {}", entry.id);
            report.reverted.push(entry.id.clone());
        }
        transition(state, RunState::Reconciled);

        for migration in &plan.pending {
            info!("Applying migration: {}", migration.id);
            self.step(&migration.id, self.store.apply_migration(migration))
                .await?;
            info!("Migration applied: {}", migration.id);
            report.applied.push(migration.id.clone());
        }
        transition(state, RunState::Converged);

        Ok(report)
    }

    /// Drive one store call under the run's timeout and cancellation.
    ///
    /// Losing the race drops `fut`, which rolls its transaction back.
    async fn step<T, F>(&self, id: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let bounded = async {
            match self.options.step_timeout {
                Some(after) => match tokio::time::timeout(after, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(MigrateError::Timeout {
                        id: id.to_string(),
                        after,
                    }),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.options.cancel.cancelled() => Err(MigrateError::Cancelled {
                id: id.to_string(),
            }),
            result = bounded => result,
        }
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug!("Run state: {:?} -> {:?}", state, next);
    *state = next;
}
