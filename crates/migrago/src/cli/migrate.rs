use anyhow::Result;
use clap::Parser;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use migrago::Migrago;
use migrago_core::MigrateError;

use super::ConfigArgs;

/// Converge the database to the manifest.
#[derive(Parser)]
pub struct UpCommand {
    #[command(flatten)]
    pub args: ConfigArgs,
}

/// Show what `up` would do.
#[derive(Parser)]
pub struct StatusCommand {
    #[command(flatten)]
    pub args: ConfigArgs,
}

impl UpCommand {
    pub async fn execute(self) -> Result<()> {
        let config = self.args.load()?;
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        header("Migrations");
        println!("  {} Reconciling changelog...", style("→").dim());

        let report = Migrago::new(config)
            .with_cancel(cancel)
            .run()
            .await
            .map_err(explain)?;

        for id in &report.reverted {
            println!("  {} Reverted: {}", style("↩").yellow(), id);
        }
        for id in &report.applied {
            println!("  {} Applied: {}", style("✓").green(), id);
        }

        println!();
        if report.is_noop() {
            println!(
                "  {} Up to date ({} applied)",
                style("ℹ").blue(),
                report.kept.len()
            );
        } else {
            println!(
                "  {} {} reverted, {} applied, {} unchanged",
                style("✓").green(),
                report.reverted.len(),
                report.applied.len(),
                report.kept.len()
            );
        }
        println!();
        Ok(())
    }
}

impl StatusCommand {
    pub async fn execute(self) -> Result<()> {
        let config = self.args.load()?;

        header("Migration Status");

        let plan = Migrago::new(config).status().await.map_err(explain)?;

        if plan.kept.is_empty() && plan.reverts.is_empty() && plan.pending.is_empty() {
            println!("  {} No migrations found", style("ℹ").blue());
            println!();
            return Ok(());
        }

        if !plan.kept.is_empty() {
            println!("  {} Applied:", style("✓").green());
            for id in plan.kept.iter().rev() {
                println!("    {} {}", style("-").dim(), style(id).cyan());
            }
        }

        if !plan.reverts.is_empty() {
            println!("  {} To revert:", style("↩").yellow());
            for entry in &plan.reverts {
                println!(
                    "    {} {} {} ({})",
                    style("←").dim(),
                    style(&entry.id).yellow(),
                    style("applied at").dim(),
                    entry.installed_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        if !plan.pending.is_empty() {
            println!("  {} Pending:", style("○").yellow());
            for migration in &plan.pending {
                println!("    {} {}", style("→").dim(), style(&migration.id).yellow());
            }
        }

        println!();
        println!(
            "  {} {} applied, {} to revert, {} pending",
            style("ℹ").blue(),
            plan.kept.len(),
            plan.reverts.len(),
            plan.pending.len()
        );
        println!();
        Ok(())
    }
}

fn header(title: &str) {
    println!();
    println!(
        "  {} {}",
        style("migrago").bold().cyan(),
        style(title).bold()
    );
    println!();
}

/// Add an operator hint to errors that re-running cannot fix.
fn explain(e: MigrateError) -> anyhow::Error {
    let hint = match &e {
        MigrateError::ChecksumMismatch { .. } => Some(
            "The script changed after it was applied. Restore the original file or add a new migration instead.",
        ),
        MigrateError::NonRevertibleOrder { .. } => Some(
            "Only the most recently applied migrations can be removed from the manifest.",
        ),
        MigrateError::MissingRevertScript { .. } => {
            Some("Revert the migration by hand and delete its changelog row.")
        }
        _ => None,
    };

    match hint {
        Some(hint) if e.requires_operator() => anyhow::Error::new(e).context(hint),
        _ => e.into(),
    }
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling the current migration");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}
