use std::sync::Arc;

use costgate_core::config::LoadOptions;
use costgate_core::{ActorContext, CostWorkflow, TracingAuditSink, UserId};
use costgate_db::{migrations, SqlCostRequestStore, SqlLedgerBook};

use crate::commands::{load_config, with_pool, CommandResult, Failure};

const COMMAND: &str = "sync-ledger";

/// Runs one reconciliation sweep. Any per-request failure makes the command
/// exit non-zero so schedulers notice, though successful entries stay written.
pub fn run(options: LoadOptions, actor: &str) -> CommandResult {
    let actor = actor.trim();
    if actor.is_empty() {
        return CommandResult::failure(COMMAND, "invalid_argument", "--actor must not be blank", 2);
    }

    let outcome = load_config(options).and_then(|config| {
        with_pool(&config, |pool| async move {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5))?;

            let workflow = CostWorkflow::new(
                Arc::new(SqlCostRequestStore::new(pool.clone())),
                Arc::new(SqlLedgerBook::new(pool)),
                Arc::new(TracingAuditSink),
            );
            let ctx = ActorContext::new(UserId(actor.to_string()), "cli-sync-ledger");
            let report = workflow
                .sync_approved_to_ledger(&ctx)
                .await
                .map_err(|error| ("ledger_sync", error.to_string(), 6))?;

            let summary = format!(
                "synced {} approved cost requests ({} already recorded, {} failed)",
                report.synced_count, report.skipped_count, report.failed_count
            );
            if report.failed_count > 0 {
                return Err::<String, Failure>(("ledger_sync_partial", summary, 7));
            }
            Ok(summary)
        })
    });

    CommandResult::from_outcome(COMMAND, outcome)
}
