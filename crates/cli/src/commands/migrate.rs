use costgate_core::config::LoadOptions;
use costgate_db::migrations;

use crate::commands::{load_config, with_pool, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let outcome = load_config(options).and_then(|config| {
        with_pool(&config, |pool| async move {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5))?;
            Ok("applied pending migrations".to_string())
        })
    });

    CommandResult::from_outcome("migrate", outcome)
}
