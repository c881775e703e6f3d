use procura_core::config::AppConfig;
use procura_db::{connect_with_settings, migrations};

use crate::commands::{self, exit, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    let config = match commands::load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let outcome = match commands::block_on("migrate", apply(&config)) {
        Ok(outcome) => outcome,
        Err(result) => return result,
    };

    match outcome {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

async fn apply(config: &AppConfig) -> Result<(), CommandFailure> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), exit::CONNECT))?;

    let result = migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), exit::DATABASE));
    pool.close().await;
    result
}
