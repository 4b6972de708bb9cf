use hrdesk_db::migrations;

use crate::commands::{exit, with_database, CommandResult};

pub fn run() -> CommandResult {
    let outcome = with_database("migrate", |pool, _config| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), exit::MIGRATION))
    });

    match outcome {
        Ok(_) => CommandResult::success(
            "migrate",
            format!("schema is at migration {}", migrations::latest_version()),
        ),
        Err(failure) => failure,
    }
}
