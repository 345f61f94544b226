//! Preflight for `backoffice-server`: everything the server checks at boot,
//! without binding the listener.

use crate::commands::{load_config, runtime, CommandResult};
use backoffice_db::{connect, migrations, ping, LocalDocumentStore};

pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("start") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        ping(&pool).await.map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;

        LocalDocumentStore::new(config.documents.storage_root.clone())
            .ensure_ready()
            .await
            .map_err(|error| ("storage", error.to_string(), 6u8))?;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "start",
            format!(
                "preflight passed; backoffice-server will listen on {}",
                config.listen_address()
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
    }
}
