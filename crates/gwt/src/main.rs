use std::{path::PathBuf, process::ExitCode, sync::Arc};

use gwt_core::{config::Configuration, store::FileStore, Context};

fn state_directory() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("GWT_DIRECTORY"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let dir = state_directory();
    let store = Arc::new(FileStore::new(&dir));

    // Logging is configured from config.json, so config errors go to stderr.
    let config = match Configuration::load(store.as_ref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Please fix the configuration in {} and restart.", dir.display());
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gwt_core::logging::init("gwt", config.log_level.as_deref()) {
        eprintln!("{e}");
    }

    let ctx = match Context::with_config(store, config) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            tracing::error!(error = %e, "unable to load state");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gwt_telegram::run_polling(ctx).await {
        tracing::error!(error = %e, "telegram bot failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
