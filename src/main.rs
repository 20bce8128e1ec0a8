// src/main.rs

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tokio::sync::mpsc;
use tracing::{error, info};

use vanguard_report::cli::Args;
use vanguard_report::config::Settings;
use vanguard_report::core::storage::{Database, TargetRepository};
use vanguard_report::logging::initialize_logging;
use vanguard_report::{Dispatcher, LiveReporters, validate_and_normalize};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    initialize_logging(args.verbose)?;

    // Reject a malformed id before opening the database.
    let target_id = validate_and_normalize(args.target_id.as_str()).wrap_err("Invalid object id received")?;

    let settings = Settings::load(args.config.as_deref()).wrap_err("Failed to load settings")?;
    let db = Database::connect(&settings.database)
        .await
        .wrap_err("Failed to open the main database")?;

    let (tx, mut rx) = mpsc::channel(1);
    let dispatcher = Dispatcher::new(TargetRepository::new(&db), LiveReporters::new(&db).with_sink(tx));

    let outcome = dispatcher.run_report(target_id).await;
    db.close().await;

    if let Err(e) = outcome {
        error!(target_id = %target_id, error = %e, "Report failed.");
        return Err(e).wrap_err_with(|| format!("Report for target {target_id} failed"));
    }

    if let Ok(digest) = rx.try_recv() {
        println!("{}", serde_json::to_string_pretty(&digest)?);
    }
    info!(target_id = %target_id, "Report finished.");
    Ok(())
}
