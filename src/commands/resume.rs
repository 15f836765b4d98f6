//! Resume Command Handler
//!
//! Handles the `resume` subcommand: continue an interrupted backup from the
//! journal left in the configured journal directory.

use super::write::print_summary;
use rust_mtape::config::MtapeConfig;
use rust_mtape::error::Result;
use std::time::Instant;
use tracing::info;

pub async fn execute(config: &MtapeConfig, progress: bool) -> Result<()> {
    info!(
        "Resuming backup from journal in {}",
        config.journal_dir.display()
    );
    let mut ops = super::build_operations(config, false, progress)?;

    let started = Instant::now();
    let summary = ops.resume().await?;
    if summary.completed + summary.aborted + summary.skipped == 0 {
        println!("Nothing left to resume");
        return Ok(());
    }
    print_summary(&ops, &summary, started);
    Ok(())
}
