//! Write Command Handler
//!
//! Handles the `write`, `writelist` and `append` subcommands.

use rust_mtape::config::MtapeConfig;
use rust_mtape::error::{Result, RustMtapeError};
use rust_mtape::tape_ops::{enumerate_sources, TapeOperations, WriteSummary};
use rust_mtape::utils;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Where a backup starts on tape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPoint {
    /// New backup set on a fresh volume, optionally at a logical block
    NewVolume { position: Option<u64> },
    /// After the end of data on the newest catalogued volume
    Append,
}

pub async fn execute(
    config: &MtapeConfig,
    source: &Path,
    start: StartPoint,
    progress: bool,
) -> Result<()> {
    info!("Starting write operation: {}", source.display());
    let entries = enumerate_sources(source)?;
    run(config, &entries, start, progress).await
}

pub async fn execute_list(config: &MtapeConfig, list: &Path, progress: bool) -> Result<()> {
    info!("Starting writelist operation: {}", list.display());
    let entries = read_list(list)?;
    run(
        config,
        &entries,
        StartPoint::NewVolume { position: None },
        progress,
    )
    .await
}

/// Non-empty lines of a list file, surrounding quotes removed
pub fn read_list(list: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(list).map_err(|e| {
        RustMtapeError::file_operation(format!("Cannot read list {}: {}", list.display(), e))
    })?;
    Ok(text
        .lines()
        .map(|line| utils::strip_quotes(line.trim()).to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

async fn run(
    config: &MtapeConfig,
    entries: &[String],
    start: StartPoint,
    progress: bool,
) -> Result<()> {
    let mut ops = super::build_operations(config, false, progress)?;
    prepare_write(&mut ops, entries, start)?;

    println!("\n🚀 Starting Write Operation");
    println!("  Entries: {}", entries.len());
    println!("  Device: {}", config.device);
    println!("  Volume: {}", utils::volume_name(ops.volume()));

    let write_start = Instant::now();
    let summary = ops.write_files(entries, false).await?;
    print_summary(&ops, &summary, write_start);
    Ok(())
}

/// Journal the entries, then position the tape
pub fn prepare_write(ops: &mut TapeOperations, entries: &[String], start: StartPoint) -> Result<()> {
    ops.begin_journal(entries)?;
    position_for_write(ops, start)
}

/// Pick the volume ordinal and tape position a backup starts from
pub fn position_for_write(ops: &mut TapeOperations, start: StartPoint) -> Result<()> {
    let latest = ops.catalog().latest_volume()?;
    match start {
        StartPoint::NewVolume { position } => {
            ops.set_volume(latest.map(|v| v + 1).unwrap_or(0));
            if let Some(block) = position {
                ops.seek(block, false)?;
            }
        }
        StartPoint::Append => {
            ops.set_volume(latest.unwrap_or(0));
            ops.seek_end_of_data()?;
        }
    }
    Ok(())
}

pub fn print_summary(ops: &TapeOperations, summary: &WriteSummary, started: Instant) {
    let elapsed = started.elapsed();
    println!("\n✅ Write Operation Completed");
    println!("  Files written: {}", summary.completed);
    if summary.aborted > 0 {
        println!("  Files aborted: {}", summary.aborted);
    }
    if summary.skipped > 0 {
        println!("  Files skipped: {}", summary.skipped);
    }
    println!("  Bytes written: {}", utils::format_bytes(summary.bytes));
    println!(
        "  Volumes used: {}",
        ops.get_write_progress().rollovers + 1
    );
    println!(
        "  Duration: {}",
        utils::format_duration(elapsed.as_secs_f64())
    );
    if summary.bytes > 0 && elapsed.as_secs() > 0 {
        println!(
            "  Average Speed: {}",
            utils::format_speed(summary.bytes, elapsed.as_secs_f64())
        );
    }
}
