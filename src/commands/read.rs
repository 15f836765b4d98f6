//! Read Command Handler
//!
//! Handles the `read` and `locate` subcommands.

use rust_mtape::config::MtapeConfig;
use rust_mtape::error::Result;
use rust_mtape::utils;
use std::path::Path;
use tracing::info;

/// Restore the archived file at the current tape position
pub async fn execute(config: &MtapeConfig, output: &Path, force: bool) -> Result<()> {
    info!("Starting read operation -> {}", output.display());
    let mut ops = super::build_operations(config, false, false)?;

    let header = ops.restore_entry(output, force).await?;
    println!("\n✅ Restored {} ({})", header.name, utils::format_bytes(header.file_size));
    Ok(())
}

/// Look a file up in the catalog, mount its volume and restore it
pub async fn execute_locate(
    config: &MtapeConfig,
    file: &str,
    output: &Path,
    force: bool,
) -> Result<()> {
    info!("Locating {}", file);
    let mut ops = super::build_operations(config, false, false)?;

    let header = ops.locate_and_restore(file, output, force).await?;
    println!(
        "\n✅ Restored {} ({}) from {}",
        header.name,
        utils::format_bytes(header.file_size),
        utils::volume_name(ops.volume())
    );
    Ok(())
}
