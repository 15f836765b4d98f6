//! Catalog Command Handlers
//!
//! Handles `delete`, `init` and `list`. None of these touch the drive.

use rust_mtape::catalog::{Catalog, FileRecord};
use rust_mtape::config::MtapeConfig;
use rust_mtape::error::{Result, RustMtapeError};
use rust_mtape::operator::{ConsolePrompt, OperatorPrompt};
use rust_mtape::utils;
use std::path::Path;
use tracing::info;

pub fn delete(config: &MtapeConfig, file: &str) -> Result<()> {
    let catalog = Catalog::new(&config.catalog_path);
    let changed = catalog.mark_deleted(file)?;
    if changed == 0 {
        println!("No catalogued file matches {}", file);
    } else {
        println!("Marked {} record(s) deleted", changed);
    }
    Ok(())
}

pub fn init(config: &MtapeConfig, force: bool) -> Result<()> {
    let catalog = Catalog::new(&config.catalog_path);
    if catalog.path().exists() && !force {
        let question = format!(
            "This erases every record in {}. Continue?",
            catalog.path().display()
        );
        if !ConsolePrompt.confirm(&question)? {
            return Err(RustMtapeError::operation_cancelled("catalog left unchanged"));
        }
    }
    catalog.initialize()?;
    println!("✅ Catalog initialized: {}", catalog.path().display());
    Ok(())
}

pub fn list(config: &MtapeConfig, all: bool, volumes: bool, csv: Option<&Path>) -> Result<()> {
    let catalog = Catalog::new(&config.catalog_path);

    if volumes {
        let volumes = catalog.list_volumes()?;
        println!("{:<6} {}", "ID", "NAME");
        for volume in &volumes {
            println!("{:<6} {}", volume.id, volume.name);
        }
        println!("\n{} volume(s)", volumes.len());
        return Ok(());
    }

    let records: Vec<FileRecord> = if all {
        catalog.list_all()?
    } else {
        catalog.list_active()?.collect()
    };

    if let Some(path) = csv {
        catalog.export_csv(&records, path)?;
        info!("Exported {} records to {}", records.len(), path.display());
        println!("Exported {} record(s) to {}", records.len(), path.display());
        return Ok(());
    }

    let mut total = 0u64;
    for record in &records {
        total += record.size;
        println!(
            "{}  {:>10}  {:>8}  {}{}",
            utils::volume_name(record.volume),
            utils::format_bytes(record.size),
            record.position,
            record.full_path(),
            if record.deleted { "  (deleted)" } else { "" }
        );
    }
    println!(
        "\n{} file(s), {}",
        records.len(),
        utils::format_bytes(total)
    );
    Ok(())
}
