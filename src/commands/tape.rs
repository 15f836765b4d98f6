//! Direct drive command handlers (`tape <action>`)

use rust_mtape::cli::TapeCommand;
use rust_mtape::config::MtapeConfig;
use rust_mtape::error::Result;
use rust_mtape::utils;
use tracing::info;

pub async fn execute(config: &MtapeConfig, action: TapeCommand) -> Result<()> {
    info!("Tape command {:?} on {}", action, config.device);
    let mut ops = super::build_operations(config, true, false)?;

    match action {
        TapeCommand::Rewind => ops.rewind()?,
        TapeCommand::Eject => ops.eject()?,
        TapeCommand::Load => ops.load()?,
        TapeCommand::Lock => ops.lock()?,
        TapeCommand::Unlock => ops.unlock()?,
        TapeCommand::Tell => {
            let position = ops.current_position()?;
            println!("At block {}", position);
        }
        TapeCommand::Seek { block, absolute } => ops.seek(block, absolute)?,
        TapeCommand::Eod => ops.seek_end_of_data()?,
        TapeCommand::Weof { count } => ops.write_filemarks(count)?,
        TapeCommand::Fsf { count } => ops.space_filemarks(i64::from(count))?,
        TapeCommand::Bsf { count } => ops.space_filemarks(-i64::from(count))?,
        TapeCommand::Retension => ops.retension()?,
        TapeCommand::Info => {
            let (drive, media) = ops.drive_info()?;
            println!("📼 Drive Parameters:");
            println!(
                "  Block size: default {}, min {}, max {}",
                drive.default_block_size, drive.minimum_block_size, drive.maximum_block_size
            );
            println!("  Compression: {}", drive.compression);
            println!("  ECC: {}", drive.ecc);
            println!("  Partitions: {}", drive.maximum_partition_count);
            match media {
                Some(media) => {
                    println!("\n📦 Media Parameters:");
                    println!("  Capacity: {}", utils::format_bytes(media.capacity));
                    println!("  Remaining: {}", utils::format_bytes(media.remaining));
                    println!("  Block size: {}", media.block_size);
                    println!("  Write protected: {}", media.write_protected);
                }
                None => println!("\nNo media information (is a tape loaded?)"),
            }
        }
    }
    Ok(())
}
