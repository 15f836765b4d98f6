//! Tape Device Port
//!
//! The device layer the orchestration engine drives: sequential block I/O,
//! positioning, tapemarks, load/unload and media-removal lock. Every call
//! reports a numeric [`TapeStatus`] instead of failing, so the engine can
//! classify the code and pick a recovery action.

use crate::error::{Result, RustMtapeError};
use tracing::debug;

pub mod constants;
pub mod types;
mod virtual_tape;
#[cfg(windows)]
mod windows;

pub use constants::*;
pub use types::{
    DriveParameters, IoOutcome, MediaParameters, RecoveryAction, TapeCondition, TapeStatus,
    TapemarkKind,
};
pub use virtual_tape::{Cartridge, TapeRecord, VirtualTapeDrive};
#[cfg(windows)]
pub use windows::WindowsTapeDevice;

/// Device path that selects the in-memory drive
pub const VIRTUAL_DEVICE: &str = "virtual";

/// Sequential-access tape device
pub trait TapeDevice: Send {
    fn open(&mut self, path: &str) -> TapeStatus;
    fn close(&mut self);
    fn is_open(&self) -> bool;

    fn read(&mut self, buffer: &mut [u8]) -> IoOutcome;
    fn write(&mut self, buffer: &[u8]) -> IoOutcome;

    fn rewind(&mut self) -> TapeStatus;
    fn unload(&mut self) -> TapeStatus;
    fn load(&mut self) -> TapeStatus;
    fn lock(&mut self) -> TapeStatus;
    fn unlock(&mut self) -> TapeStatus;
    fn adjust_tension(&mut self) -> TapeStatus;

    fn seek_absolute(&mut self, block: u64) -> TapeStatus;
    fn seek_logical(&mut self, block: u64) -> TapeStatus;
    fn seek_end_of_data(&mut self) -> TapeStatus;
    fn space_filemarks(&mut self, count: i64) -> TapeStatus;
    fn space_blocks(&mut self, count: i64) -> TapeStatus;

    fn write_tapemark(&mut self, count: u32, kind: TapemarkKind) -> TapeStatus;

    /// Current logical block
    fn position(&mut self) -> std::result::Result<u64, TapeStatus>;

    fn drive_parameters(&mut self) -> std::result::Result<DriveParameters, TapeStatus>;
    fn media_parameters(&mut self) -> std::result::Result<MediaParameters, TapeStatus>;
    fn set_drive_parameters(&mut self, parameters: &DriveParameters) -> TapeStatus;
    fn set_media_block_size(&mut self, block_size: u32) -> TapeStatus;
}

/// Normalize a drive name such as `TAPE0` into the platform device path
pub fn device_path(name: &str) -> String {
    if name.starts_with(r"\\.\") || name == VIRTUAL_DEVICE || name.starts_with('/') {
        name.to_string()
    } else {
        format!(r"\\.\{}", name)
    }
}

/// Create the device binding for a drive name
pub fn create_device(name: &str) -> Result<Box<dyn TapeDevice>> {
    debug!("Creating tape device binding for {}", name);

    if name.eq_ignore_ascii_case(VIRTUAL_DEVICE) {
        return Ok(Box::new(VirtualTapeDrive::with_blank_cartridges(1)));
    }

    #[cfg(windows)]
    {
        Ok(Box::new(WindowsTapeDevice::new()))
    }

    #[cfg(not(windows))]
    {
        Err(RustMtapeError::unsupported(format!(
            "Tape device '{}' requires the Windows tape API (use --device virtual for a simulated drive)",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path_normalization() {
        assert_eq!(device_path("TAPE0"), r"\\.\TAPE0");
        assert_eq!(device_path(r"\\.\TAPE1"), r"\\.\TAPE1");
        assert_eq!(device_path("virtual"), "virtual");
    }

    #[test]
    fn test_create_virtual_device() {
        let device = create_device("virtual");
        assert!(device.is_ok());
    }
}
