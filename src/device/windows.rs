//! Win32 tape API binding
//!
//! Thin wrapper over CreateFile/ReadFile/WriteFile and the winbase tape
//! calls. Every function hands back the raw Win32 status code.

use super::constants::status_codes::*;
use super::constants::win32::*;
use super::types::{DriveParameters, IoOutcome, MediaParameters, TapeStatus, TapemarkKind};
use super::TapeDevice;
use std::ffi::CString;
use tracing::{debug, warn};

use winapi::shared::minwindef::{DWORD, FALSE, LPVOID};
use winapi::um::{
    errhandlingapi::GetLastError,
    fileapi::{CreateFileA, ReadFile, WriteFile, OPEN_EXISTING},
    handleapi::{CloseHandle, INVALID_HANDLE_VALUE},
    winbase::{
        GetTapeParameters, GetTapePosition, PrepareTape, SetTapeParameters, SetTapePosition,
        WriteTapemark,
    },
    winnt::{GENERIC_READ, GENERIC_WRITE, HANDLE},
};

#[repr(C)]
#[derive(Default)]
struct TapeGetDriveParameters {
    ecc: u8,
    compression: u8,
    data_padding: u8,
    report_setmarks: u8,
    default_block_size: DWORD,
    maximum_block_size: DWORD,
    minimum_block_size: DWORD,
    maximum_partition_count: DWORD,
    features_low: DWORD,
    features_high: DWORD,
    eot_warning_zone_size: DWORD,
}

#[repr(C)]
#[derive(Default)]
struct TapeGetMediaParameters {
    capacity: i64,
    remaining: i64,
    block_size: DWORD,
    partition_count: DWORD,
    write_protected: u8,
}

#[repr(C)]
struct TapeSetDriveParameters {
    ecc: u8,
    compression: u8,
    data_padding: u8,
    report_setmarks: u8,
    eot_warning_zone_size: DWORD,
}

#[repr(C)]
struct TapeSetMediaParameters {
    block_size: DWORD,
}

/// Tape drive opened through `\\.\TAPEn`
pub struct WindowsTapeDevice {
    handle: HANDLE,
    device_path: String,
}

// The handle is owned exclusively by this value.
unsafe impl Send for WindowsTapeDevice {}

impl WindowsTapeDevice {
    pub fn new() -> Self {
        Self {
            handle: INVALID_HANDLE_VALUE,
            device_path: String::new(),
        }
    }

    fn last_status() -> TapeStatus {
        TapeStatus(unsafe { GetLastError() })
    }

    fn prepare(&mut self, operation: u32) -> TapeStatus {
        TapeStatus(unsafe { PrepareTape(self.handle, operation, FALSE) })
    }

    fn set_position(&mut self, method: u32, offset: u64) -> TapeStatus {
        let low = (offset & 0xFFFF_FFFF) as DWORD;
        let high = (offset >> 32) as DWORD;
        TapeStatus(unsafe { SetTapePosition(self.handle, method, 0, low, high, FALSE) })
    }
}

impl Default for WindowsTapeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WindowsTapeDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl TapeDevice for WindowsTapeDevice {
    fn open(&mut self, path: &str) -> TapeStatus {
        if self.is_open() {
            return TapeStatus::SUCCESS;
        }
        let path_cstring = match CString::new(path) {
            Ok(p) => p,
            Err(_) => return TapeStatus(ERROR_NOT_SUPPORTED),
        };

        let handle = unsafe {
            CreateFileA(
                path_cstring.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                std::ptr::null_mut(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            let status = Self::last_status();
            warn!("Cannot open device {}: error code {}", path, status.code());
            return status;
        }

        debug!("Device opened: {}", path);
        self.handle = handle;
        self.device_path = path.to_string();
        TapeStatus::SUCCESS
    }

    fn close(&mut self) {
        if self.handle != INVALID_HANDLE_VALUE {
            unsafe {
                CloseHandle(self.handle);
            }
            debug!("Device closed: {}", self.device_path);
            self.handle = INVALID_HANDLE_VALUE;
        }
    }

    fn is_open(&self) -> bool {
        self.handle != INVALID_HANDLE_VALUE
    }

    fn read(&mut self, buffer: &mut [u8]) -> IoOutcome {
        let mut transferred: DWORD = 0;
        let ok = unsafe {
            ReadFile(
                self.handle,
                buffer.as_mut_ptr() as LPVOID,
                buffer.len() as DWORD,
                &mut transferred,
                std::ptr::null_mut(),
            )
        };
        let status = if ok == FALSE {
            Self::last_status()
        } else {
            TapeStatus::SUCCESS
        };
        IoOutcome::new(transferred as usize, status)
    }

    fn write(&mut self, buffer: &[u8]) -> IoOutcome {
        let mut transferred: DWORD = 0;
        let ok = unsafe {
            WriteFile(
                self.handle,
                buffer.as_ptr() as LPVOID,
                buffer.len() as DWORD,
                &mut transferred,
                std::ptr::null_mut(),
            )
        };
        let status = if ok == FALSE {
            Self::last_status()
        } else {
            TapeStatus::SUCCESS
        };
        IoOutcome::new(transferred as usize, status)
    }

    fn rewind(&mut self) -> TapeStatus {
        self.set_position(TAPE_REWIND, 0)
    }

    fn unload(&mut self) -> TapeStatus {
        self.prepare(TAPE_UNLOAD)
    }

    fn load(&mut self) -> TapeStatus {
        self.prepare(TAPE_LOAD)
    }

    fn lock(&mut self) -> TapeStatus {
        self.prepare(TAPE_LOCK)
    }

    fn unlock(&mut self) -> TapeStatus {
        self.prepare(TAPE_UNLOCK)
    }

    fn adjust_tension(&mut self) -> TapeStatus {
        self.prepare(TAPE_TENSION)
    }

    fn seek_absolute(&mut self, block: u64) -> TapeStatus {
        self.set_position(TAPE_ABSOLUTE_BLOCK, block)
    }

    fn seek_logical(&mut self, block: u64) -> TapeStatus {
        self.set_position(TAPE_LOGICAL_BLOCK, block)
    }

    fn seek_end_of_data(&mut self) -> TapeStatus {
        self.set_position(TAPE_SPACE_END_OF_DATA, 0)
    }

    fn space_filemarks(&mut self, count: i64) -> TapeStatus {
        self.set_position(TAPE_SPACE_FILEMARKS, count as u64)
    }

    fn space_blocks(&mut self, count: i64) -> TapeStatus {
        self.set_position(TAPE_SPACE_RELATIVE_BLOCKS, count as u64)
    }

    fn write_tapemark(&mut self, count: u32, kind: TapemarkKind) -> TapeStatus {
        let kind = match kind {
            TapemarkKind::Setmark => TAPE_SETMARKS,
            TapemarkKind::Filemark => TAPE_FILEMARKS,
            TapemarkKind::ShortFilemark => TAPE_SHORT_FILEMARKS,
            TapemarkKind::LongFilemark => TAPE_LONG_FILEMARKS,
        };
        TapeStatus(unsafe { WriteTapemark(self.handle, kind, count, FALSE) })
    }

    fn position(&mut self) -> std::result::Result<u64, TapeStatus> {
        let mut partition: DWORD = 0;
        let mut low: DWORD = 0;
        let mut high: DWORD = 0;
        let code = unsafe {
            GetTapePosition(
                self.handle,
                TAPE_LOGICAL_POSITION,
                &mut partition,
                &mut low,
                &mut high,
            )
        };
        if code == NO_ERROR {
            Ok(((high as u64) << 32) | low as u64)
        } else {
            Err(TapeStatus(code))
        }
    }

    fn drive_parameters(&mut self) -> std::result::Result<DriveParameters, TapeStatus> {
        let mut raw = TapeGetDriveParameters::default();
        let mut size = std::mem::size_of::<TapeGetDriveParameters>() as DWORD;
        let code = unsafe {
            GetTapeParameters(
                self.handle,
                GET_TAPE_DRIVE_INFORMATION,
                &mut size,
                &mut raw as *mut _ as LPVOID,
            )
        };
        if code != NO_ERROR {
            return Err(TapeStatus(code));
        }
        Ok(DriveParameters {
            ecc: raw.ecc != 0,
            compression: raw.compression != 0,
            data_padding: raw.data_padding != 0,
            report_setmarks: raw.report_setmarks != 0,
            default_block_size: raw.default_block_size,
            maximum_block_size: raw.maximum_block_size,
            minimum_block_size: raw.minimum_block_size,
            maximum_partition_count: raw.maximum_partition_count,
            eot_warning_zone_size: raw.eot_warning_zone_size,
        })
    }

    fn media_parameters(&mut self) -> std::result::Result<MediaParameters, TapeStatus> {
        let mut raw = TapeGetMediaParameters::default();
        let mut size = std::mem::size_of::<TapeGetMediaParameters>() as DWORD;
        let code = unsafe {
            GetTapeParameters(
                self.handle,
                GET_TAPE_MEDIA_INFORMATION,
                &mut size,
                &mut raw as *mut _ as LPVOID,
            )
        };
        if code != NO_ERROR {
            return Err(TapeStatus(code));
        }
        Ok(MediaParameters {
            capacity: raw.capacity.max(0) as u64,
            remaining: raw.remaining.max(0) as u64,
            block_size: raw.block_size,
            partition_count: raw.partition_count,
            write_protected: raw.write_protected != 0,
        })
    }

    fn set_drive_parameters(&mut self, parameters: &DriveParameters) -> TapeStatus {
        let mut raw = TapeSetDriveParameters {
            ecc: parameters.ecc as u8,
            compression: parameters.compression as u8,
            data_padding: parameters.data_padding as u8,
            report_setmarks: parameters.report_setmarks as u8,
            eot_warning_zone_size: parameters.eot_warning_zone_size,
        };
        TapeStatus(unsafe {
            SetTapeParameters(
                self.handle,
                SET_TAPE_DRIVE_INFORMATION,
                &mut raw as *mut _ as LPVOID,
            )
        })
    }

    fn set_media_block_size(&mut self, block_size: u32) -> TapeStatus {
        let mut raw = TapeSetMediaParameters { block_size };
        TapeStatus(unsafe {
            SetTapeParameters(
                self.handle,
                SET_TAPE_MEDIA_INFORMATION,
                &mut raw as *mut _ as LPVOID,
            )
        })
    }
}
