// Tape status codes (Win32 tape error space, shared by every device binding)
pub mod status_codes {
    pub const NO_ERROR: u32 = 0;
    pub const ERROR_WRITE_PROTECT: u32 = 19;
    pub const ERROR_NOT_SUPPORTED: u32 = 50;
    /// "More data is available": the controller could not move the whole block.
    pub const ERROR_MORE_DATA: u32 = 234;
    pub const ERROR_END_OF_MEDIA: u32 = 1100;
    pub const ERROR_FILEMARK_DETECTED: u32 = 1101;
    pub const ERROR_BEGINNING_OF_MEDIA: u32 = 1102;
    pub const ERROR_SETMARK_DETECTED: u32 = 1103;
    pub const ERROR_NO_DATA_DETECTED: u32 = 1104;
    pub const ERROR_PARTITION_FAILURE: u32 = 1105;
    pub const ERROR_INVALID_BLOCK_LENGTH: u32 = 1106;
    pub const ERROR_DEVICE_NOT_PARTITIONED: u32 = 1107;
    pub const ERROR_UNABLE_TO_LOCK_MEDIA: u32 = 1108;
    pub const ERROR_UNABLE_TO_UNLOAD_MEDIA: u32 = 1109;
    pub const ERROR_MEDIA_CHANGED: u32 = 1110;
    pub const ERROR_BUS_RESET: u32 = 1111;
    pub const ERROR_NO_MEDIA_IN_DRIVE: u32 = 1112;
    /// Physical end of tape
    pub const ERROR_EOM_OVERFLOW: u32 = 1129;
    pub const ERROR_DEVICE_REQUIRES_CLEANING: u32 = 1165;
}

pub mod block_sizes {
    pub const DEFAULT_MAX_BLOCK_SIZE: u32 = 1_048_576; // 1MB
    pub const DEFAULT_MIN_BLOCK_SIZE: u32 = 1;
}

pub mod timing {
    /// Poll period while waiting for a freshly loaded tape, also the pause
    /// between lock attempts
    pub const TAPE_READY_POLL_MS: u64 = 500;
    pub const LOCK_MAX_ATTEMPTS: u32 = 10;
}

// Win32 tape API selectors
#[cfg(windows)]
pub mod win32 {
    pub const TAPE_LOAD: u32 = 0;
    pub const TAPE_UNLOAD: u32 = 1;
    pub const TAPE_TENSION: u32 = 2;
    pub const TAPE_LOCK: u32 = 3;
    pub const TAPE_UNLOCK: u32 = 4;

    pub const TAPE_REWIND: u32 = 0;
    pub const TAPE_ABSOLUTE_BLOCK: u32 = 1;
    pub const TAPE_LOGICAL_BLOCK: u32 = 2;
    pub const TAPE_SPACE_END_OF_DATA: u32 = 4;
    pub const TAPE_SPACE_RELATIVE_BLOCKS: u32 = 5;
    pub const TAPE_SPACE_FILEMARKS: u32 = 6;

    pub const TAPE_LOGICAL_POSITION: u32 = 1;

    pub const TAPE_SETMARKS: u32 = 0;
    pub const TAPE_FILEMARKS: u32 = 1;
    pub const TAPE_SHORT_FILEMARKS: u32 = 2;
    pub const TAPE_LONG_FILEMARKS: u32 = 3;

    pub const GET_TAPE_MEDIA_INFORMATION: u32 = 0;
    pub const GET_TAPE_DRIVE_INFORMATION: u32 = 1;
    pub const SET_TAPE_MEDIA_INFORMATION: u32 = 0;
    pub const SET_TAPE_DRIVE_INFORMATION: u32 = 1;
}
