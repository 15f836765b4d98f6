use super::constants::status_codes::*;
use std::fmt;

/// Raw status code returned by every device port call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapeStatus(pub u32);

impl TapeStatus {
    pub const SUCCESS: TapeStatus = TapeStatus(NO_ERROR);

    pub fn code(&self) -> u32 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        self.0 == NO_ERROR
    }

    pub fn condition(&self) -> TapeCondition {
        TapeCondition::from_code(self.0)
    }
}

impl From<u32> for TapeStatus {
    fn from(code: u32) -> Self {
        TapeStatus(code)
    }
}

impl fmt::Display for TapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.condition().description())
    }
}

/// Classified device condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeCondition {
    Success,
    ControllerFault,
    EndOfMedia,
    PhysicalEndOfTape,
    FilemarkDetected,
    SetmarkDetected,
    BeginningOfMedia,
    EndOfData,
    InvalidBlockLength,
    MediaChanged,
    BusReset,
    NoMedia,
    RequiresCleaning,
    WriteProtected,
    NotSupported,
    Other(u32),
}

impl TapeCondition {
    pub fn from_code(code: u32) -> Self {
        match code {
            NO_ERROR => TapeCondition::Success,
            ERROR_MORE_DATA => TapeCondition::ControllerFault,
            ERROR_END_OF_MEDIA => TapeCondition::EndOfMedia,
            ERROR_EOM_OVERFLOW => TapeCondition::PhysicalEndOfTape,
            ERROR_FILEMARK_DETECTED => TapeCondition::FilemarkDetected,
            ERROR_SETMARK_DETECTED => TapeCondition::SetmarkDetected,
            ERROR_BEGINNING_OF_MEDIA => TapeCondition::BeginningOfMedia,
            ERROR_NO_DATA_DETECTED => TapeCondition::EndOfData,
            ERROR_INVALID_BLOCK_LENGTH => TapeCondition::InvalidBlockLength,
            ERROR_MEDIA_CHANGED => TapeCondition::MediaChanged,
            ERROR_BUS_RESET => TapeCondition::BusReset,
            ERROR_NO_MEDIA_IN_DRIVE => TapeCondition::NoMedia,
            ERROR_DEVICE_REQUIRES_CLEANING => TapeCondition::RequiresCleaning,
            ERROR_WRITE_PROTECT => TapeCondition::WriteProtected,
            ERROR_NOT_SUPPORTED => TapeCondition::NotSupported,
            other => TapeCondition::Other(other),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TapeCondition::Success => "success",
            TapeCondition::ControllerFault => "SCSI controller problem",
            TapeCondition::EndOfMedia => "end of tape marker reached",
            TapeCondition::PhysicalEndOfTape => "physical end of tape",
            TapeCondition::FilemarkDetected => "file mark detected",
            TapeCondition::SetmarkDetected => "set mark detected",
            TapeCondition::BeginningOfMedia => "beginning of media",
            TapeCondition::EndOfData => "end of data",
            TapeCondition::InvalidBlockLength => "invalid block size",
            TapeCondition::MediaChanged => "media changed",
            TapeCondition::BusReset => "bus reset",
            TapeCondition::NoMedia => "no media in drive",
            TapeCondition::RequiresCleaning => "drive requires cleaning",
            TapeCondition::WriteProtected => "media is write protected",
            TapeCondition::NotSupported => "operation not supported",
            TapeCondition::Other(_) => "device error",
        }
    }

    pub fn is_end_of_tape(&self) -> bool {
        matches!(
            self,
            TapeCondition::EndOfMedia | TapeCondition::PhysicalEndOfTape
        )
    }

    /// Recovery action the write/read engine takes for this condition
    pub fn recovery(&self) -> RecoveryAction {
        match self {
            TapeCondition::Success => RecoveryAction::Proceed,
            TapeCondition::MediaChanged
            | TapeCondition::FilemarkDetected
            | TapeCondition::SetmarkDetected => RecoveryAction::Transient,
            TapeCondition::EndOfMedia | TapeCondition::PhysicalEndOfTape => {
                RecoveryAction::Rollover
            }
            TapeCondition::RequiresCleaning => RecoveryAction::Clean,
            TapeCondition::NoMedia => RecoveryAction::Fatal,
            TapeCondition::ControllerFault => {
                RecoveryAction::Alert("Aborted due to SCSI Controller problem.".to_string())
            }
            TapeCondition::InvalidBlockLength => {
                RecoveryAction::Alert("Aborted due to invalid block size.".to_string())
            }
            other => RecoveryAction::Alert(format!(
                "Aborted Error Code:{}",
                other.raw_code()
            )),
        }
    }

    fn raw_code(&self) -> u32 {
        match self {
            TapeCondition::Success => NO_ERROR,
            TapeCondition::ControllerFault => ERROR_MORE_DATA,
            TapeCondition::EndOfMedia => ERROR_END_OF_MEDIA,
            TapeCondition::PhysicalEndOfTape => ERROR_EOM_OVERFLOW,
            TapeCondition::FilemarkDetected => ERROR_FILEMARK_DETECTED,
            TapeCondition::SetmarkDetected => ERROR_SETMARK_DETECTED,
            TapeCondition::BeginningOfMedia => ERROR_BEGINNING_OF_MEDIA,
            TapeCondition::EndOfData => ERROR_NO_DATA_DETECTED,
            TapeCondition::InvalidBlockLength => ERROR_INVALID_BLOCK_LENGTH,
            TapeCondition::MediaChanged => ERROR_MEDIA_CHANGED,
            TapeCondition::BusReset => ERROR_BUS_RESET,
            TapeCondition::NoMedia => ERROR_NO_MEDIA_IN_DRIVE,
            TapeCondition::RequiresCleaning => ERROR_DEVICE_REQUIRES_CLEANING,
            TapeCondition::WriteProtected => ERROR_WRITE_PROTECT,
            TapeCondition::NotSupported => ERROR_NOT_SUPPORTED,
            TapeCondition::Other(code) => *code,
        }
    }
}

/// What the engine does after a device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    Proceed,
    /// Absorbed silently; the loop continues
    Transient,
    /// Volume exhausted, hand over to the rollover state machine
    Rollover,
    /// Fire the `Clean` lifecycle event and keep going
    Clean,
    /// Fire the `Alert` lifecycle event and abort the current file
    Alert(String),
    /// Terminate the process
    Fatal,
}

/// Bytes moved by a read or write call plus its status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoOutcome {
    pub bytes: usize,
    pub status: TapeStatus,
}

impl IoOutcome {
    pub fn new(bytes: usize, status: TapeStatus) -> Self {
        Self { bytes, status }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapemarkKind {
    Filemark,
    Setmark,
    ShortFilemark,
    LongFilemark,
}

/// Drive capabilities (GetDriveParameters)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveParameters {
    pub ecc: bool,
    pub compression: bool,
    pub data_padding: bool,
    pub report_setmarks: bool,
    pub default_block_size: u32,
    pub maximum_block_size: u32,
    pub minimum_block_size: u32,
    pub maximum_partition_count: u32,
    pub eot_warning_zone_size: u32,
}

impl Default for DriveParameters {
    fn default() -> Self {
        use super::constants::block_sizes::*;
        Self {
            ecc: false,
            compression: false,
            data_padding: false,
            report_setmarks: false,
            default_block_size: 65536,
            maximum_block_size: DEFAULT_MAX_BLOCK_SIZE,
            minimum_block_size: DEFAULT_MIN_BLOCK_SIZE,
            maximum_partition_count: 1,
            eot_warning_zone_size: 0,
        }
    }
}

/// Loaded media information (GetMediaParameters)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaParameters {
    pub capacity: u64,
    pub remaining: u64,
    pub block_size: u32,
    pub partition_count: u32,
    pub write_protected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_of_tape_codes_roll_over() {
        assert_eq!(
            TapeStatus(ERROR_END_OF_MEDIA).condition().recovery(),
            RecoveryAction::Rollover
        );
        assert_eq!(
            TapeStatus(ERROR_EOM_OVERFLOW).condition().recovery(),
            RecoveryAction::Rollover
        );
    }

    #[test]
    fn test_transient_and_fatal_codes() {
        assert_eq!(
            TapeStatus(ERROR_MEDIA_CHANGED).condition().recovery(),
            RecoveryAction::Transient
        );
        assert_eq!(
            TapeStatus(ERROR_NO_MEDIA_IN_DRIVE).condition().recovery(),
            RecoveryAction::Fatal
        );
        assert_eq!(
            TapeStatus(ERROR_DEVICE_REQUIRES_CLEANING)
                .condition()
                .recovery(),
            RecoveryAction::Clean
        );
    }

    #[test]
    fn test_alert_messages_carry_cause() {
        match TapeStatus(ERROR_INVALID_BLOCK_LENGTH).condition().recovery() {
            RecoveryAction::Alert(msg) => assert!(msg.contains("invalid block size")),
            other => panic!("unexpected action {:?}", other),
        }
        match TapeStatus(4242).condition().recovery() {
            RecoveryAction::Alert(msg) => assert_eq!(msg, "Aborted Error Code:4242"),
            other => panic!("unexpected action {:?}", other),
        }
        match TapeStatus(ERROR_WRITE_PROTECT).condition().recovery() {
            RecoveryAction::Alert(msg) => assert_eq!(msg, "Aborted Error Code:19"),
            other => panic!("unexpected action {:?}", other),
        }
    }
}
