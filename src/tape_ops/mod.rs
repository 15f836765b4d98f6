//! Tape write/read engine
//!
//! [`TapeOperations`] owns the device handle for one command invocation and
//! drives it through backups, restores, volume rollover and resumes.

pub mod core;
pub mod header;
pub mod read_operations;
pub mod resume;
pub mod volume;
pub mod write_operations;

pub use self::core::*;
pub use header::FileHeader;
pub use write_operations::{enumerate_sources, WriteSummary, MAX_TRANSIENT_RETRIES};

/// Where the rollover state machine currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverState {
    /// Reading or writing the current volume
    Active,
    /// End of tape seen; the volume is being rewound and unloaded
    EjectPending,
    /// Waiting for the operator or the script to mount the next volume
    AwaitingNextVolume,
}

/// Write progress information
#[derive(Debug, Clone, Default)]
pub struct WriteProgress {
    pub files_written: u64,
    pub files_aborted: u64,
    pub files_skipped: u64,
    pub bytes_written: u64,
    pub rollovers: u32,
}

/// Write options configuration
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Store a SHA-256 of each file in its header
    pub hash_on_write: bool,
    /// Override of the drive's maximum block size
    pub block_size: Option<u32>,
    pub show_progress: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            hash_on_write: true,
            block_size: None,
            show_progress: false,
        }
    }
}

/// Result of streaming one tape file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Data and end-of-file mark are on tape
    Completed {
        bytes: u64,
        /// Volume and logical block where the first byte landed
        volume: u32,
        position: u64,
    },
    /// An alert condition stopped this file; nothing was registered
    Aborted { reason: String },
}

impl WriteOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, WriteOutcome::Completed { .. })
    }
}
