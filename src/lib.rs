//! RustMtape Library
//!
//! Multi-volume tape backup: a write/read engine with end-of-tape rollover,
//! a resumable write journal, a catalog of files and volumes, and a small
//! interpreter for operator lifecycle scripts.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod journal;
pub mod logger;
pub mod notify;
pub mod operator;
pub mod script;
pub mod tape_ops;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export key types for easier use
pub use catalog::{Catalog, FileLocation, FileRecord, VolumeRecord};
pub use device::{TapeDevice, TapeStatus, VirtualTapeDrive};
pub use error::{Result, RustMtapeError};
pub use journal::{ResumePlan, TransactionJournal};
pub use script::{LifecycleEvent, LifecycleScript};
pub use tape_ops::{TapeOperations, WriteOptions, WriteOutcome, WriteSummary};
