use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rustmtape")]
#[command(about = "Multi-volume tape backup with resumable writes and lifecycle scripts")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Specify configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Tape drive (TAPE0, \\.\TAPE1 or "virtual")
    #[arg(short = 'f', long, global = true)]
    pub device: Option<String>,

    /// Lifecycle script run at backup events
    #[arg(long, value_name = "SCRIPT", global = true)]
    pub newtape: Option<PathBuf>,

    /// Append every log message to this file
    #[arg(short = 'L', long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Append warnings and errors to this file
    #[arg(long, global = true)]
    pub error_log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up a file or folder starting a new volume
    Write {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Logical block to start writing at
        #[arg(long)]
        position: Option<u64>,

        /// Show a progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Back up the files named in a list (one path per line)
    Writelist {
        #[arg(value_name = "LIST")]
        list: PathBuf,

        #[arg(short, long)]
        progress: bool,
    },

    /// Back up after the end of data on the mounted volume
    Append {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[arg(short, long)]
        progress: bool,
    },

    /// Continue the last interrupted backup
    Resume {
        #[arg(short, long)]
        progress: bool,
    },

    /// Restore the file at the current tape position
    Read {
        /// Output file or directory
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Overwrite without asking
        #[arg(long)]
        force: bool,
    },

    /// Find a file in the catalog, mount its volume and restore it
    Locate {
        /// Archived file (full source path or base name)
        #[arg(value_name = "FILE")]
        file: String,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[arg(long)]
        force: bool,
    },

    /// Mark a catalogued file as deleted
    Delete {
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Recreate the catalog
    Init {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// List catalogued files
    List {
        /// Include deleted files
        #[arg(long)]
        all: bool,

        /// List volumes instead of files
        #[arg(long)]
        volumes: bool,

        /// Export the listing as CSV
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },

    /// Direct drive commands
    Tape {
        #[command(subcommand)]
        action: TapeCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TapeCommand {
    Rewind,
    /// Rewind and unload
    Eject,
    Load,
    /// Prevent media removal
    Lock,
    Unlock,
    /// Show the current logical block
    Tell,
    Seek {
        block: u64,
        /// Use an absolute instead of a logical block address
        #[arg(long)]
        absolute: bool,
    },
    /// Move to end of data
    Eod,
    /// Write file marks
    Weof {
        #[arg(default_value = "1")]
        count: u32,
    },
    /// Space forward over file marks
    Fsf {
        #[arg(default_value = "1")]
        count: u32,
    },
    /// Space backward over file marks
    Bsf {
        #[arg(default_value = "1")]
        count: u32,
    },
    Retension,
    /// Drive and media parameters
    Info,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
