use thiserror::Error;

use crate::script::LifecycleEvent;

pub type Result<T> = std::result::Result<T, RustMtapeError>;

#[derive(Error, Debug)]
pub enum RustMtapeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tape device error: {0}")]
    TapeDevice(String),

    #[error("There is no tape in the drive")]
    NoMedia,

    #[error("File operation error: {0}")]
    FileOperation(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("Transaction journal error: {0}")]
    Journal(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Lifecycle hook '{event}' failed: {detail}")]
    LifecycleHookFailed { event: LifecycleEvent, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Parameter validation error: {0}")]
    ParameterValidation(String),

    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl RustMtapeError {
    pub fn tape_device<T: Into<String>>(msg: T) -> Self {
        Self::TapeDevice(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        Self::FileOperation(msg.into())
    }

    pub fn journal<T: Into<String>>(msg: T) -> Self {
        Self::Journal(msg.into())
    }

    pub fn script<T: Into<String>>(msg: T) -> Self {
        Self::Script(msg.into())
    }

    pub fn hook_failed<T: Into<String>>(event: LifecycleEvent, detail: T) -> Self {
        Self::LifecycleHookFailed {
            event,
            detail: detail.into(),
        }
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse<T: Into<String>>(msg: T) -> Self {
        Self::Parse(msg.into())
    }

    pub fn parameter_validation<T: Into<String>>(msg: T) -> Self {
        Self::ParameterValidation(msg.into())
    }

    pub fn operation_cancelled<T: Into<String>>(msg: T) -> Self {
        Self::OperationCancelled(msg.into())
    }

    pub fn unsupported<T: Into<String>>(msg: T) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Errors that must end the process rather than the current file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoMedia)
    }
}
