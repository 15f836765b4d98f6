//! Command Handlers Module
//!
//! This module contains handlers for all CLI subcommands.

pub mod catalog;
pub mod read;
pub mod resume;
pub mod tape;
pub mod write;

use rust_mtape::catalog::Catalog;
use rust_mtape::config::MtapeConfig;
use rust_mtape::device;
use rust_mtape::error::Result;
use rust_mtape::journal::TransactionJournal;
use rust_mtape::notify::{CommandMailer, MailTransport};
use rust_mtape::operator::{AutoConfirm, ConsolePrompt, OperatorPrompt};
use rust_mtape::script::LifecycleScript;
use rust_mtape::tape_ops::TapeOperations;
use tracing::debug;

/// Wire a `TapeOperations` from the effective configuration.
/// `force` answers every operator prompt automatically.
pub fn build_operations(
    config: &MtapeConfig,
    force: bool,
    show_progress: bool,
) -> Result<TapeOperations> {
    let device = device::create_device(&config.device)?;
    let device_path = device::device_path(&config.device);
    debug!("Using device {}", device_path);

    let mut ops = TapeOperations::new(
        device,
        &device_path,
        Catalog::new(&config.catalog_path),
        TransactionJournal::new(&config.journal_dir),
    );

    let script = match &config.script {
        Some(path) => Some(LifecycleScript::load(path)?),
        None => None,
    };
    ops.set_script(script);

    let mailer: Option<Box<dyn MailTransport>> = if config.mail_command.is_empty() {
        None
    } else {
        Some(Box::new(CommandMailer::new(config.mail_command.clone())?))
    };
    ops.set_mailer(mailer);

    let operator: Box<dyn OperatorPrompt> = if force {
        Box::new(AutoConfirm)
    } else {
        Box::new(ConsolePrompt)
    };
    ops.set_operator(operator);

    ops.set_timing(
        config.poll_interval(),
        config.lock_attempts,
        config.detect_attempts,
    );
    ops.set_write_options(config.write_options(show_progress));
    Ok(ops)
}
