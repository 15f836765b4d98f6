use super::{RolloverState, WriteOptions, WriteProgress};
use crate::catalog::Catalog;
use crate::device::block_sizes::{DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MIN_BLOCK_SIZE};
use crate::device::{
    timing, DriveParameters, MediaParameters, TapeCondition, TapeDevice, TapeStatus,
    TapemarkKind,
};
use crate::error::{Result, RustMtapeError};
use crate::journal::TransactionJournal;
use crate::notify::{MailMessage, MailTransport};
use crate::operator::{ConsolePrompt, OperatorPrompt};
use crate::script::{LifecycleEvent, LifecycleScript, ScriptHost};
use crate::utils::volume_name;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tape operations for one command invocation.
///
/// Holds the only device handle of the process; it is opened lazily and
/// closed when this value is dropped, on success and error paths alike.
pub struct TapeOperations {
    pub(crate) device: Box<dyn TapeDevice>,
    pub(crate) device_path: String,
    pub(crate) catalog: Catalog,
    pub(crate) journal: TransactionJournal,
    pub(crate) script: Option<Arc<LifecycleScript>>,
    pub(crate) operator: Box<dyn OperatorPrompt>,
    pub(crate) mailer: Option<Box<dyn MailTransport>>,
    pub(crate) volume: u32,
    pub(crate) volume_known: bool,
    pub(crate) rollover_state: RolloverState,
    pub(crate) write_options: WriteOptions,
    pub(crate) write_progress: WriteProgress,
    pub(crate) fired_events: Vec<LifecycleEvent>,
    pub(crate) poll_interval: Duration,
    pub(crate) lock_attempts: u32,
    pub(crate) detect_attempts: Option<u32>,
    block_limits: Option<(u32, u32)>,
}

impl TapeOperations {
    /// Create new tape operations instance
    pub fn new(
        device: Box<dyn TapeDevice>,
        device_path: &str,
        catalog: Catalog,
        journal: TransactionJournal,
    ) -> Self {
        Self {
            device,
            device_path: device_path.to_string(),
            catalog,
            journal,
            script: None,
            operator: Box::new(ConsolePrompt),
            mailer: None,
            volume: 0,
            volume_known: false,
            rollover_state: RolloverState::Active,
            write_options: WriteOptions::default(),
            write_progress: WriteProgress::default(),
            fired_events: Vec::new(),
            poll_interval: Duration::from_millis(timing::TAPE_READY_POLL_MS),
            lock_attempts: timing::LOCK_MAX_ATTEMPTS,
            detect_attempts: None,
            block_limits: None,
        }
    }

    pub fn set_script(&mut self, script: Option<LifecycleScript>) {
        self.script = script.map(Arc::new);
    }

    pub fn set_operator(&mut self, operator: Box<dyn OperatorPrompt>) {
        self.operator = operator;
    }

    pub fn set_mailer(&mut self, mailer: Option<Box<dyn MailTransport>>) {
        self.mailer = mailer;
    }

    /// Set write options
    pub fn set_write_options(&mut self, options: WriteOptions) {
        self.write_options = options;
        self.block_limits = None;
    }

    /// Polling period, lock retries and the tape-ready poll limit
    pub fn set_timing(&mut self, poll_interval: Duration, lock_attempts: u32, detect_attempts: Option<u32>) {
        self.poll_interval = poll_interval;
        self.lock_attempts = lock_attempts.max(1);
        self.detect_attempts = detect_attempts;
    }

    /// Declare which volume is mounted
    pub fn set_volume(&mut self, volume: u32) {
        self.volume = volume;
        self.volume_known = true;
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn rollover_state(&self) -> RolloverState {
        self.rollover_state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn journal(&self) -> &TransactionJournal {
        &self.journal
    }

    /// Replace the intended journal with `entries`; no device I/O
    pub fn begin_journal(&mut self, entries: &[String]) -> Result<()> {
        self.journal.begin(entries)
    }

    /// Get current write progress
    pub fn get_write_progress(&self) -> &WriteProgress {
        &self.write_progress
    }

    /// Lifecycle events fired so far, in order
    pub fn fired_events(&self) -> &[LifecycleEvent] {
        &self.fired_events
    }

    /// Open the device if it is not open yet
    pub fn ensure_open(&mut self) -> Result<()> {
        if self.device.is_open() {
            return Ok(());
        }
        let status = self.device.open(&self.device_path);
        if !status.is_success() {
            return Err(RustMtapeError::tape_device(format!(
                "Cannot open device {}: {}",
                self.device_path, status
            )));
        }
        info!("Tape device opened: {}", self.device_path);
        Ok(())
    }

    pub fn close(&mut self) {
        if self.device.is_open() {
            self.device.close();
            debug!("Tape device closed: {}", self.device_path);
        }
    }

    /// Map a device status to a `Result`
    pub(crate) fn check_status(&self, status: TapeStatus, operation: &str) -> Result<()> {
        match status.condition() {
            TapeCondition::Success => Ok(()),
            TapeCondition::NoMedia => Err(RustMtapeError::NoMedia),
            _ => Err(RustMtapeError::tape_device(format!(
                "{} failed: {}",
                operation, status
            ))),
        }
    }

    /// (maximum, minimum) block size used to chunk streams
    pub(crate) fn block_limits(&mut self) -> (u32, u32) {
        if let Some(limits) = self.block_limits {
            return limits;
        }
        let (drive_max, drive_min) = match self.device.drive_parameters() {
            Ok(params) => (
                params.maximum_block_size.max(1),
                params.minimum_block_size.max(1),
            ),
            Err(status) => {
                debug!("Drive parameters unavailable ({}), using defaults", status);
                (DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MIN_BLOCK_SIZE)
            }
        };
        let max = match self.write_options.block_size {
            Some(size) if size >= drive_min => size.min(drive_max),
            Some(size) => {
                warn!(
                    "Block size {} is below the drive minimum {}, using {}",
                    size, drive_min, drive_min
                );
                drive_min
            }
            None => drive_max,
        };
        let min = drive_min.min(max);
        // chunks stay a whole number of minimum blocks
        let limits = ((max / min) * min, min);
        debug!("Block limits: max {} min {}", limits.0, limits.1);
        self.block_limits = Some(limits);
        limits
    }

    /// Current logical block
    pub fn current_position(&mut self) -> Result<u64> {
        self.ensure_open()?;
        match self.device.position() {
            Ok(position) => Ok(position),
            Err(status) => {
                self.check_status(status, "Get position")?;
                Err(RustMtapeError::tape_device("Get position failed"))
            }
        }
    }

    /// Lock the media in the drive; bounded retries, failure is not fatal
    pub async fn lock_media(&mut self) -> bool {
        if self.ensure_open().is_err() {
            return false;
        }
        for attempt in 1..=self.lock_attempts {
            let status = self.device.lock();
            if status.is_success() {
                debug!("Media locked (attempt {})", attempt);
                return true;
            }
            debug!("Lock attempt {} failed: {}", attempt, status);
            if attempt < self.lock_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        warn!(
            "Unable to lock media after {} attempts, continuing unlocked",
            self.lock_attempts
        );
        false
    }

    pub fn unlock_media(&mut self) {
        let status = self.device.unlock();
        if !status.is_success() {
            warn!("Unlock failed: {}", status);
        }
    }

    /// Unlock, rewind and unload the current cartridge. Failures are logged.
    pub fn eject_current(&mut self) {
        if let Err(e) = self.ensure_open() {
            warn!("Eject skipped: {}", e);
            return;
        }
        let unlock = self.device.unlock();
        if !unlock.is_success() {
            warn!("Unlock before eject failed: {}", unlock);
        }
        let rewind = self.device.rewind();
        if !rewind.is_success() {
            warn!("Rewind before eject failed: {}", rewind);
        }
        let unload = self.device.unload();
        if !unload.is_success() {
            warn!("Unload failed: {}", unload);
        } else {
            info!("{} ejected", volume_name(self.volume));
        }
    }

    /// Run the lifecycle script for `event`.
    /// A failing hook comes back as `LifecycleHookFailed`.
    pub async fn fire_event(&mut self, event: LifecycleEvent, message: &str) -> Result<()> {
        self.fired_events.push(event);
        if matches!(event, LifecycleEvent::Alert | LifecycleEvent::Clean) {
            error!("{}: {}", event, message);
        } else {
            info!("Lifecycle event: {} {}", event, message);
        }

        let script = match &self.script {
            Some(script) => Arc::clone(script),
            None => return Ok(()),
        };
        let volume = self.volume;
        let outcome = script.invoke(event, volume, message, self).await;
        if outcome.is_success() {
            Ok(())
        } else {
            Err(RustMtapeError::hook_failed(
                event,
                outcome
                    .failure
                    .unwrap_or_else(|| format!("status {}", outcome.status)),
            ))
        }
    }

    /// Fire an event whose hook failure must not stop the run
    pub async fn fire_event_logged(&mut self, event: LifecycleEvent, message: &str) {
        if let Err(e) = self.fire_event(event, message).await {
            warn!("{}", e);
        }
    }

    /// Poll the drive until a freshly loaded tape reports a position
    pub async fn detect_new_tape(&mut self) -> Result<()> {
        self.ensure_open()?;
        let load = self.device.load();
        if !load.is_success() {
            debug!("Load before detection returned {}", load);
        }

        let mut polls = 0u32;
        loop {
            match self.device.position() {
                Ok(position) => {
                    info!("Tape ready at block {}", position);
                    return Ok(());
                }
                Err(status) => debug!("Tape not ready: {}", status),
            }
            polls += 1;
            if let Some(limit) = self.detect_attempts {
                if polls >= limit {
                    return Err(RustMtapeError::tape_device(format!(
                        "No tape became ready after {} polls",
                        polls
                    )));
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    // ================== Direct device commands ==================

    pub fn rewind(&mut self) -> Result<()> {
        self.ensure_open()?;
        let status = self.device.rewind();
        self.check_status(status, "Rewind")
    }

    /// Rewind and unload
    pub fn eject(&mut self) -> Result<()> {
        self.ensure_open()?;
        let status = self.device.rewind();
        self.check_status(status, "Rewind")?;
        let status = self.device.unload();
        self.check_status(status, "Unload")
    }

    pub fn load(&mut self) -> Result<()> {
        self.ensure_open()?;
        let status = self.device.load();
        self.check_status(status, "Load")
    }

    pub fn lock(&mut self) -> Result<()> {
        self.ensure_open()?;
        let status = self.device.lock();
        self.check_status(status, "Lock")
    }

    pub fn unlock(&mut self) -> Result<()> {
        self.ensure_open()?;
        let status = self.device.unlock();
        self.check_status(status, "Unlock")
    }

    pub fn retension(&mut self) -> Result<()> {
        self.ensure_open()?;
        let status = self.device.adjust_tension();
        self.check_status(status, "Retension")
    }

    pub fn seek(&mut self, block: u64, absolute: bool) -> Result<()> {
        self.ensure_open()?;
        let status = if absolute {
            self.device.seek_absolute(block)
        } else {
            self.device.seek_logical(block)
        };
        self.check_status(status, "Seek")
    }

    pub fn seek_end_of_data(&mut self) -> Result<()> {
        self.ensure_open()?;
        let status = self.device.seek_end_of_data();
        self.check_status(status, "Seek to end of data")
    }

    pub fn write_filemarks(&mut self, count: u32) -> Result<()> {
        self.ensure_open()?;
        let status = self.device.write_tapemark(count, TapemarkKind::Filemark);
        self.check_status(status, "Write filemark")
    }

    pub fn space_filemarks(&mut self, count: i64) -> Result<()> {
        self.ensure_open()?;
        let status = self.device.space_filemarks(count);
        self.check_status(status, "Space filemarks")
    }

    pub fn drive_info(&mut self) -> Result<(DriveParameters, Option<MediaParameters>)> {
        self.ensure_open()?;
        let drive = match self.device.drive_parameters() {
            Ok(params) => params,
            Err(status) => {
                return Err(RustMtapeError::tape_device(format!(
                    "Get drive parameters failed: {}",
                    status
                )))
            }
        };
        let media = self.device.media_parameters().ok();
        Ok((drive, media))
    }
}

impl Drop for TapeOperations {
    fn drop(&mut self) {
        self.close();
    }
}

impl ScriptHost for TapeOperations {
    async fn eject(&mut self) {
        self.eject_current();
    }

    async fn wait_for_key(&mut self, prompt: &str) -> Result<()> {
        self.operator.wait_for_key(prompt)
    }

    async fn detect_new_tape(&mut self) -> Result<()> {
        TapeOperations::detect_new_tape(self).await
    }

    async fn send_mail(&mut self, message: &MailMessage) -> Result<()> {
        match &self.mailer {
            Some(mailer) => mailer.send(message),
            None => Err(RustMtapeError::config(
                "sendmail() needs a mail transport (set mail_command in the configuration)",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::VirtualTapeDrive;
    use tempfile::TempDir;

    fn operations(drive: &VirtualTapeDrive, dir: &TempDir) -> TapeOperations {
        let mut ops = TapeOperations::new(
            Box::new(drive.clone()),
            "virtual",
            Catalog::new(dir.path().join("catalog.db")),
            TransactionJournal::new(dir.path()),
        );
        ops.set_timing(Duration::from_millis(1), 3, Some(5));
        ops
    }

    #[tokio::test]
    async fn test_lock_retries_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let drive = VirtualTapeDrive::with_blank_cartridges(1);
        drive.fail_lock_attempts(2);
        let mut ops = operations(&drive, &dir);

        assert!(ops.lock_media().await);
        assert!(drive.is_locked());
    }

    #[tokio::test]
    async fn test_lock_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let drive = VirtualTapeDrive::with_blank_cartridges(1);
        drive.fail_lock_attempts(10);
        let mut ops = operations(&drive, &dir);

        assert!(!ops.lock_media().await);
        assert!(!drive.is_locked());
    }

    #[tokio::test]
    async fn test_detect_new_tape_polls_until_ready() {
        let dir = TempDir::new().unwrap();
        let drive = VirtualTapeDrive::new();
        drive.add_pending_cartridge(crate::device::Cartridge::blank("NEXT"));
        drive.set_not_ready_polls_after_load(3);
        let mut ops = operations(&drive, &dir);

        assert!(ops.detect_new_tape().await.is_ok());
        assert_eq!(drive.load_count(), 1);
    }

    #[tokio::test]
    async fn test_detect_new_tape_gives_up() {
        let dir = TempDir::new().unwrap();
        let drive = VirtualTapeDrive::new();
        let mut ops = operations(&drive, &dir);
        assert!(ops.detect_new_tape().await.is_err());
    }

    #[test]
    fn test_device_closed_on_drop() {
        let dir = TempDir::new().unwrap();
        let drive = VirtualTapeDrive::with_blank_cartridges(1);
        {
            let mut ops = operations(&drive, &dir);
            ops.ensure_open().unwrap();
            ops.ensure_open().unwrap();
            assert!(drive.is_open());
        }
        assert!(!drive.is_open());
    }

    #[test]
    fn test_block_limits_honor_override() {
        let dir = TempDir::new().unwrap();
        let drive = VirtualTapeDrive::with_blank_cartridges(1);
        drive.set_block_limits(65536, 512);
        let mut ops = operations(&drive, &dir);
        ops.set_write_options(WriteOptions {
            block_size: Some(1 << 20),
            ..WriteOptions::default()
        });
        assert_eq!(ops.block_limits(), (65536, 512));
    }

    #[test]
    fn test_no_media_maps_to_fatal_error() {
        let dir = TempDir::new().unwrap();
        let drive = VirtualTapeDrive::new();
        let mut ops = operations(&drive, &dir);
        assert!(matches!(ops.rewind(), Err(RustMtapeError::NoMedia)));
    }
}
