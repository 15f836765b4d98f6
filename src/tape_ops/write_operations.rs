use super::header::{hash_file, FileHeader};
use super::{TapeOperations, WriteOutcome};
use crate::catalog::FileRecord;
use crate::device::{RecoveryAction, TapemarkKind};
use crate::error::{Result, RustMtapeError};
use crate::script::LifecycleEvent;
use crate::utils::{self, split_catalog_path, volume_name};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Consecutive transient statuses tolerated for one block
pub const MAX_TRANSIENT_RETRIES: u32 = 10;

/// Where the first byte of a stream landed
#[derive(Debug, Clone, Copy)]
struct Placement {
    volume: u32,
    position: u64,
}

/// Totals of one backup run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub completed: u64,
    pub aborted: u64,
    pub skipped: u64,
    pub bytes: u64,
}

/// Files under `source` (or `source` itself), sorted
pub fn enumerate_sources(source: &Path) -> Result<Vec<String>> {
    if !source.exists() {
        return Err(RustMtapeError::file_operation(format!(
            "Source path does not exist: {}",
            source.display()
        )));
    }
    if source.is_file() {
        return Ok(vec![source.to_string_lossy().to_string()]);
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            RustMtapeError::file_operation(format!("Cannot enumerate {}: {}", source.display(), e))
        })?;
        if entry.file_type().is_file() {
            entries.push(entry.path().to_string_lossy().to_string());
        }
    }
    debug!("Enumerated {} files under {}", entries.len(), source.display());
    Ok(entries)
}

/// Read until `buffer` is full or the reader is exhausted
async fn fill_buffer<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

impl TapeOperations {
    /// Stream `reader` to tape as one tape file followed by a filemark.
    ///
    /// End of tape hands over to the rollover state machine and the same
    /// chunk continues on the next volume.
    pub async fn write_stream<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Result<WriteOutcome> {
        self.ensure_open()?;
        let (max_block, min_block) = self.block_limits();
        let mut buffer = vec![0u8; max_block as usize];
        let mut placement: Option<Placement> = None;
        let mut total = 0u64;

        loop {
            let filled = fill_buffer(reader, &mut buffer).await?;
            if filled == 0 {
                break;
            }

            let mut length = filled;
            let min = min_block as usize;
            if min > 1 && length % min != 0 {
                let padded = (length / min + 1) * min;
                buffer[length..padded].fill(0);
                length = padded;
            }

            if let Some(reason) = self.write_chunk(&buffer[..length], &mut placement).await? {
                return Ok(WriteOutcome::Aborted { reason });
            }
            total += filled as u64;

            if filled < buffer.len() {
                break;
            }
        }

        if placement.is_none() {
            let position = self.current_position()?;
            placement = Some(Placement {
                volume: self.volume,
                position,
            });
        }

        if let Some(reason) = self.write_end_of_file().await? {
            return Ok(WriteOutcome::Aborted { reason });
        }

        let placement = placement.ok_or_else(|| RustMtapeError::tape_device("no placement"))?;
        Ok(WriteOutcome::Completed {
            bytes: total,
            volume: placement.volume,
            position: placement.position,
        })
    }

    /// Write one chunk, resuming after partial writes.
    /// `Some(reason)` means an alert aborted the file.
    async fn write_chunk(
        &mut self,
        data: &[u8],
        placement: &mut Option<Placement>,
    ) -> Result<Option<String>> {
        let mut offset = 0;
        let mut retries = 0u32;

        while offset < data.len() {
            let candidate = if placement.is_none() {
                self.device.position().ok().map(|position| Placement {
                    volume: self.volume,
                    position,
                })
            } else {
                None
            };

            let outcome = self.device.write(&data[offset..]);
            if outcome.bytes > 0 {
                offset += outcome.bytes;
                if placement.is_none() {
                    *placement = candidate;
                }
            }

            match outcome.status.condition().recovery() {
                RecoveryAction::Proceed => {
                    if outcome.bytes == 0 {
                        retries += 1;
                    } else {
                        retries = 0;
                    }
                }
                RecoveryAction::Transient => {
                    debug!("Transient status during write: {}", outcome.status);
                    retries += 1;
                }
                RecoveryAction::Rollover => {
                    self.roll_over().await?;
                    retries = 0;
                }
                RecoveryAction::Clean => {
                    self.fire_event_logged(LifecycleEvent::Clean, "Drive requires cleaning")
                        .await;
                    retries += 1;
                }
                RecoveryAction::Fatal => return Err(RustMtapeError::NoMedia),
                RecoveryAction::Alert(message) => {
                    self.fire_event_logged(LifecycleEvent::Alert, &message).await;
                    return Ok(Some(message));
                }
            }

            if retries > MAX_TRANSIENT_RETRIES {
                let message = format!(
                    "Aborted after {} retries, last status {}",
                    MAX_TRANSIENT_RETRIES,
                    outcome.status.code()
                );
                self.fire_event_logged(LifecycleEvent::Alert, &message).await;
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Write the end-of-file mark
    async fn write_end_of_file(&mut self) -> Result<Option<String>> {
        let mut retries = 0u32;
        loop {
            let status = self.device.write_tapemark(1, TapemarkKind::Filemark);
            match status.condition().recovery() {
                RecoveryAction::Proceed => return Ok(None),
                RecoveryAction::Rollover => {
                    // The mark is written inside the early-warning zone.
                    self.roll_over().await?;
                    return Ok(None);
                }
                RecoveryAction::Transient => retries += 1,
                RecoveryAction::Clean => {
                    self.fire_event_logged(LifecycleEvent::Clean, "Drive requires cleaning")
                        .await;
                    retries += 1;
                }
                RecoveryAction::Fatal => return Err(RustMtapeError::NoMedia),
                RecoveryAction::Alert(message) => {
                    self.fire_event_logged(LifecycleEvent::Alert, &message).await;
                    return Ok(Some(message));
                }
            }
            if retries > MAX_TRANSIENT_RETRIES {
                let message = format!("Aborted writing file mark, last status {}", status.code());
                self.fire_event_logged(LifecycleEvent::Alert, &message).await;
                return Ok(Some(message));
            }
        }
    }

    /// Write one file (header + data) and catalogue it once both are on tape
    pub async fn write_entry(&mut self, path: &Path) -> Result<WriteOutcome> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            RustMtapeError::file_operation(format!("Unable to get file information: {}", e))
        })?;

        let sha256 = if self.write_options.hash_on_write {
            Some(hash_file(path).await?)
        } else {
            None
        };
        let header = FileHeader::from_metadata(path, &metadata, sha256);
        let header_bytes = header.to_bytes()?;

        info!(
            "Writing {} ({}) to {}",
            path.display(),
            utils::format_bytes(metadata.len()),
            volume_name(self.volume)
        );

        let (volume, position) = match self.write_stream(&mut header_bytes.as_slice()).await? {
            WriteOutcome::Completed {
                volume, position, ..
            } => (volume, position),
            aborted => {
                self.write_progress.files_aborted += 1;
                return Ok(aborted);
            }
        };

        let mut file = tokio::fs::File::open(path).await.map_err(|e| {
            RustMtapeError::file_operation(format!("Cannot open {}: {}", path.display(), e))
        })?;
        let data = self.write_stream(&mut file).await?;

        match &data {
            WriteOutcome::Completed { bytes, .. } => {
                let (name, directory) = split_catalog_path(path);
                let record = FileRecord::new(
                    &name,
                    &directory,
                    volume,
                    &header.modify_time,
                    *bytes,
                    position,
                );
                self.catalog.register_file(&record)?;
                self.write_progress.files_written += 1;
                self.write_progress.bytes_written += *bytes;
                Ok(WriteOutcome::Completed {
                    bytes: *bytes,
                    volume,
                    position,
                })
            }
            WriteOutcome::Aborted { reason } => {
                warn!("{} not catalogued: {}", path.display(), reason);
                self.write_progress.files_aborted += 1;
                Ok(WriteOutcome::Aborted {
                    reason: reason.clone(),
                })
            }
        }
    }

    /// Back up `entries` in order, journaling each one.
    ///
    /// With `fresh_journal` the intended log is replaced first; otherwise the
    /// run continues a journal already begun (resume, or a caller that had to
    /// position the tape after journaling).
    pub async fn write_files(&mut self, entries: &[String], fresh_journal: bool) -> Result<WriteSummary> {
        if fresh_journal {
            self.begin_journal(entries)?;
        } else {
            self.journal.reopen()?;
        }
        self.ensure_open()?;
        self.volume_known = true;

        self.fire_event_logged(LifecycleEvent::StartBackup, "").await;
        self.catalog.register_volume(self.volume)?;
        self.lock_media().await;

        let progress = if self.write_options.show_progress {
            let bar = ProgressBar::new(entries.len() as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{bar:40} {pos}/{len} {msg}")
            {
                bar.set_style(style);
            }
            Some(bar)
        } else {
            None
        };

        let mut summary = WriteSummary::default();
        let result = self.write_each(entries, &mut summary, progress.as_ref()).await;

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }
        self.unlock_media();
        result?;

        self.fire_event_logged(LifecycleEvent::EndBackup, "").await;
        info!(
            "Backup finished: {} written, {} aborted, {} skipped, {} on tape",
            summary.completed,
            summary.aborted,
            summary.skipped,
            utils::format_bytes(summary.bytes)
        );
        Ok(summary)
    }

    async fn write_each(
        &mut self,
        entries: &[String],
        summary: &mut WriteSummary,
        progress: Option<&ProgressBar>,
    ) -> Result<()> {
        for entry in entries {
            if let Some(bar) = progress {
                bar.set_message(entry.clone());
            }
            let path = PathBuf::from(entry);

            if !path.is_file() {
                warn!("Skipping {}: not a readable file", entry);
                summary.skipped += 1;
                self.write_progress.files_skipped += 1;
            } else {
                match self.write_entry(&path).await {
                    Ok(WriteOutcome::Completed { bytes, .. }) => {
                        summary.completed += 1;
                        summary.bytes += bytes;
                    }
                    Ok(WriteOutcome::Aborted { .. }) => summary.aborted += 1,
                    Err(e) if e.is_fatal() || is_hook_failure(&e) => return Err(e),
                    Err(RustMtapeError::Catalog(e)) => return Err(RustMtapeError::Catalog(e)),
                    Err(e) => {
                        warn!("{} failed: {}", entry, e);
                        summary.aborted += 1;
                    }
                }
            }

            self.journal.record_completed(entry)?;
            if let Some(bar) = progress {
                bar.inc(1);
            }
        }
        Ok(())
    }
}

fn is_hook_failure(error: &RustMtapeError) -> bool {
    matches!(error, RustMtapeError::LifecycleHookFailed { .. })
}
