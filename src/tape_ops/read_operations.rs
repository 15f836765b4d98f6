use super::header::{hash_file, FileHeader, MAX_HEADER_SIZE};
use super::TapeOperations;
use crate::device::{RecoveryAction, TapeCondition};
use crate::error::{Result, RustMtapeError};
use crate::script::LifecycleEvent;
use crate::utils::{self, volume_name};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Retries of media-changed and cleaning statuses per block
const MAX_READ_RETRIES: u32 = 10;

impl TapeOperations {
    /// Copy one tape file into `writer`, stopping at its end mark.
    ///
    /// With `limit` only that many bytes are written out; the rest of the
    /// tape file is still consumed so the tape ends up past the mark.
    pub async fn read_stream<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        limit: Option<u64>,
    ) -> Result<u64> {
        let (written, _) = self.read_tape_file(writer, limit).await?;
        Ok(written)
    }

    /// `read_stream` that also reports which condition ended the tape file
    async fn read_tape_file<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        limit: Option<u64>,
    ) -> Result<(u64, TapeCondition)> {
        self.ensure_open()?;
        let (max_block, _) = self.block_limits();
        let mut buffer = vec![0u8; max_block as usize];
        let mut written = 0u64;
        let mut retries = 0u32;

        let end = loop {
            let outcome = self.device.read(&mut buffer);
            match outcome.status.condition() {
                TapeCondition::Success => {
                    retries = 0;
                    let mut take = outcome.bytes as u64;
                    if let Some(limit) = limit {
                        take = take.min(limit.saturating_sub(written));
                    }
                    if take > 0 {
                        writer.write_all(&buffer[..take as usize]).await?;
                        written += take;
                    }
                }
                TapeCondition::FilemarkDetected
                | TapeCondition::SetmarkDetected
                | TapeCondition::EndOfData => {
                    debug!("End of tape file: {}", outcome.status);
                    break outcome.status.condition();
                }
                TapeCondition::EndOfMedia | TapeCondition::PhysicalEndOfTape => {
                    self.advance_read_volume().await?;
                }
                TapeCondition::MediaChanged | TapeCondition::BusReset => {
                    retries += 1;
                }
                TapeCondition::NoMedia => return Err(RustMtapeError::NoMedia),
                TapeCondition::RequiresCleaning => {
                    self.fire_event_logged(LifecycleEvent::Clean, "Drive requires cleaning")
                        .await;
                    retries += 1;
                }
                _ => {
                    let message = match outcome.status.condition().recovery() {
                        RecoveryAction::Alert(message) => message,
                        _ => format!("Aborted Error Code:{}", outcome.status.code()),
                    };
                    self.fire_event_logged(LifecycleEvent::Alert, &message).await;
                    return Err(RustMtapeError::tape_device(message));
                }
            }

            if retries > MAX_READ_RETRIES {
                let message = format!(
                    "Read aborted after {} retries, last status {}",
                    MAX_READ_RETRIES,
                    outcome.status.code()
                );
                self.fire_event_logged(LifecycleEvent::Alert, &message).await;
                return Err(RustMtapeError::tape_device(message));
            }
        };

        writer.flush().await?;
        Ok((written, end))
    }

    /// Restore the archived file at the current position.
    ///
    /// `output` may be a directory, in which case the archived name is used.
    pub async fn restore_entry(&mut self, output: &Path, overwrite: bool) -> Result<FileHeader> {
        let mut raw = Vec::new();
        self.read_stream(&mut raw, Some(MAX_HEADER_SIZE as u64))
            .await?;
        let header = FileHeader::parse(&raw)?;
        debug!("Header: {:?}", header);

        let target: PathBuf = if output.is_dir() {
            output.join(&header.name)
        } else {
            output.to_path_buf()
        };

        if target.exists() && !overwrite {
            let question = format!("{} exists. Overwrite?", target.display());
            if !self.operator.confirm(&question)? {
                return Err(RustMtapeError::operation_cancelled(format!(
                    "{} left unchanged",
                    target.display()
                )));
            }
        }

        let mut file = tokio::fs::File::create(&target).await.map_err(|e| {
            RustMtapeError::file_operation(format!("Cannot create {}: {}", target.display(), e))
        })?;
        let mut restored = 0u64;
        let mut advanced = false;
        loop {
            let remaining = header.file_size - restored;
            let (read, end) = self.read_tape_file(&mut file, Some(remaining)).await?;
            restored += read;
            // A mark written in the early-warning zone leaves the rest of
            // the file on the next volume.
            let exhausted = advanced && read == 0;
            if restored < header.file_size && end == TapeCondition::EndOfData && !exhausted {
                self.advance_read_volume().await?;
                advanced = true;
                continue;
            }
            break;
        }
        drop(file);

        if restored != header.file_size {
            return Err(RustMtapeError::tape_device(format!(
                "{}: restored {} of {} bytes",
                target.display(),
                restored,
                header.file_size
            )));
        }

        if let Some(expected) = &header.sha256 {
            let actual = hash_file(&target).await?;
            if &actual != expected {
                warn!("{}: SHA-256 mismatch after restore", target.display());
            } else {
                debug!("{}: SHA-256 verified", target.display());
            }
        }

        info!(
            "Restored {} ({})",
            target.display(),
            utils::format_bytes(restored)
        );
        Ok(header)
    }

    /// Find `name` in the catalog, mount its volume, seek and restore it
    pub async fn locate_and_restore(
        &mut self,
        name: &str,
        output: &Path,
        overwrite: bool,
    ) -> Result<FileHeader> {
        let path = Path::new(name);
        let location = match self.catalog.locate_path(path)? {
            Some(location) => Some(location),
            None => {
                let base = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| name.to_string());
                self.catalog.locate(&base, None)?
            }
        };
        let location = location.ok_or_else(|| {
            RustMtapeError::file_operation(format!("{} is not in the catalog", name))
        })?;

        info!(
            "{} is on {} at block {}",
            name,
            volume_name(location.volume),
            location.position
        );

        self.ensure_open()?;
        self.request_volume(location.volume).await?;
        let status = self.device.seek_logical(location.position);
        self.check_status(status, "Seek")?;

        self.restore_entry(output, overwrite).await
    }
}
