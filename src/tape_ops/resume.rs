//! Resuming an interrupted backup

use super::write_operations::WriteSummary;
use super::TapeOperations;
use crate::error::Result;
use crate::utils::volume_name;
use std::path::Path;
use tracing::{info, warn};

impl TapeOperations {
    /// Continue the last backup from the journal.
    ///
    /// The last entry both logs agree on is written again, starting at the
    /// catalogued position of its header, because its end-of-file mark may
    /// never have reached the tape. Running this twice without writing in
    /// between replays the same plan.
    pub async fn resume(&mut self) -> Result<WriteSummary> {
        let plan = self.journal.prepare_resume()?;
        if plan.is_empty() {
            info!("Nothing to resume");
            return Ok(WriteSummary::default());
        }
        info!("Resuming with {} entries", plan.remaining.len());
        self.ensure_open()?;

        let anchor_location = match &plan.anchor {
            Some(anchor) => self.catalog.locate_path(Path::new(anchor))?,
            None => None,
        };

        match anchor_location {
            Some(location) => {
                info!(
                    "Rewriting {} from {} block {}",
                    plan.anchor.as_deref().unwrap_or_default(),
                    volume_name(location.volume),
                    location.position
                );
                self.request_volume(location.volume).await?;
                // The catalogued row already points here and is kept.
                self.seek(location.position, false)?;
            }
            None => {
                let volume = self.catalog.latest_volume()?.unwrap_or(0);
                if let Some(anchor) = &plan.anchor {
                    warn!(
                        "{} is not in the catalog, appending after the end of data",
                        anchor
                    );
                }
                self.set_volume(volume);
                self.seek_end_of_data()?;
            }
        }

        self.write_files(&plan.remaining, false).await
    }
}
