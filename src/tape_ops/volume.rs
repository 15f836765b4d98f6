//! Volume rollover and volume requests

use super::{RolloverState, TapeOperations};
use crate::error::Result;
use crate::script::LifecycleEvent;
use crate::utils::volume_name;
use tracing::{info, warn};

impl TapeOperations {
    /// Retire the exhausted volume and bring the next one online.
    ///
    /// Walks `Active -> EjectPending -> AwaitingNextVolume -> Active`. The
    /// ordinal advances exactly once and the new volume is catalogued before
    /// any byte lands on it. A failing `NewTape` hook stops the rollover.
    pub async fn roll_over(&mut self) -> Result<()> {
        let full = volume_name(self.volume);
        let next = volume_name(self.volume + 1);
        info!("End of tape on {}, rolling over to {}", full, next);

        self.rollover_state = RolloverState::EjectPending;
        self.eject_current();

        self.rollover_state = RolloverState::AwaitingNextVolume;
        if self.script.is_some() {
            self.fire_event(LifecycleEvent::NewTape, &format!("{} is full", full))
                .await?;
        } else {
            let prompt = format!("{} is full. Insert {} and press Enter.", full, next);
            self.operator.wait_for_key(&prompt)?;
        }

        self.detect_new_tape().await?;
        self.volume += 1;
        self.volume_known = true;
        self.catalog.register_volume(self.volume)?;

        self.rollover_state = RolloverState::Active;
        self.write_progress.rollovers += 1;
        self.lock_media().await;
        info!("{} mounted, continuing", next);
        Ok(())
    }

    /// Ask for `ordinal` to be mounted unless it already is
    pub async fn request_volume(&mut self, ordinal: u32) -> Result<()> {
        if self.volume_known && self.volume == ordinal {
            return Ok(());
        }
        let wanted = volume_name(ordinal);
        info!("{} needed", wanted);

        self.eject_current();
        if self.script.is_some() {
            self.fire_event(LifecycleEvent::TapeNeeded, &format!("Insert {}", wanted))
                .await?;
        } else {
            self.operator
                .wait_for_key(&format!("Insert {} and press Enter.", wanted))?;
        }

        self.detect_new_tape().await?;
        self.set_volume(ordinal);
        Ok(())
    }

    /// Read-side rollover: nothing is catalogued
    pub async fn advance_read_volume(&mut self) -> Result<()> {
        let next = self.volume + 1;
        warn!(
            "End of tape while reading {}, continuing on {}",
            volume_name(self.volume),
            volume_name(next)
        );
        self.rollover_state = RolloverState::AwaitingNextVolume;
        self.volume_known = false;
        let result = self.request_volume(next).await;
        self.rollover_state = RolloverState::Active;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::device::{Cartridge, VirtualTapeDrive};
    use crate::error::RustMtapeError;
    use crate::journal::TransactionJournal;
    use crate::operator::AutoConfirm;
    use crate::script::LifecycleScript;
    use std::time::Duration;
    use tempfile::TempDir;

    fn operations(drive: &VirtualTapeDrive, dir: &TempDir) -> TapeOperations {
        let mut ops = TapeOperations::new(
            Box::new(drive.clone()),
            "virtual",
            Catalog::new(dir.path().join("catalog.db")),
            TransactionJournal::new(dir.path()),
        );
        ops.set_operator(Box::new(AutoConfirm));
        ops.set_timing(Duration::from_millis(1), 2, Some(5));
        ops
    }

    #[tokio::test]
    async fn test_rollover_advances_one_volume() {
        let dir = TempDir::new().unwrap();
        let drive =
            VirtualTapeDrive::with_cartridges(vec![Cartridge::blank("A"), Cartridge::blank("B")]);
        let mut ops = operations(&drive, &dir);
        ops.set_volume(3);

        ops.roll_over().await.unwrap();

        assert_eq!(ops.volume(), 4);
        assert_eq!(ops.rollover_state(), RolloverState::Active);
        assert_eq!(drive.loaded_cartridge().unwrap().label, "B");
        assert_eq!(drive.ejected_cartridges()[0].label, "A");
        let volumes: Vec<u32> = ops
            .catalog()
            .list_volumes()
            .unwrap()
            .iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(volumes, vec![4]);
        assert_eq!(ops.get_write_progress().rollovers, 1);
    }

    #[tokio::test]
    async fn test_failing_new_tape_script_stops_rollover() {
        let dir = TempDir::new().unwrap();
        let drive =
            VirtualTapeDrive::with_cartridges(vec![Cartridge::blank("A"), Cartridge::blank("B")]);
        let mut ops = operations(&drive, &dir);
        ops.set_script(Some(
            LifecycleScript::from_source("#!mtape2\ncall exit 3\n"),
        ));

        let result = ops.roll_over().await;
        assert!(matches!(
            result,
            Err(RustMtapeError::LifecycleHookFailed {
                event: LifecycleEvent::NewTape,
                ..
            })
        ));
        assert_eq!(ops.volume(), 0);
        assert_eq!(ops.rollover_state(), RolloverState::AwaitingNextVolume);
    }

    #[tokio::test]
    async fn test_request_volume_skips_mounted_volume() {
        let dir = TempDir::new().unwrap();
        let drive = VirtualTapeDrive::with_blank_cartridges(1);
        let mut ops = operations(&drive, &dir);
        ops.set_volume(2);

        ops.request_volume(2).await.unwrap();
        assert_eq!(drive.unload_count(), 0);
    }

    #[tokio::test]
    async fn test_request_volume_swaps_cartridge() {
        let dir = TempDir::new().unwrap();
        let drive =
            VirtualTapeDrive::with_cartridges(vec![Cartridge::blank("A"), Cartridge::blank("B")]);
        let mut ops = operations(&drive, &dir);

        ops.request_volume(1).await.unwrap();
        assert_eq!(ops.volume(), 1);
        assert_eq!(drive.loaded_cartridge().unwrap().label, "B");
        assert!(ops.catalog().list_volumes().unwrap().is_empty());
    }
}
