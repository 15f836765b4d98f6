//! In-memory tape drive
//!
//! Emulates a sequential drive with a stack of cartridges waiting to be
//! loaded. Capacity is counted in data bytes; a write that does not fit is
//! truncated to the remaining space and reported as end-of-media, the way a
//! drive inside its early-warning zone behaves. Faults can be queued to
//! exercise the engine's recovery paths.

use super::constants::block_sizes::*;
use super::constants::status_codes::*;
use super::types::{DriveParameters, IoOutcome, MediaParameters, TapeStatus, TapemarkKind};
use super::TapeDevice;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// One element on the emulated medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapeRecord {
    Block(Vec<u8>),
    Filemark,
    Setmark,
}

/// Emulated tape cartridge
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub label: String,
    pub capacity: u64,
    pub write_protected: bool,
    records: Vec<TapeRecord>,
}

impl Cartridge {
    pub fn new(label: &str, capacity: u64) -> Self {
        Self {
            label: label.to_string(),
            capacity,
            write_protected: false,
            records: Vec::new(),
        }
    }

    /// Cartridge that never fills up
    pub fn blank(label: &str) -> Self {
        Self::new(label, u64::MAX)
    }

    pub fn records(&self) -> &[TapeRecord] {
        &self.records
    }

    pub fn filemark_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, TapeRecord::Filemark))
            .count()
    }

    pub fn used_bytes(&self) -> u64 {
        self.records
            .iter()
            .map(|r| match r {
                TapeRecord::Block(data) => data.len() as u64,
                _ => 0,
            })
            .sum()
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.capacity.saturating_sub(self.used_bytes())
    }

    pub fn is_full(&self) -> bool {
        self.remaining_bytes() == 0
    }

    /// Data of the tape file that starts at `block`, up to the next mark
    pub fn file_at(&self, block: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for record in self.records.iter().skip(block) {
            match record {
                TapeRecord::Block(bytes) => data.extend_from_slice(bytes),
                _ => break,
            }
        }
        data
    }
}

#[derive(Debug)]
struct DriveState {
    open: bool,
    loaded: Option<Cartridge>,
    position: usize,
    pending: VecDeque<Cartridge>,
    ejected: Vec<Cartridge>,
    locked: bool,
    media_changed_pending: bool,
    not_ready_after_load: u32,
    not_ready_polls: u32,
    write_faults: VecDeque<u32>,
    tapemark_faults: VecDeque<u32>,
    lock_failures: u32,
    max_block_size: u32,
    min_block_size: u32,
    media_block_size: u32,
    load_count: u32,
    unload_count: u32,
    tapemarks_written: u32,
}

/// Shared handle to an emulated drive; clones observe the same state
#[derive(Debug, Clone)]
pub struct VirtualTapeDrive {
    state: Arc<Mutex<DriveState>>,
}

impl Default for VirtualTapeDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTapeDrive {
    /// Empty drive with no cartridges available
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DriveState {
                open: false,
                loaded: None,
                position: 0,
                pending: VecDeque::new(),
                ejected: Vec::new(),
                locked: false,
                media_changed_pending: false,
                not_ready_after_load: 0,
                not_ready_polls: 0,
                write_faults: VecDeque::new(),
                tapemark_faults: VecDeque::new(),
                lock_failures: 0,
                max_block_size: DEFAULT_MAX_BLOCK_SIZE,
                min_block_size: DEFAULT_MIN_BLOCK_SIZE,
                media_block_size: 0,
                load_count: 0,
                unload_count: 0,
                tapemarks_written: 0,
            })),
        }
    }

    /// Drive with `count` unlimited cartridges, the first one loaded
    pub fn with_blank_cartridges(count: usize) -> Self {
        let cartridges = (0..count)
            .map(|i| Cartridge::blank(&format!("VIRTUAL{:02}", i)))
            .collect();
        Self::with_cartridges(cartridges)
    }

    /// Drive with the first cartridge loaded and the rest waiting
    pub fn with_cartridges(cartridges: Vec<Cartridge>) -> Self {
        let drive = Self::new();
        {
            let mut state = drive.state.lock();
            let mut queue: VecDeque<Cartridge> = cartridges.into();
            state.loaded = queue.pop_front();
            state.pending = queue;
        }
        drive
    }

    pub fn set_block_limits(&self, max: u32, min: u32) {
        let mut state = self.state.lock();
        state.max_block_size = max;
        state.min_block_size = min;
    }

    /// Position queries fail with no-media this many times after each load
    pub fn set_not_ready_polls_after_load(&self, polls: u32) {
        self.state.lock().not_ready_after_load = polls;
    }

    /// Next write calls return these status codes without moving data
    pub fn queue_write_status(&self, code: u32) {
        self.state.lock().write_faults.push_back(code);
    }

    pub fn queue_tapemark_status(&self, code: u32) {
        self.state.lock().tapemark_faults.push_back(code);
    }

    pub fn fail_lock_attempts(&self, attempts: u32) {
        self.state.lock().lock_failures = attempts;
    }

    pub fn add_pending_cartridge(&self, cartridge: Cartridge) {
        self.state.lock().pending.push_back(cartridge);
    }

    pub fn loaded_cartridge(&self) -> Option<Cartridge> {
        self.state.lock().loaded.clone()
    }

    pub fn ejected_cartridges(&self) -> Vec<Cartridge> {
        self.state.lock().ejected.clone()
    }

    /// Put an ejected cartridge back on top of the pending stack
    pub fn reinsert_ejected(&self, label: &str) -> bool {
        let mut state = self.state.lock();
        if let Some(index) = state.ejected.iter().position(|c| c.label == label) {
            let cartridge = state.ejected.remove(index);
            state.pending.push_front(cartridge);
            true
        } else {
            false
        }
    }

    pub fn load_count(&self) -> u32 {
        self.state.lock().load_count
    }

    pub fn unload_count(&self) -> u32 {
        self.state.lock().unload_count
    }

    pub fn tapemarks_written(&self) -> u32 {
        self.state.lock().tapemarks_written
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    pub fn current_block(&self) -> usize {
        self.state.lock().position
    }
}

impl DriveState {
    fn take_media_change(&mut self) -> bool {
        if self.media_changed_pending {
            self.media_changed_pending = false;
            true
        } else {
            false
        }
    }
}

impl TapeDevice for VirtualTapeDrive {
    fn open(&mut self, path: &str) -> TapeStatus {
        debug!("Virtual drive opened as {}", path);
        self.state.lock().open = true;
        TapeStatus::SUCCESS
    }

    fn close(&mut self) {
        self.state.lock().open = false;
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn read(&mut self, buffer: &mut [u8]) -> IoOutcome {
        let mut state = self.state.lock();
        if state.loaded.is_none() {
            return IoOutcome::new(0, TapeStatus(ERROR_NO_MEDIA_IN_DRIVE));
        }
        if state.take_media_change() {
            return IoOutcome::new(0, TapeStatus(ERROR_MEDIA_CHANGED));
        }
        let position = state.position;
        let (record, full) = match state.loaded.as_ref() {
            Some(cartridge) => (cartridge.records.get(position).cloned(), cartridge.is_full()),
            None => (None, false),
        };
        match record {
            None if full => IoOutcome::new(0, TapeStatus(ERROR_END_OF_MEDIA)),
            None => IoOutcome::new(0, TapeStatus(ERROR_NO_DATA_DETECTED)),
            Some(TapeRecord::Filemark) => {
                state.position += 1;
                IoOutcome::new(0, TapeStatus(ERROR_FILEMARK_DETECTED))
            }
            Some(TapeRecord::Setmark) => {
                state.position += 1;
                IoOutcome::new(0, TapeStatus(ERROR_SETMARK_DETECTED))
            }
            Some(TapeRecord::Block(data)) => {
                state.position += 1;
                if data.len() > buffer.len() {
                    buffer.copy_from_slice(&data[..buffer.len()]);
                    IoOutcome::new(buffer.len(), TapeStatus(ERROR_MORE_DATA))
                } else {
                    buffer[..data.len()].copy_from_slice(&data);
                    IoOutcome::new(data.len(), TapeStatus::SUCCESS)
                }
            }
        }
    }

    fn write(&mut self, buffer: &[u8]) -> IoOutcome {
        let mut state = self.state.lock();
        if let Some(code) = state.write_faults.pop_front() {
            return IoOutcome::new(0, TapeStatus(code));
        }
        if state.loaded.is_none() {
            return IoOutcome::new(0, TapeStatus(ERROR_NO_MEDIA_IN_DRIVE));
        }
        if state.take_media_change() {
            return IoOutcome::new(0, TapeStatus(ERROR_MEDIA_CHANGED));
        }
        let position = state.position;
        let cartridge = match state.loaded.as_mut() {
            Some(c) => c,
            None => return IoOutcome::new(0, TapeStatus(ERROR_NO_MEDIA_IN_DRIVE)),
        };
        if cartridge.write_protected {
            return IoOutcome::new(0, TapeStatus(ERROR_WRITE_PROTECT));
        }
        cartridge.records.truncate(position);
        let remaining = cartridge.remaining_bytes();
        if remaining == 0 {
            return IoOutcome::new(0, TapeStatus(ERROR_END_OF_MEDIA));
        }
        let fit = std::cmp::min(remaining, buffer.len() as u64) as usize;
        cartridge.records.push(TapeRecord::Block(buffer[..fit].to_vec()));
        state.position += 1;
        if fit < buffer.len() {
            IoOutcome::new(fit, TapeStatus(ERROR_END_OF_MEDIA))
        } else {
            IoOutcome::new(fit, TapeStatus::SUCCESS)
        }
    }

    fn rewind(&mut self) -> TapeStatus {
        let mut state = self.state.lock();
        if state.loaded.is_none() {
            return TapeStatus(ERROR_NO_MEDIA_IN_DRIVE);
        }
        state.position = 0;
        TapeStatus::SUCCESS
    }

    fn unload(&mut self) -> TapeStatus {
        let mut state = self.state.lock();
        if state.locked {
            return TapeStatus(ERROR_UNABLE_TO_UNLOAD_MEDIA);
        }
        match state.loaded.take() {
            Some(cartridge) => {
                state.ejected.push(cartridge);
                state.position = 0;
                state.unload_count += 1;
                TapeStatus::SUCCESS
            }
            None => TapeStatus(ERROR_NO_MEDIA_IN_DRIVE),
        }
    }

    fn load(&mut self) -> TapeStatus {
        let mut state = self.state.lock();
        if state.loaded.is_some() {
            return TapeStatus::SUCCESS;
        }
        match state.pending.pop_front() {
            Some(cartridge) => {
                state.loaded = Some(cartridge);
                state.position = 0;
                state.load_count += 1;
                state.media_changed_pending = true;
                state.not_ready_polls = state.not_ready_after_load;
                TapeStatus::SUCCESS
            }
            None => TapeStatus(ERROR_NO_MEDIA_IN_DRIVE),
        }
    }

    fn lock(&mut self) -> TapeStatus {
        let mut state = self.state.lock();
        if state.lock_failures > 0 {
            state.lock_failures -= 1;
            return TapeStatus(ERROR_UNABLE_TO_LOCK_MEDIA);
        }
        state.locked = true;
        TapeStatus::SUCCESS
    }

    fn unlock(&mut self) -> TapeStatus {
        self.state.lock().locked = false;
        TapeStatus::SUCCESS
    }

    fn adjust_tension(&mut self) -> TapeStatus {
        let mut state = self.state.lock();
        if state.loaded.is_none() {
            return TapeStatus(ERROR_NO_MEDIA_IN_DRIVE);
        }
        state.position = 0;
        TapeStatus::SUCCESS
    }

    fn seek_absolute(&mut self, block: u64) -> TapeStatus {
        self.seek_logical(block)
    }

    fn seek_logical(&mut self, block: u64) -> TapeStatus {
        let mut state = self.state.lock();
        let len = match state.loaded.as_ref() {
            Some(cartridge) => cartridge.records.len(),
            None => return TapeStatus(ERROR_NO_MEDIA_IN_DRIVE),
        };
        if block as usize > len {
            state.position = len;
            return TapeStatus(ERROR_NO_DATA_DETECTED);
        }
        state.position = block as usize;
        TapeStatus::SUCCESS
    }

    fn seek_end_of_data(&mut self) -> TapeStatus {
        let mut state = self.state.lock();
        match state.loaded.as_ref().map(|c| c.records.len()) {
            Some(len) => {
                state.position = len;
                TapeStatus::SUCCESS
            }
            None => TapeStatus(ERROR_NO_MEDIA_IN_DRIVE),
        }
    }

    fn space_filemarks(&mut self, count: i64) -> TapeStatus {
        let mut state = self.state.lock();
        let records = match state.loaded.as_ref() {
            Some(cartridge) => cartridge.records.clone(),
            None => return TapeStatus(ERROR_NO_MEDIA_IN_DRIVE),
        };
        let mut position = state.position;
        let mut remaining = count.unsigned_abs();
        if count >= 0 {
            while remaining > 0 {
                match records.get(position) {
                    Some(TapeRecord::Filemark) => {
                        remaining -= 1;
                        position += 1;
                    }
                    Some(_) => position += 1,
                    None => {
                        state.position = position;
                        return TapeStatus(ERROR_NO_DATA_DETECTED);
                    }
                }
            }
        } else {
            while remaining > 0 {
                if position == 0 {
                    state.position = 0;
                    return TapeStatus(ERROR_BEGINNING_OF_MEDIA);
                }
                position -= 1;
                if records[position] == TapeRecord::Filemark {
                    remaining -= 1;
                }
            }
        }
        state.position = position;
        TapeStatus::SUCCESS
    }

    fn space_blocks(&mut self, count: i64) -> TapeStatus {
        let mut state = self.state.lock();
        let len = match state.loaded.as_ref() {
            Some(cartridge) => cartridge.records.len() as i64,
            None => return TapeStatus(ERROR_NO_MEDIA_IN_DRIVE),
        };
        let target = state.position as i64 + count;
        if target < 0 {
            state.position = 0;
            TapeStatus(ERROR_BEGINNING_OF_MEDIA)
        } else if target > len {
            state.position = len as usize;
            TapeStatus(ERROR_NO_DATA_DETECTED)
        } else {
            state.position = target as usize;
            TapeStatus::SUCCESS
        }
    }

    fn write_tapemark(&mut self, count: u32, kind: TapemarkKind) -> TapeStatus {
        let mut state = self.state.lock();
        if let Some(code) = state.tapemark_faults.pop_front() {
            return TapeStatus(code);
        }
        let position = state.position;
        let cartridge = match state.loaded.as_mut() {
            Some(c) => c,
            None => return TapeStatus(ERROR_NO_MEDIA_IN_DRIVE),
        };
        if cartridge.write_protected {
            return TapeStatus(ERROR_WRITE_PROTECT);
        }
        cartridge.records.truncate(position);
        let mark = match kind {
            TapemarkKind::Setmark => TapeRecord::Setmark,
            _ => TapeRecord::Filemark,
        };
        for _ in 0..count {
            cartridge.records.push(mark.clone());
        }
        // marks still fit past the early-warning point
        let full = cartridge.is_full();
        state.position += count as usize;
        state.tapemarks_written += count;
        if full {
            TapeStatus(ERROR_END_OF_MEDIA)
        } else {
            TapeStatus::SUCCESS
        }
    }

    fn position(&mut self) -> std::result::Result<u64, TapeStatus> {
        let mut state = self.state.lock();
        if state.loaded.is_none() {
            return Err(TapeStatus(ERROR_NO_MEDIA_IN_DRIVE));
        }
        if state.not_ready_polls > 0 {
            state.not_ready_polls -= 1;
            return Err(TapeStatus(ERROR_NO_MEDIA_IN_DRIVE));
        }
        Ok(state.position as u64)
    }

    fn drive_parameters(&mut self) -> std::result::Result<DriveParameters, TapeStatus> {
        let state = self.state.lock();
        Ok(DriveParameters {
            maximum_block_size: state.max_block_size,
            minimum_block_size: state.min_block_size,
            ..DriveParameters::default()
        })
    }

    fn media_parameters(&mut self) -> std::result::Result<MediaParameters, TapeStatus> {
        let state = self.state.lock();
        match state.loaded.as_ref() {
            Some(cartridge) => Ok(MediaParameters {
                capacity: cartridge.capacity,
                remaining: cartridge.remaining_bytes(),
                block_size: state.media_block_size,
                partition_count: 1,
                write_protected: cartridge.write_protected,
            }),
            None => Err(TapeStatus(ERROR_NO_MEDIA_IN_DRIVE)),
        }
    }

    fn set_drive_parameters(&mut self, _parameters: &DriveParameters) -> TapeStatus {
        TapeStatus::SUCCESS
    }

    fn set_media_block_size(&mut self, block_size: u32) -> TapeStatus {
        self.state.lock().media_block_size = block_size;
        TapeStatus::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_back_with_filemark() {
        let mut drive = VirtualTapeDrive::with_blank_cartridges(1);
        assert!(drive.write(b"hello").status.is_success());
        assert!(drive.write_tapemark(1, TapemarkKind::Filemark).is_success());
        assert!(drive.rewind().is_success());

        let mut buffer = [0u8; 16];
        let first = drive.read(&mut buffer);
        assert_eq!(first.bytes, 5);
        assert_eq!(&buffer[..5], b"hello");

        let second = drive.read(&mut buffer);
        assert_eq!(second.status.code(), ERROR_FILEMARK_DETECTED);

        let third = drive.read(&mut buffer);
        assert_eq!(third.status.code(), ERROR_NO_DATA_DETECTED);
    }

    #[test]
    fn test_write_past_capacity_reports_end_of_media() {
        let mut drive = VirtualTapeDrive::with_cartridges(vec![Cartridge::new("SMALL", 8)]);
        let outcome = drive.write(b"0123456789");
        assert_eq!(outcome.bytes, 8);
        assert_eq!(outcome.status.code(), ERROR_END_OF_MEDIA);

        let again = drive.write(b"xy");
        assert_eq!(again.bytes, 0);
        assert_eq!(again.status.code(), ERROR_END_OF_MEDIA);
    }

    #[test]
    fn test_filemark_on_full_cartridge_is_written_with_end_of_media() {
        let mut drive = VirtualTapeDrive::with_cartridges(vec![Cartridge::new("SMALL", 4)]);
        assert!(drive.write(b"abcd").status.is_success());

        let status = drive.write_tapemark(1, TapemarkKind::Filemark);
        assert_eq!(status.code(), ERROR_END_OF_MEDIA);
        assert_eq!(drive.loaded_cartridge().unwrap().filemark_count(), 1);
        assert_eq!(drive.tapemarks_written(), 1);
    }

    #[test]
    fn test_load_reports_media_change_once() {
        let mut drive = VirtualTapeDrive::with_cartridges(vec![]);
        drive.add_pending_cartridge(Cartridge::blank("NEXT"));
        assert!(drive.load().is_success());

        let first = drive.write(b"abc");
        assert_eq!(first.status.code(), ERROR_MEDIA_CHANGED);
        let second = drive.write(b"abc");
        assert!(second.status.is_success());
    }

    #[test]
    fn test_not_ready_polls_after_load() {
        let mut drive = VirtualTapeDrive::new();
        drive.add_pending_cartridge(Cartridge::blank("NEXT"));
        drive.set_not_ready_polls_after_load(2);
        assert!(drive.load().is_success());

        assert!(drive.position().is_err());
        assert!(drive.position().is_err());
        assert_eq!(drive.position(), Ok(0));
    }

    #[test]
    fn test_space_filemarks_forward_and_back() {
        let mut drive = VirtualTapeDrive::with_blank_cartridges(1);
        drive.write(b"a");
        drive.write_tapemark(1, TapemarkKind::Filemark);
        drive.write(b"b");
        drive.write_tapemark(1, TapemarkKind::Filemark);
        drive.rewind();

        assert!(drive.space_filemarks(2).is_success());
        assert_eq!(drive.current_block(), 4);
        assert!(drive.space_filemarks(-1).is_success());
        assert_eq!(drive.current_block(), 3);
    }

    #[test]
    fn test_unload_refused_while_locked() {
        let mut drive = VirtualTapeDrive::with_blank_cartridges(1);
        assert!(drive.lock().is_success());
        assert_eq!(drive.unload().code(), ERROR_UNABLE_TO_UNLOAD_MEDIA);
        drive.unlock();
        assert!(drive.unload().is_success());
        assert_eq!(drive.ejected_cartridges().len(), 1);
    }
}
