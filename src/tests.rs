//! Cross-module scenarios driven through the in-memory drive

use crate::catalog::{Catalog, FileLocation};
use crate::device::{status_codes::*, Cartridge, TapeRecord, VirtualTapeDrive};
use crate::error::{Result, RustMtapeError};
use crate::journal::TransactionJournal;
use crate::notify::{MailMessage, MailTransport};
use crate::operator::OperatorPrompt;
use crate::script::{LifecycleEvent, LifecycleScript};
use crate::tape_ops::header::{hash_file, FileHeader};
use crate::tape_ops::TapeOperations;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Operator that puts named cartridges back into the drive when prompted
struct Librarian {
    drive: VirtualTapeDrive,
    reinsert: Arc<Mutex<VecDeque<String>>>,
}

impl OperatorPrompt for Librarian {
    fn wait_for_key(&mut self, _message: &str) -> Result<()> {
        if let Some(label) = self.reinsert.lock().pop_front() {
            assert!(self.drive.reinsert_ejected(&label), "{} not ejected", label);
        }
        Ok(())
    }

    fn confirm(&mut self, _message: &str) -> Result<bool> {
        Ok(true)
    }
}

struct RecordingMailer(Arc<Mutex<Vec<MailMessage>>>);

impl MailTransport for RecordingMailer {
    fn send(&self, message: &MailMessage) -> Result<()> {
        self.0.lock().push(message.clone());
        Ok(())
    }
}

fn operations(
    drive: &VirtualTapeDrive,
    dir: &TempDir,
) -> (TapeOperations, Arc<Mutex<VecDeque<String>>>) {
    let reinsert = Arc::new(Mutex::new(VecDeque::new()));
    let mut ops = TapeOperations::new(
        Box::new(drive.clone()),
        "virtual",
        Catalog::new(dir.path().join("tapeLibrary.db")),
        TransactionJournal::new(dir.path().join("journal")),
    );
    ops.set_operator(Box::new(Librarian {
        drive: drive.clone(),
        reinsert: Arc::clone(&reinsert),
    }));
    ops.set_timing(Duration::from_millis(1), 2, Some(10));
    (ops, reinsert)
}

fn source_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
    let src = dir.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    let path = src.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn entry(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Size of the header block written ahead of `path`
async fn header_len(path: &Path) -> u64 {
    let metadata = std::fs::metadata(path).unwrap();
    let hash = hash_file(path).await.unwrap();
    FileHeader::from_metadata(path, &metadata, Some(hash))
        .to_bytes()
        .unwrap()
        .len() as u64
}

#[tokio::test]
async fn test_rollover_mid_file_continues_same_file() {
    let dir = TempDir::new().unwrap();
    let data = pattern(1000);
    let big = source_file(&dir, "big.bin", &data);

    let header_len = header_len(&big).await;

    let drive = VirtualTapeDrive::with_cartridges(vec![
        Cartridge::new("A", header_len + 100),
        Cartridge::blank("B"),
    ]);
    let (mut ops, reinsert) = operations(&drive, &dir);
    ops.set_volume(0);

    let summary = ops.write_files(&[entry(&big)], true).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(ops.volume(), 1);
    assert_eq!(ops.get_write_progress().rollovers, 1);

    // one catalogue row, at the header on the first volume
    let active: Vec<_> = ops.catalog().list_active().unwrap().collect();
    assert_eq!(active.len(), 1);
    assert_eq!(
        ops.catalog().locate_path(&big).unwrap(),
        Some(FileLocation {
            volume: 0,
            position: 0
        })
    );
    let volumes: Vec<u32> = ops
        .catalog()
        .list_volumes()
        .unwrap()
        .iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(volumes, vec![0, 1]);

    // header mark on A, the single end-of-file mark on B
    let first = drive.ejected_cartridges()[0].clone();
    let second = drive.loaded_cartridge().unwrap();
    assert_eq!(first.filemark_count(), 1);
    assert_eq!(second.filemark_count(), 1);
    assert_eq!(drive.tapemarks_written(), 2);
    let mut on_tape = first.file_at(2);
    on_tape.extend(second.file_at(0));
    assert_eq!(on_tape, data);
    assert_eq!(
        second.records().last(),
        Some(&TapeRecord::Filemark)
    );

    // restore spans both volumes without touching the catalogue
    reinsert.lock().extend(["A".to_string(), "B".to_string()]);
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let header = ops
        .locate_and_restore(&entry(&big), &out, true)
        .await
        .unwrap();
    assert_eq!(header.file_size, 1000);
    assert_eq!(std::fs::read(out.join("big.bin")).unwrap(), data);
    assert_eq!(ops.volume(), 1);
    assert_eq!(ops.catalog().list_volumes().unwrap().len(), 2);
}

#[tokio::test]
async fn test_repeated_end_of_tape_spreads_one_chunk_over_three_volumes() {
    let dir = TempDir::new().unwrap();
    let data = pattern(1000);
    let big = source_file(&dir, "big.bin", &data);
    let header_len = header_len(&big).await;

    let drive = VirtualTapeDrive::with_cartridges(vec![
        Cartridge::new("A", header_len + 100),
        Cartridge::new("B", 300),
        Cartridge::blank("C"),
    ]);
    let (mut ops, reinsert) = operations(&drive, &dir);
    ops.set_volume(0);

    let summary = ops.write_files(&[entry(&big)], true).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(ops.volume(), 2);
    assert_eq!(ops.get_write_progress().rollovers, 2);
    assert_eq!(
        ops.catalog().locate_path(&big).unwrap(),
        Some(FileLocation {
            volume: 0,
            position: 0
        })
    );
    let volumes: Vec<u32> = ops
        .catalog()
        .list_volumes()
        .unwrap()
        .iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(volumes, vec![0, 1, 2]);

    let ejected = drive.ejected_cartridges();
    let (a, b) = (ejected[0].clone(), ejected[1].clone());
    let c = drive.loaded_cartridge().unwrap();
    assert_eq!(
        (a.filemark_count(), b.filemark_count(), c.filemark_count()),
        (1, 0, 1)
    );
    assert_eq!(drive.tapemarks_written(), 2);
    let mut on_tape = a.file_at(2);
    on_tape.extend(b.file_at(0));
    on_tape.extend(c.file_at(0));
    assert_eq!(on_tape, data);

    reinsert
        .lock()
        .extend(["A".to_string(), "B".to_string(), "C".to_string()]);
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    ops.locate_and_restore(&entry(&big), &out, true)
        .await
        .unwrap();
    assert_eq!(std::fs::read(out.join("big.bin")).unwrap(), data);
    assert_eq!(ops.volume(), 2);
}

#[tokio::test]
async fn test_end_of_tape_on_header_mark_restores_from_next_volume() {
    let dir = TempDir::new().unwrap();
    let data = pattern(500);
    let file = source_file(&dir, "f.bin", &data);
    let drive =
        VirtualTapeDrive::with_cartridges(vec![Cartridge::blank("A"), Cartridge::blank("B")]);
    drive.queue_tapemark_status(ERROR_END_OF_MEDIA);
    let (mut ops, reinsert) = operations(&drive, &dir);
    ops.set_volume(0);

    let summary = ops.write_files(&[entry(&file)], true).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(ops.volume(), 1);
    // header on A, data on B
    assert_eq!(
        ops.catalog().locate_path(&file).unwrap(),
        Some(FileLocation {
            volume: 0,
            position: 0
        })
    );
    assert_eq!(drive.loaded_cartridge().unwrap().file_at(0), data);

    reinsert.lock().extend(["A".to_string(), "B".to_string()]);
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let header = ops
        .locate_and_restore(&entry(&file), &out, true)
        .await
        .unwrap();
    assert_eq!(header.file_size, 500);
    assert_eq!(std::fs::read(out.join("f.bin")).unwrap(), data);
    assert_eq!(ops.volume(), 1);
}

#[tokio::test]
async fn test_end_of_tape_on_data_mark_moves_next_file() {
    let dir = TempDir::new().unwrap();
    let first = source_file(&dir, "first.bin", &pattern(200));
    let second = source_file(&dir, "second.txt", b"next volume");
    let header_len = header_len(&first).await;

    let drive = VirtualTapeDrive::with_cartridges(vec![
        Cartridge::new("A", header_len + 200),
        Cartridge::blank("B"),
    ]);
    let (mut ops, reinsert) = operations(&drive, &dir);
    ops.set_volume(0);

    let summary = ops
        .write_files(&[entry(&first), entry(&second)], true)
        .await
        .unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.aborted, 0);
    assert_eq!(ops.get_write_progress().rollovers, 1);

    // both marks of the first file stay on A
    assert_eq!(drive.ejected_cartridges()[0].filemark_count(), 2);
    assert_eq!(drive.loaded_cartridge().unwrap().filemark_count(), 2);
    assert_eq!(
        ops.catalog().locate_path(&first).unwrap(),
        Some(FileLocation {
            volume: 0,
            position: 0
        })
    );
    assert_eq!(
        ops.catalog().locate_path(&second).unwrap(),
        Some(FileLocation {
            volume: 1,
            position: 0
        })
    );

    reinsert.lock().extend(["A".to_string(), "B".to_string()]);
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    ops.locate_and_restore(&entry(&first), &out, true)
        .await
        .unwrap();
    assert_eq!(std::fs::read(out.join("first.bin")).unwrap(), pattern(200));
    ops.locate_and_restore(&entry(&second), &out, true)
        .await
        .unwrap();
    assert_eq!(std::fs::read(out.join("second.txt")).unwrap(), b"next volume");
}

#[tokio::test]
async fn test_duplicate_file_keeps_first_position() {
    let dir = TempDir::new().unwrap();
    let file = source_file(&dir, "same.txt", b"same content");
    let drive = VirtualTapeDrive::with_blank_cartridges(1);
    let (mut ops, _) = operations(&drive, &dir);

    let summary = ops
        .write_files(&[entry(&file), entry(&file)], true)
        .await
        .unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(drive.tapemarks_written(), 4);

    let location = ops.catalog().locate_path(&file).unwrap().unwrap();
    assert_eq!(location.position, 0);
    assert_eq!(ops.catalog().list_all().unwrap().len(), 1);
}

#[tokio::test]
async fn test_resume_rewrites_anchor_and_finishes() {
    let dir = TempDir::new().unwrap();
    let files: Vec<PathBuf> = (1..=4)
        .map(|i| source_file(&dir, &format!("f{}.txt", i), format!("file {}", i).as_bytes()))
        .collect();
    let entries: Vec<String> = files.iter().map(|f| entry(f)).collect();
    let drive = VirtualTapeDrive::with_cartridges(vec![Cartridge::blank("A")]);

    {
        let (mut ops, _) = operations(&drive, &dir);
        ops.set_volume(0);
        ops.write_files(&entries[..2], true).await.unwrap();
    }
    // the interrupted run had enumerated all four files
    let journal_dir = dir.path().join("journal");
    std::fs::write(
        journal_dir.join(crate::journal::INTENDED_FILE),
        format!("{}\n", entries.join("\n")),
    )
    .unwrap();

    let (mut ops, reinsert) = operations(&drive, &dir);
    reinsert.lock().push_back("A".to_string());
    let summary = ops.resume().await.unwrap();
    assert_eq!(summary.completed, 3);

    assert_eq!(
        ops.journal().intended().unwrap(),
        entries[1..].to_vec()
    );
    assert_eq!(
        ops.journal().completed().unwrap(),
        vec![
            entries[0].clone(),
            entries[1].clone(),
            entries[1].clone(),
            entries[2].clone(),
            entries[3].clone()
        ]
    );

    // f2 rewritten in place, f3 and f4 follow it
    let cartridge = drive.loaded_cartridge().unwrap();
    assert_eq!(cartridge.records().len(), 16);
    assert_eq!(cartridge.filemark_count(), 8);
    for (i, file) in files.iter().enumerate() {
        let location = ops.catalog().locate_path(file).unwrap().unwrap();
        assert_eq!(location.position, (i as u64) * 4);
        assert_eq!(
            cartridge.file_at(location.position as usize + 2),
            format!("file {}", i + 1).into_bytes()
        );
    }
}

#[tokio::test]
async fn test_no_media_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let first = source_file(&dir, "a.txt", b"a");
    let second = source_file(&dir, "b.txt", b"b");
    let drive = VirtualTapeDrive::with_blank_cartridges(1);
    drive.queue_write_status(ERROR_NO_MEDIA_IN_DRIVE);
    let (mut ops, _) = operations(&drive, &dir);

    let result = ops.write_files(&[entry(&first), entry(&second)], true).await;
    assert!(matches!(result, Err(RustMtapeError::NoMedia)));
    assert!(!drive.is_locked());
    assert!(ops.journal().completed().unwrap().is_empty());
    assert_eq!(ops.catalog().list_active().unwrap().count(), 0);
    assert!(!ops.fired_events().contains(&LifecycleEvent::EndBackup));
}

#[tokio::test]
async fn test_alert_aborts_file_and_mails_operator() {
    let dir = TempDir::new().unwrap();
    let bad = source_file(&dir, "bad.txt", b"bad");
    let good = source_file(&dir, "good.txt", b"good");
    let drive = VirtualTapeDrive::with_blank_cartridges(1);
    drive.queue_write_status(ERROR_INVALID_BLOCK_LENGTH);

    let (mut ops, _) = operations(&drive, &dir);
    let mails = Arc::new(Mutex::new(Vec::new()));
    ops.set_mailer(Some(Box::new(RecordingMailer(Arc::clone(&mails)))));
    ops.set_script(Some(LifecycleScript::from_source(
        "#!mtape2\n\
         MailHost = \"relay\"\n\
         MailSender = \"tape@example.com\"\n\
         MailRecipient = \"ops@example.com\"\n\
         MailSubject = \"Backup\"\n\
         MailMessage = \"$REASON on $VOLUME\"\n\
         select(REASON)\n\
         case \"Alert\":\n\
         sendmail()\n\
         end select\n",
    )));

    let summary = ops
        .write_files(&[entry(&bad), entry(&good)], true)
        .await
        .unwrap();
    assert_eq!(summary.aborted, 1);
    assert_eq!(summary.completed, 1);

    assert!(ops.catalog().locate_path(&bad).unwrap().is_none());
    assert_eq!(
        ops.catalog().locate_path(&good).unwrap(),
        Some(FileLocation {
            volume: 0,
            position: 0
        })
    );

    let mails = mails.lock();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].body, "Alert on VOL_0000");
    assert_eq!(
        ops.fired_events(),
        &[
            LifecycleEvent::StartBackup,
            LifecycleEvent::Alert,
            LifecycleEvent::EndBackup
        ]
    );
}

#[tokio::test]
async fn test_cleaning_request_does_not_abort() {
    let dir = TempDir::new().unwrap();
    let file = source_file(&dir, "c.txt", b"clean me");
    let drive = VirtualTapeDrive::with_blank_cartridges(1);
    drive.queue_tapemark_status(ERROR_DEVICE_REQUIRES_CLEANING);
    let (mut ops, _) = operations(&drive, &dir);

    let summary = ops.write_files(&[entry(&file)], true).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert!(ops.fired_events().contains(&LifecycleEvent::Clean));
    assert!(ops.catalog().locate_path(&file).unwrap().is_some());
}

#[tokio::test]
async fn test_failing_new_tape_script_stops_backup() {
    let dir = TempDir::new().unwrap();
    let big = source_file(&dir, "big.bin", &pattern(4096));
    let drive = VirtualTapeDrive::with_cartridges(vec![
        Cartridge::new("A", 1024),
        Cartridge::blank("B"),
    ]);
    let (mut ops, _) = operations(&drive, &dir);
    ops.set_script(Some(LifecycleScript::from_source(
        "#!mtape2\nselect(REASON)\ncase \"New Tape\":\ncall exit 4\nend select\n",
    )));

    let result = ops.write_files(&[entry(&big)], true).await;
    assert!(matches!(
        result,
        Err(RustMtapeError::LifecycleHookFailed {
            event: LifecycleEvent::NewTape,
            ..
        })
    ));
    assert_eq!(ops.volume(), 0);
    assert!(ops.catalog().list_active().unwrap().next().is_none());
    assert!(ops.journal().completed().unwrap().is_empty());
    assert_eq!(drive.load_count(), 0);
}

#[test]
fn test_cli_parsing() {
    use crate::cli::{Cli, Commands, TapeCommand};
    use clap::Parser;

    let cli = Cli::try_parse_from([
        "rustmtape", "-f", "virtual", "write", "/data", "--position", "5",
    ])
    .unwrap();
    assert_eq!(cli.device.as_deref(), Some("virtual"));
    assert!(matches!(
        cli.command,
        Commands::Write {
            position: Some(5),
            progress: false,
            ..
        }
    ));

    let cli = Cli::try_parse_from(["rustmtape", "tape", "seek", "10", "--absolute"]).unwrap();
    match cli.command {
        Commands::Tape { action } => assert_eq!(
            action,
            TapeCommand::Seek {
                block: 10,
                absolute: true
            }
        ),
        _ => panic!("expected tape command"),
    }

    let cli = Cli::try_parse_from(["rustmtape", "tape", "weof"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Tape {
            action: TapeCommand::Weof { count: 1 }
        }
    ));

    let cli = Cli::try_parse_from([
        "rustmtape", "locate", "a.txt", "out", "--force", "--newtape", "hooks.mtape",
    ])
    .unwrap();
    assert_eq!(cli.newtape, Some(PathBuf::from("hooks.mtape")));
    assert!(matches!(cli.command, Commands::Locate { force: true, .. }));

    assert!(Cli::try_parse_from(["rustmtape", "list", "--volumes", "--csv", "v.csv"]).is_ok());
    assert!(Cli::try_parse_from(["rustmtape", "write"]).is_err());
}
