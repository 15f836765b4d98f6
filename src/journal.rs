//! Resumable write journal
//!
//! Two line-oriented logs per run: every path enumerated for the run
//! (`intended.journal`, written before any device I/O) and every path whose
//! write returned (`completed.journal`, appended right after). The difference
//! is the work left for `resume`.

use crate::error::{Result, RustMtapeError};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const INTENDED_FILE: &str = "intended.journal";
pub const COMPLETED_FILE: &str = "completed.journal";
pub const DIFF_FILE: &str = "resume.diff";

/// Work left after an interrupted run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    /// Last entry present in both logs; rewritten first
    pub anchor: Option<String>,
    /// Entries to write, in intended order, anchor first
    pub remaining: Vec<String>,
}

impl ResumePlan {
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// `intended − completed` in intended order, led by the last common entry
pub fn compute_resume_plan(intended: &[String], completed: &[String]) -> ResumePlan {
    let done: std::collections::HashSet<&str> = completed.iter().map(|s| s.as_str()).collect();

    let anchor = intended
        .iter()
        .rev()
        .find(|entry| done.contains(entry.as_str()))
        .cloned();

    let mut remaining = Vec::with_capacity(intended.len());
    if let Some(ref anchor) = anchor {
        remaining.push(anchor.clone());
    }
    remaining.extend(
        intended
            .iter()
            .filter(|entry| !done.contains(entry.as_str()))
            .cloned(),
    );

    ResumePlan { anchor, remaining }
}

#[derive(Debug)]
pub struct TransactionJournal {
    dir: PathBuf,
    completed: Option<File>,
}

impl TransactionJournal {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            completed: None,
        }
    }

    pub fn intended_path(&self) -> PathBuf {
        self.dir.join(INTENDED_FILE)
    }

    pub fn completed_path(&self) -> PathBuf {
        self.dir.join(COMPLETED_FILE)
    }

    pub fn diff_path(&self) -> PathBuf {
        self.dir.join(DIFF_FILE)
    }

    /// Start a run: write the intended log and truncate the completed log
    pub fn begin(&mut self, entries: &[String]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        write_lines(&self.intended_path(), entries)?;
        let completed = File::create(self.completed_path())?;
        self.completed = Some(completed);
        info!(
            "Journal started with {} intended entries in {}",
            entries.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Continue a run whose intended log is already in place
    pub fn reopen(&mut self) -> Result<()> {
        let completed = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.completed_path())?;
        self.completed = Some(completed);
        Ok(())
    }

    /// Append one completed entry and flush it to disk
    pub fn record_completed(&mut self, entry: &str) -> Result<()> {
        if self.completed.is_none() {
            self.reopen()?;
        }
        let file = self
            .completed
            .as_mut()
            .ok_or_else(|| RustMtapeError::journal("completed log is not open"))?;
        writeln!(file, "{}", entry)?;
        file.sync_data()?;
        debug!("Journal: completed {}", entry);
        Ok(())
    }

    pub fn intended(&self) -> Result<Vec<String>> {
        read_lines(&self.intended_path())
    }

    pub fn completed(&self) -> Result<Vec<String>> {
        read_lines(&self.completed_path())
    }

    /// Compute the resume plan and make it the new intended log.
    /// The completed log is kept, so running this again yields the same plan.
    pub fn prepare_resume(&mut self) -> Result<ResumePlan> {
        let intended = self.intended()?;
        let completed = self.completed()?;
        let plan = compute_resume_plan(&intended, &completed);

        write_lines(&self.diff_path(), &plan.remaining)?;
        fs::rename(self.diff_path(), self.intended_path())?;

        info!(
            "Resume plan: {} entries remaining, anchor {:?}",
            plan.remaining.len(),
            plan.anchor
        );
        Ok(plan)
    }
}

fn write_lines(path: &Path, entries: &[String]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for entry in entries {
        writeln!(writer, "{}", entry)?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| {
        RustMtapeError::journal(format!("cannot open {}: {}", path.display(), e))
    })?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim_end_matches('\r');
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    Ok(lines)
}
