//! Tape catalog
//!
//! Two-table SQLite index tying archived files to volumes and logical tape
//! positions. A connection is opened for each operation and dropped right
//! after it, and the schema is created on first use.

mod types;

pub use types::{FileLocation, FileRecord, VolumeRecord};

use crate::error::Result;
use crate::utils::{split_catalog_path, volume_name};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS Files (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    directory TEXT NOT NULL,
    Volume    INTEGER NOT NULL,
    FileDate  TEXT,
    Size      INTEGER NOT NULL DEFAULT 0,
    Position  INTEGER NOT NULL,
    Deleted   INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS Volumes (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
";

const FILE_COLUMNS: &str = "id, name, directory, Volume, FileDate, Size, Position, Deleted";

#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    /// Drop and recreate both tables
    pub fn initialize(&self) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("DROP TABLE IF EXISTS Files; DROP TABLE IF EXISTS Volumes;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Catalog initialized: {}", self.path.display());
        Ok(())
    }

    /// Insert a volume once per ordinal. Returns `false` for a duplicate.
    pub fn register_volume(&self, ordinal: u32) -> Result<bool> {
        let conn = self.connect()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT name FROM Volumes WHERE id = ?1",
                params![ordinal],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(name) = existing {
            warn!("Volume {} is already registered as {}", ordinal, name);
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO Volumes (id, name) VALUES (?1, ?2)",
            params![ordinal, volume_name(ordinal)],
        )?;
        debug!("Registered volume {}", volume_name(ordinal));
        Ok(true)
    }

    /// Insert a file once per (name, directory). Returns `false` for a duplicate;
    /// the existing row is left untouched.
    pub fn register_file(&self, record: &FileRecord) -> Result<bool> {
        let conn = self.connect()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM Files WHERE name = ?1 AND directory = ?2",
                params![record.name, record.directory],
                |row| row.get(0),
            )
            .optional()?;

        if existing.is_some() {
            warn!(
                "File {} is already catalogued, record not added",
                record.full_path()
            );
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO Files (name, directory, Volume, FileDate, Size, Position, Deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                record.name,
                record.directory,
                record.volume,
                record.file_date,
                record.size as i64,
                record.position as i64,
            ],
        )?;
        debug!(
            "Catalogued {} on {} at block {}",
            record.full_path(),
            volume_name(record.volume),
            record.position
        );
        Ok(true)
    }

    /// Volume and position of a non-deleted file. Without a directory the
    /// most recently archived file of that name wins.
    pub fn locate(&self, name: &str, directory: Option<&str>) -> Result<Option<FileLocation>> {
        let conn = self.connect()?;
        let map_row = |row: &Row<'_>| -> rusqlite::Result<FileLocation> {
            Ok(FileLocation {
                volume: row.get(0)?,
                position: row.get::<_, i64>(1)? as u64,
            })
        };

        let location = match directory {
            Some(dir) => conn
                .query_row(
                    "SELECT Volume, Position FROM Files
                     WHERE name = ?1 AND directory = ?2 AND Deleted = 0
                     ORDER BY id DESC LIMIT 1",
                    params![name, dir],
                    map_row,
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT Volume, Position FROM Files
                     WHERE name = ?1 AND Deleted = 0
                     ORDER BY id DESC LIMIT 1",
                    params![name],
                    map_row,
                )
                .optional()?,
        };
        Ok(location)
    }

    /// Locate by a full source path
    pub fn locate_path(&self, path: &Path) -> Result<Option<FileLocation>> {
        let (name, directory) = split_catalog_path(path);
        if directory.is_empty() {
            self.locate(&name, None)
        } else {
            self.locate(&name, Some(&directory))
        }
    }

    /// Soft-delete by base name, or by full path when one is given.
    /// Returns the number of rows flagged.
    pub fn mark_deleted(&self, target: &str) -> Result<usize> {
        let conn = self.connect()?;
        let (name, directory) = split_catalog_path(Path::new(target));

        let changed = if directory.is_empty() {
            conn.execute(
                "UPDATE Files SET Deleted = 1 WHERE name = ?1 AND Deleted = 0",
                params![name],
            )?
        } else {
            conn.execute(
                "UPDATE Files SET Deleted = 1 WHERE name = ?1 AND directory = ?2 AND Deleted = 0",
                params![name, directory],
            )?
        };

        if changed == 0 {
            warn!("No catalogued file matches {}", target);
        } else {
            info!("Marked {} catalog record(s) deleted for {}", changed, target);
        }
        Ok(changed)
    }

    /// Files that are not soft-deleted, in archive order
    pub fn list_active(&self) -> Result<impl Iterator<Item = FileRecord>> {
        Ok(self
            .query_files(&format!(
                "SELECT {} FROM Files WHERE Deleted = 0 ORDER BY id",
                FILE_COLUMNS
            ))?
            .into_iter())
    }

    pub fn list_all(&self) -> Result<Vec<FileRecord>> {
        self.query_files(&format!("SELECT {} FROM Files ORDER BY id", FILE_COLUMNS))
    }

    pub fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, name FROM Volumes ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(VolumeRecord {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut volumes = Vec::new();
        for volume in rows {
            volumes.push(volume?);
        }
        Ok(volumes)
    }

    /// Highest registered volume ordinal
    pub fn latest_volume(&self) -> Result<Option<u32>> {
        let conn = self.connect()?;
        let latest: Option<u32> =
            conn.query_row("SELECT MAX(id) FROM Volumes", [], |row| row.get(0))?;
        Ok(latest)
    }

    fn query_files(&self, sql: &str) -> Result<Vec<FileRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(FileRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                directory: row.get(2)?,
                volume: row.get(3)?,
                file_date: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                size: row.get::<_, i64>(5)? as u64,
                position: row.get::<_, i64>(6)? as u64,
                deleted: row.get::<_, i64>(7)? != 0,
            })
        })?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    /// Write the given records as CSV
    pub fn export_csv<P: AsRef<Path>>(&self, records: &[FileRecord], path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())
            .map_err(|e| crate::error::RustMtapeError::file_operation(e.to_string()))?;
        for record in records {
            writer
                .serialize(record)
                .map_err(|e| crate::error::RustMtapeError::file_operation(e.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}
