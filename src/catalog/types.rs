use serde::Serialize;

/// One archived file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: Option<i64>,
    pub name: String,
    pub directory: String,
    pub volume: u32,
    /// Source modification time, RFC 3339
    pub file_date: String,
    pub size: u64,
    /// Logical block at which the file's header begins
    pub position: u64,
    pub deleted: bool,
}

impl FileRecord {
    pub fn new(
        name: &str,
        directory: &str,
        volume: u32,
        file_date: &str,
        size: u64,
        position: u64,
    ) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            directory: directory.to_string(),
            volume,
            file_date: file_date.to_string(),
            size,
            position,
            deleted: false,
        }
    }

    /// Full source path as it was archived
    pub fn full_path(&self) -> String {
        if self.directory.is_empty() {
            self.name.clone()
        } else {
            std::path::Path::new(&self.directory)
                .join(&self.name)
                .to_string_lossy()
                .to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRecord {
    pub id: u32,
    pub name: String,
}

/// Where a catalogued file lives on tape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLocation {
    pub volume: u32,
    pub position: u64,
}
