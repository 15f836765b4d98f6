//! Per-file header
//!
//! Every archived file is preceded by a small JSON document in its own tape
//! file. Restores read it to learn the original name and the exact length of
//! the (block-padded) data that follows.

use crate::error::{Result, RustMtapeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::Metadata;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Headers larger than this are not headers
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileHeader {
    pub name: String,
    pub creation_time: String,
    pub modify_time: String,
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

fn system_time_to_rfc3339(time: std::io::Result<std::time::SystemTime>) -> Option<String> {
    time.ok().map(|t| DateTime::<Utc>::from(t).to_rfc3339())
}

impl FileHeader {
    pub fn from_metadata(path: &Path, metadata: &Metadata, sha256: Option<String>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let modify_time = system_time_to_rfc3339(metadata.modified())
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let creation_time =
            system_time_to_rfc3339(metadata.created()).unwrap_or_else(|| modify_time.clone());

        Self {
            name,
            creation_time,
            modify_time,
            file_size: metadata.len(),
            sha256,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a header read back from tape; block padding is ignored
    pub fn parse(data: &[u8]) -> Result<Self> {
        let end = data
            .iter()
            .rposition(|&b| b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        if end == 0 {
            return Err(RustMtapeError::parse("empty file header"));
        }
        serde_json::from_slice(&data[..end])
            .map_err(|e| RustMtapeError::parse(format!("invalid file header: {}", e)))
    }
}

/// Hex SHA-256 of a file
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_header_field_names() {
        let header = FileHeader {
            name: "a.txt".to_string(),
            creation_time: "2024-01-01T00:00:00+00:00".to_string(),
            modify_time: "2024-01-02T00:00:00+00:00".to_string(),
            file_size: 12,
            sha256: None,
        };
        let json = String::from_utf8(header.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"Name\":\"a.txt\""));
        assert!(json.contains("\"FileSize\":12"));
        assert!(!json.contains("Sha256"));
    }

    #[test]
    fn test_parse_ignores_padding() {
        let header = FileHeader {
            name: "b".to_string(),
            creation_time: String::new(),
            modify_time: String::new(),
            file_size: 1,
            sha256: Some("00".to_string()),
        };
        let mut bytes = header.to_bytes().unwrap();
        bytes.resize(512, 0);
        assert_eq!(FileHeader::parse(&bytes).unwrap(), header);
        assert!(FileHeader::parse(&[0u8; 16]).is_err());
        assert!(FileHeader::parse(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_hash_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.txt");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            hash_file(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_from_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.bin");
        std::fs::write(&path, vec![1u8; 10]).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        let header = FileHeader::from_metadata(&path, &metadata, None);
        assert_eq!(header.name, "m.bin");
        assert_eq!(header.file_size, 10);
        assert!(!header.modify_time.is_empty());
    }
}
