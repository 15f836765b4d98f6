//! Utility functions for RustMtape

use std::path::Path;

/// Format bytes in human-readable format (B, KB, MB, GB, TB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    const THRESHOLD: u64 = 1024;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(duration_secs: f64) -> String {
    if duration_secs < 60.0 {
        format!("{:.1}s", duration_secs)
    } else if duration_secs < 3600.0 {
        let minutes = (duration_secs / 60.0) as u32;
        let seconds = duration_secs % 60.0;
        format!("{}m {:.1}s", minutes, seconds)
    } else {
        let hours = (duration_secs / 3600.0) as u32;
        let minutes = ((duration_secs % 3600.0) / 60.0) as u32;
        let seconds = duration_secs % 60.0;
        format!("{}h {}m {:.1}s", hours, minutes, seconds)
    }
}

/// Calculate transfer speed in human-readable format
pub fn format_speed(bytes: u64, duration_secs: f64) -> String {
    if duration_secs <= 0.0 {
        return "0 B/s".to_string();
    }

    let speed = bytes as f64 / duration_secs;
    format!("{}/s", format_bytes(speed as u64))
}

/// Display name of a volume ordinal (`VOL_0003`)
pub fn volume_name(ordinal: u32) -> String {
    format!("VOL_{:04}", ordinal)
}

/// Split a path into (base name, parent directory) as stored in the catalog
pub fn split_catalog_path(path: &Path) -> (String, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let directory = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    (name, directory)
}

/// Strip one pair of surrounding double quotes
pub fn strip_quotes(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
    }

    #[test]
    fn test_volume_name_is_zero_padded() {
        assert_eq!(volume_name(0), "VOL_0000");
        assert_eq!(volume_name(42), "VOL_0042");
    }

    #[test]
    fn test_split_catalog_path() {
        let (name, dir) = split_catalog_path(Path::new("/data/photos/a.jpg"));
        assert_eq!(name, "a.jpg");
        assert_eq!(dir, "/data/photos");
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"hello\""), "hello");
        assert_eq!(strip_quotes("  plain "), "plain");
        assert_eq!(strip_quotes("\""), "\"");
    }
}
