use anyhow::{Result, anyhow};
use std::path::Path;

/// Longest extension carried over to a materialized file name.
const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates file size against maximum limit
pub fn validate_file_size(size: u64, max_size: u64) -> Result<()> {
    if size > max_size {
        return Err(anyhow!(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "File size {} bytes exceeds maximum allowed {} bytes ({} MB)",
                size,
                max_size,
                max_size / 1024 / 1024
            ),
        }));
    }
    Ok(())
}

/// Lowercased MIME type without parameters, e.g. `text/plain; charset=utf-8` -> `text/plain`
pub fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Returns the original extension as a temp-file suffix (`.pdf`), or an empty
/// string when there is none worth keeping.
///
/// Only the last extension is kept: `report.final.pdf` -> `.pdf`.
pub fn extension_suffix(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    // `.bashrc` has no extension
    let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) else {
        return String::new();
    };

    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return String::new();
    }

    format!(".{}", ext.to_ascii_lowercase())
}

/// Whether an `allowedFileTypes` entry is well formed: `.ext`, `type/sub` or `type/*`.
pub fn is_file_type_pattern(pattern: &str) -> bool {
    if let Some(ext) = pattern.strip_prefix('.') {
        return !ext.is_empty() && !ext.contains('/');
    }
    match pattern.split_once('/') {
        Some((kind, sub)) => {
            !kind.is_empty() && !sub.is_empty() && !kind.contains('*') && !sub.contains('/')
        }
        None => false,
    }
}
