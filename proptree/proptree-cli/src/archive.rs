//! Zip packaging for whole-version exports.

use proptree_core::error::{ProptreeError, Result};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A named text file inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub content: String,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Write entries into an in-memory deflated zip archive.
pub fn write_zip(entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|e| ProptreeError::archive(format!("Failed to add {}: {}", entry.name, e)))?;
        writer.write_all(entry.content.as_bytes())?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| ProptreeError::archive(format!("Failed to finish archive: {}", e)))?;
    Ok(cursor.into_inner())
}

/// Read every file entry of a zip archive as text. Directories are skipped and
/// invalid UTF-8 is replaced rather than rejected.
pub fn read_zip(bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ProptreeError::archive(format!("Invalid zip archive: {}", e)))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| ProptreeError::archive(format!("Failed to read entry {}: {}", index, e)))?;
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        let content = String::from_utf8_lossy(&raw).into_owned();
        entries.push(ArchiveEntry { name, content });
    }

    Ok(entries)
}
