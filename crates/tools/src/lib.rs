//! Test-support helpers that build tileset package fixtures.
//!
//! The 3TZ fixtures are written with the `zip` crate so the hand-rolled
//! reader in `tilepack` is always exercised against archives produced by an
//! independent ZIP implementation.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use md5::{Digest, Md5};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the reserved archive entry holding the serialized hash index.
pub const INDEX_ENTRY_NAME: &str = "@3dtilesIndex1@";

enum IndexMode {
    /// Compute the sorted `(md5, offset)` records from the written entries.
    Computed,
    /// Append the given bytes verbatim as the index payload.
    Raw(Vec<u8>),
    /// Write no index entry at all.
    Omitted,
}

struct PendingEntry {
    name: String,
    content: Vec<u8>,
    method: CompressionMethod,
}

/// Builds a 3TZ archive fixture on disk.
pub struct TzBuilder {
    entries: Vec<PendingEntry>,
    index: IndexMode,
}

impl Default for TzBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TzBuilder {
    /// A builder with no entries and a computed index.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: IndexMode::Computed,
        }
    }

    /// Adds a stored (uncompressed) entry.
    pub fn entry(mut self, name: &str, content: &[u8]) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_owned(),
            content: content.to_owned(),
            method: CompressionMethod::Stored,
        });
        self
    }

    /// Adds a deflate-compressed entry.
    pub fn deflated_entry(mut self, name: &str, content: &[u8]) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_owned(),
            content: content.to_owned(),
            method: CompressionMethod::Deflated,
        });
        self
    }

    /// Replaces the computed index payload with arbitrary bytes, for
    /// corruption fixtures.
    pub fn raw_index(mut self, payload: Vec<u8>) -> Self {
        self.index = IndexMode::Raw(payload);
        self
    }

    /// Omits the reserved index entry entirely.
    pub fn without_index(mut self) -> Self {
        self.index = IndexMode::Omitted;
        self
    }

    /// Writes the archive to `path`.
    pub fn write(self, path: &Path) -> anyhow::Result<()> {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = ZipWriter::new(file);
        for entry in &self.entries {
            let options = SimpleFileOptions::default().compression_method(entry.method);
            writer.start_file(entry.name.as_str(), options)?;
            writer.write_all(&entry.content)?;
        }
        writer.finish()?;

        let payload = match self.index {
            IndexMode::Computed => index_payload(path)?,
            IndexMode::Raw(payload) => payload,
            IndexMode::Omitted => return Ok(()),
        };

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut writer = ZipWriter::new_append(file)?;
        writer.start_file(
            INDEX_ENTRY_NAME,
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        )?;
        writer.write_all(&payload)?;
        writer.finish()?;
        Ok(())
    }
}

/// Reads the local header offsets back out of the finished archive and
/// serializes the sorted 24-byte index records.
fn index_payload(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut records: Vec<([u8; 16], u64)> = Vec::with_capacity(archive.len());
    for position in 0..archive.len() {
        let entry = archive.by_index(position)?;
        let digest: [u8; 16] = Md5::digest(entry.name().as_bytes()).into();
        records.push((digest, entry.header_start()));
    }
    records.sort_by(|a, b| a.0.cmp(&b.0));

    let mut payload = Vec::with_capacity(records.len() * 24);
    for (digest, offset) in records {
        payload.extend_from_slice(&digest);
        payload.extend_from_slice(&offset.to_le_bytes());
    }
    Ok(payload)
}

/// Creates a 3DTILES fixture: a SQLite database with the `media` table.
pub fn write_media_db(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
    let connection = rusqlite::Connection::open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    connection.execute(
        "CREATE TABLE media (key TEXT PRIMARY KEY, content BLOB)",
        [],
    )?;
    for (key, content) in entries {
        connection.execute(
            "INSERT INTO media (key, content) VALUES (?1, ?2)",
            rusqlite::params![key, content],
        )?;
    }
    connection.close().map_err(|(_, error)| error)?;
    Ok(())
}
