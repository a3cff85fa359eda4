//! The indexed-archive (3TZ) backend.

use std::fs::File;
use std::path::Path;

use crate::directory::read_zip_index;
use crate::index::ZipIndex;
use crate::local_entry::{read_entry_name, read_entry_payload, read_local_entry};
use crate::source::{Keys, TilesetSource};
use crate::TilesetError;

/// A [`TilesetSource`] over a 3TZ archive.
///
/// Opening loads the reserved hash index entry fully into memory; lookups
/// then binary-search the index and parse a single local file header, so no
/// operation ever scans the whole container. The file handle and the index
/// live and die together: both are acquired by [`open`](TilesetSource::open)
/// and released by [`close`](TilesetSource::close) (or by dropping the
/// source).
#[derive(Debug, Default)]
pub struct ArchiveSource {
    state: Option<OpenArchive>,
}

#[derive(Debug)]
struct OpenArchive {
    file: File,
    index: ZipIndex,
}

impl ArchiveSource {
    /// Creates a new, closed source.
    pub fn new() -> Self {
        Self::default()
    }

    /// The hash index of the opened archive, or `None` while closed.
    ///
    /// Exposed for packaging tools and consistency checks; ordinary reads
    /// go through [`TilesetSource::value`].
    pub fn index(&self) -> Option<&ZipIndex> {
        self.state.as_ref().map(|state| &state.index)
    }
}

impl TilesetSource for ArchiveSource {
    fn open(&mut self, path: &Path) -> Result<(), TilesetError> {
        if self.state.is_some() {
            return Err(TilesetError::AlreadyOpen);
        }

        // Any failure below leaves `state` as `None`: no partial handle
        // survives a failed open.
        let mut file = File::open(path)?;
        let index = read_zip_index(&mut file)?;
        tracing::debug!(path = %path.display(), entries = index.len(), "opened tileset archive");
        self.state = Some(OpenArchive { file, index });
        Ok(())
    }

    fn keys(&mut self) -> Result<Keys<'_>, TilesetError> {
        let OpenArchive { file, index } = self.state.as_mut().ok_or(TilesetError::NotOpen)?;
        Ok(Box::new(KeysCursor {
            file,
            index,
            position: 0,
        }))
    }

    fn value(&mut self, key: &str) -> Result<Option<Vec<u8>>, TilesetError> {
        let OpenArchive { file, index } = self.state.as_mut().ok_or(TilesetError::NotOpen)?;

        let Some(offset) = index.offset_for(key) else {
            return Ok(None);
        };
        let entry = read_local_entry(file, offset)?;
        let payload = read_entry_payload(file, &entry)?;
        Ok(Some(payload))
    }

    fn close(&mut self) -> Result<(), TilesetError> {
        self.state.take().ok_or(TilesetError::NotOpen)?;
        tracing::debug!("closed tileset archive");
        Ok(())
    }
}

/// Cursor over the hash index in stored (hash-ascending) order.
///
/// The index does not store names, so each step reads one local file header
/// to recover the original key. Cost is linear in the index size, one
/// header read per step.
struct KeysCursor<'a> {
    file: &'a mut File,
    index: &'a ZipIndex,
    position: usize,
}

impl Iterator for KeysCursor<'_> {
    type Item = Result<String, TilesetError>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.index.entries().get(self.position)?;
        self.position += 1;
        Some(read_entry_name(self.file, entry.offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.index.len() - self.position;
        (remaining, Some(remaining))
    }
}
