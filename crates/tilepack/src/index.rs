//! The hash index: an immutable, sorted array of `(MD5, offset)` records.
//!
//! A 3TZ archive carries one reserved entry, [`INDEX_ENTRY_NAME`], whose
//! payload is the concatenation of fixed 24-byte records: the MD5 digest of
//! an entry key followed by the little-endian byte offset of that entry's
//! local file header. The records are written sorted ascending by digest,
//! so a lookup is a binary search over raw hash bytes.

use md5::{Digest, Md5};

use crate::TilesetError;

/// Name of the reserved archive entry holding the serialized hash index.
pub const INDEX_ENTRY_NAME: &str = "@3dtilesIndex1@";

/// Width of the key digest in bytes.
pub const HASH_SIZE: usize = 16;

/// Serialized size of one index record: 16 hash bytes + 8 offset bytes.
pub const RECORD_SIZE: usize = HASH_SIZE + 8;

/// Computes the content digest of a key, as used by the index records.
pub fn key_digest(key: &str) -> [u8; HASH_SIZE] {
    Md5::digest(key.as_bytes()).into()
}

/// One record of the hash index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// MD5 digest of the entry key.
    pub hash: [u8; HASH_SIZE],
    /// Byte offset of the entry's local file header, from the start of the
    /// container.
    pub offset: u64,
}

/// The in-memory hash index of an opened 3TZ archive.
///
/// Loaded once on open, immutable for the lifetime of the open package and
/// dropped with it on close.
#[derive(Debug)]
pub struct ZipIndex {
    entries: Vec<IndexEntry>,
}

impl ZipIndex {
    /// Decodes the serialized index payload.
    ///
    /// The payload must be a whole number of [`RECORD_SIZE`] records and the
    /// records must already be sorted ascending by hash; file order is sort
    /// order by construction, so no sorting happens here.
    pub fn parse(payload: &[u8]) -> Result<Self, TilesetError> {
        if payload.len() % RECORD_SIZE != 0 {
            return Err(TilesetError::TruncatedIndex {
                length: payload.len() as u64,
            });
        }

        let mut entries = Vec::with_capacity(payload.len() / RECORD_SIZE);
        for record in payload.chunks_exact(RECORD_SIZE) {
            let mut hash = [0u8; HASH_SIZE];
            hash.copy_from_slice(&record[..HASH_SIZE]);
            let mut offset = [0u8; 8];
            offset.copy_from_slice(&record[HASH_SIZE..]);
            entries.push(IndexEntry {
                hash,
                offset: u64::from_le_bytes(offset),
            });
        }

        if entries.windows(2).any(|pair| pair[0].hash > pair[1].hash) {
            return Err(TilesetError::UnsortedIndex);
        }

        Ok(Self { entries })
    }

    /// Looks up the local header offset of `key`, or `None` if no record
    /// carries its digest. Only exact full-hash equality matches.
    pub fn offset_for(&self, key: &str) -> Option<u64> {
        let digest = key_digest(key);
        self.entries
            .binary_search_by(|entry| entry.hash.cmp(&digest))
            .ok()
            .map(|position| self.entries[position].offset)
    }

    /// The records, in stored (hash-ascending) order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of records in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
