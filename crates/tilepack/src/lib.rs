#![deny(missing_docs)]

//! Uniform read access to tileset packages: archives of named binary tile
//! content addressable by a relative path.
//!
//! Two container formats back the same contract:
//!
//! * **3TZ** — a ZIP-compatible archive carrying a reserved, sorted
//!   hash-index entry that maps the MD5 of every key to the byte offset of
//!   its local file header. [`ArchiveSource`] loads that index once on open
//!   and serves random lookups with a binary search instead of walking the
//!   ZIP central directory per request.
//! * **3DTILES** — a SQLite database with a single `media(key, content)`
//!   table. [`SqliteSource`] is a thin pass-through over the database.
//!
//! Consumers depend only on the [`TilesetSource`] trait; [`open_package`]
//! picks the backend from the file extension.
//!
//! ```no_run
//! use tilepack::{open_package, TilesetSource};
//!
//! let mut source = open_package("tiles.3tz".as_ref()).unwrap();
//! if let Some(bytes) = source.value("tileset.json").unwrap() {
//!     println!("root tileset is {} bytes", bytes.len());
//! }
//! source.close().unwrap();
//! ```

pub mod archive;
pub mod directory;
mod fileio;
pub mod index;
pub mod local_entry;
pub mod source;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use archive::ArchiveSource;
pub use source::{open_package, Keys, PackageType, TilesetSource};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSource;

/// An error that can occur while opening or reading a tileset package.
///
/// A key that is simply absent is not an error; lookups report it as
/// `Ok(None)`.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum TilesetError {
    #[error("tileset source is already open")]
    AlreadyOpen,

    #[error("tileset source is not open, call `open` first")]
    NotOpen,

    #[error("an io error occurred")]
    Io(#[from] std::io::Error),

    #[error("end of central directory signature not found")]
    MissingEndOfCentralDirectory,

    #[error("archive does not contain a hash index entry")]
    MissingIndexEntry,

    #[error("the hash index entry must be stored uncompressed")]
    IndexNotStored,

    #[error("hash index payload length {length} is not a multiple of the record size")]
    TruncatedIndex { length: u64 },

    #[error("hash index is not sorted ascending by hash")]
    UnsortedIndex,

    #[error("invalid local file header signature at offset {offset}")]
    BadLocalHeader { offset: u64 },

    #[error("invalid central directory header signature at offset {offset}")]
    BadCentralHeader { offset: u64 },

    #[error("unsupported compression method {method}")]
    UnsupportedCompression { method: u16 },

    #[error("entry {name:?} decompressed to {actual} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("entry name is not valid utf-8")]
    NonUtf8EntryName(#[from] std::string::FromUtf8Error),

    #[error("unsupported tileset package format")]
    UnsupportedFormat,

    #[cfg(feature = "sqlite")]
    #[error("tileset database error")]
    Sqlite(#[from] rusqlite::Error),
}
