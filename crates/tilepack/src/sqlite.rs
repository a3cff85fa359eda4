//! The relational (3DTILES) backend: a thin pass-through over a SQLite
//! database with a single `media(key, content)` table.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::source::{Keys, TilesetSource};
use crate::TilesetError;

/// A [`TilesetSource`] over a 3DTILES database.
///
/// No indexing beyond what SQLite itself provides: `value` is a point
/// lookup on the `media` table and `keys` a full scan, in storage order.
#[derive(Debug, Default)]
pub struct SqliteSource {
    connection: Option<Connection>,
}

impl SqliteSource {
    /// Creates a new, closed source.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TilesetSource for SqliteSource {
    fn open(&mut self, path: &Path) -> Result<(), TilesetError> {
        if self.connection.is_some() {
            return Err(TilesetError::AlreadyOpen);
        }

        // Read-only, so a missing database is an open error instead of a
        // silently created empty file.
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        tracing::debug!(path = %path.display(), "opened tileset database");
        self.connection = Some(connection);
        Ok(())
    }

    fn keys(&mut self) -> Result<Keys<'_>, TilesetError> {
        let connection = self.connection.as_ref().ok_or(TilesetError::NotOpen)?;

        // Rows borrow their statement, so the keys are collected up front.
        // Enumeration order is whatever the storage engine yields.
        let mut statement = connection.prepare("SELECT key FROM media")?;
        let keys = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn value(&mut self, key: &str) -> Result<Option<Vec<u8>>, TilesetError> {
        let connection = self.connection.as_ref().ok_or(TilesetError::NotOpen)?;
        let content = connection
            .query_row("SELECT content FROM media WHERE key = ?1", [key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(content)
    }

    fn close(&mut self) -> Result<(), TilesetError> {
        let connection = self.connection.take().ok_or(TilesetError::NotOpen)?;
        connection.close().map_err(|(_, error)| error)?;
        tracing::debug!("closed tileset database");
        Ok(())
    }
}
