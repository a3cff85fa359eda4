//! The uniform read contract over tileset packages, plus package format
//! detection.

use std::path::Path;

use crate::TilesetError;

/// A lazy sequence of entry keys produced by [`TilesetSource::keys`].
///
/// Each step may touch the underlying storage, so individual items can fail.
/// Enumeration order is backend-defined: hash order for archives, storage
/// order for databases. Callers must not depend on a particular order.
pub type Keys<'a> = Box<dyn Iterator<Item = Result<String, TilesetError>> + 'a>;

/// Read access to one tileset package: named binary entries addressable by
/// a string key (a relative path).
///
/// A source is a handle over exactly one opened container. It starts
/// closed, [`open`](Self::open) moves it to opened, and
/// [`close`](Self::close) back to closed; reads are only valid while
/// opened. Misusing the lifecycle is a programming error and fails
/// immediately with [`TilesetError::AlreadyOpen`] or
/// [`TilesetError::NotOpen`] rather than silently no-opping.
///
/// Reads take `&mut self`: a source owns a single file handle and callers
/// that want concurrent access must synchronize externally. Dropping an
/// open source releases its resources, but going through `close` keeps
/// lifecycle bugs visible.
pub trait TilesetSource {
    /// Opens the container at `path` and prepares it for random access.
    fn open(&mut self, path: &Path) -> Result<(), TilesetError>;

    /// Enumerates the keys of all entries in the package.
    fn keys(&mut self) -> Result<Keys<'_>, TilesetError>;

    /// Returns the content stored for `key`, or `Ok(None)` when the package
    /// has no such entry. Absence is never an error.
    fn value(&mut self, key: &str) -> Result<Option<Vec<u8>>, TilesetError>;

    /// Releases the underlying handle and any in-memory state.
    fn close(&mut self) -> Result<(), TilesetError>;
}

/// The physical container formats a tileset package can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageType {
    /// A `.3tz` file: a ZIP-compatible archive with a reserved hash index
    /// entry.
    Archive,
    /// A `.3dtiles` file: a SQLite database with a `media` table.
    Sqlite,
}

impl PackageType {
    /// Tries to determine the package type from a file name.
    pub fn try_from(path: impl AsRef<Path>) -> Option<PackageType> {
        Self::split_str(path.as_ref().to_string_lossy().as_ref())
            .map(|(_, package_type)| package_type)
    }

    /// Returns the file extension for this package type.
    pub fn extension(self) -> &'static str {
        match self {
            PackageType::Archive => ".3tz",
            PackageType::Sqlite => ".3dtiles",
        }
    }

    /// Splits the given string into its stem and package type, removing the
    /// extension.
    pub fn split_str(path: &str) -> Option<(&str, PackageType)> {
        if let Some(stem) = path.strip_suffix(".3tz") {
            Some((stem, PackageType::Archive))
        } else if let Some(stem) = path.strip_suffix(".3dtiles") {
            Some((stem, PackageType::Sqlite))
        } else {
            None
        }
    }
}

/// Opens the tileset package at `path` with the backend selected from its
/// file extension.
pub fn open_package(path: &Path) -> Result<Box<dyn TilesetSource>, TilesetError> {
    let package_type = PackageType::try_from(path).ok_or(TilesetError::UnsupportedFormat)?;
    let mut source: Box<dyn TilesetSource> = match package_type {
        PackageType::Archive => Box::new(crate::ArchiveSource::new()),
        #[cfg(feature = "sqlite")]
        PackageType::Sqlite => Box::new(crate::SqliteSource::new()),
        #[cfg(not(feature = "sqlite"))]
        PackageType::Sqlite => return Err(TilesetError::UnsupportedFormat),
    };
    source.open(path)?;
    Ok(source)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detects_package_type_from_extension() {
        assert_eq!(
            PackageType::try_from("city/tiles.3tz"),
            Some(PackageType::Archive)
        );
        assert_eq!(
            PackageType::try_from("city/tiles.3dtiles"),
            Some(PackageType::Sqlite)
        );
        assert_eq!(PackageType::try_from("city/tiles.zip"), None);
        assert_eq!(PackageType::try_from("city/tiles"), None);
    }

    #[test]
    fn splits_stem_and_extension() {
        assert_eq!(
            PackageType::split_str("tiles.3tz"),
            Some(("tiles", PackageType::Archive))
        );
        assert_eq!(
            PackageType::split_str("tiles.3dtiles"),
            Some(("tiles", PackageType::Sqlite))
        );
        assert_eq!(PackageType::split_str("tiles.3tz.gz"), None);
        assert_eq!(
            PackageType::Archive.extension(),
            ".3tz"
        );
    }
}
