//! Positioned reads over a seekable handle.

use std::io::{Read, Seek, SeekFrom};

/// Fills `buf` with the bytes starting at `offset`.
pub(crate) fn read_exact_at<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    buf: &mut [u8],
) -> std::io::Result<()> {
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(buf)
}

/// Reads `len` bytes starting at `offset` into a fresh buffer.
///
/// `len` usually comes straight from container metadata, so the bytes must
/// be proven to exist before a buffer is allocated for them.
pub(crate) fn read_vec_at<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    len: usize,
) -> std::io::Result<Vec<u8>> {
    let available = stream_len(reader)?;
    if offset.saturating_add(len as u64) > available {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "read past end of container",
        ));
    }
    let mut buf = vec![0u8; len];
    read_exact_at(reader, offset, &mut buf)?;
    Ok(buf)
}

/// Returns the total length of the underlying stream, restoring nothing:
/// callers always seek before the next read.
pub(crate) fn stream_len<R: Seek>(reader: &mut R) -> std::io::Result<u64> {
    reader.seek(SeekFrom::End(0))
}
