//! Locating the container's directory metadata and the reserved hash index
//! entry.
//!
//! The reader never scans the container from the start: it finds the end of
//! central directory record by a bounded backward signature scan, walks the
//! central directory to the one entry named [`INDEX_ENTRY_NAME`], and loads
//! that entry's payload as the hash index. Everything else is reached
//! through index offsets.

use std::io::{Read, Seek};

use crate::fileio::{read_exact_at, read_vec_at, stream_len};
use crate::index::{ZipIndex, INDEX_ENTRY_NAME};
use crate::local_entry::{field_u64, read_entry_payload, read_local_entry, CompressionMethod};
use crate::TilesetError;

/// End of central directory signature, `PK\x05\x06`.
pub const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

/// Fixed size of the end of central directory record, before the comment.
pub const EOCD_SIZE: u64 = 22;

/// Central directory header signature, `PK\x01\x02`.
pub const CENTRAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];

/// Fixed size of a central directory header, before its variable fields.
pub const CENTRAL_HEADER_SIZE: u64 = 46;

const ZIP64_LOCATOR_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x06, 0x07];
const ZIP64_LOCATOR_SIZE: u64 = 20;
const ZIP64_EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x06, 0x06];
const ZIP64_EOCD_SIZE: usize = 56;

/// The trailing comment is at most this long, which bounds the backward
/// signature scan.
const MAX_COMMENT_LENGTH: u64 = 0xFFFF;

/// Locates the index entry, reads its payload and decodes the hash index.
pub fn read_zip_index<R: Read + Seek>(reader: &mut R) -> Result<ZipIndex, TilesetError> {
    let file_length = stream_len(reader)?;
    let eocd_offset = find_eocd(reader, file_length)?;
    let (directory_offset, entry_count) = directory_bounds(reader, eocd_offset)?;
    let header_offset = find_index_entry(reader, directory_offset, entry_count)?;

    let entry = read_local_entry(reader, header_offset)?;
    if entry.compression != CompressionMethod::Stored {
        return Err(TilesetError::IndexNotStored);
    }
    let payload = read_entry_payload(reader, &entry)?;
    let index = ZipIndex::parse(&payload)?;
    tracing::debug!(entries = index.len(), "loaded tileset archive hash index");
    Ok(index)
}

/// Scans backward from the end of the container for the end of central
/// directory signature, allowing for a trailing comment.
fn find_eocd<R: Read + Seek>(reader: &mut R, file_length: u64) -> Result<u64, TilesetError> {
    if file_length < EOCD_SIZE {
        return Err(TilesetError::MissingEndOfCentralDirectory);
    }

    let tail_length = file_length.min(EOCD_SIZE + MAX_COMMENT_LENGTH);
    let tail_start = file_length - tail_length;
    let tail = read_vec_at(reader, tail_start, tail_length as usize)?;

    for position in (0..=tail.len() - EOCD_SIZE as usize).rev() {
        if tail[position..position + 4] == EOCD_SIGNATURE {
            return Ok(tail_start + position as u64);
        }
    }
    Err(TilesetError::MissingEndOfCentralDirectory)
}

/// Reads the start offset and entry count of the central directory from the
/// end of central directory record, following the ZIP64 locator when the
/// 32-bit fields saturate.
fn directory_bounds<R: Read + Seek>(
    reader: &mut R,
    eocd_offset: u64,
) -> Result<(u64, u64), TilesetError> {
    let mut record = [0u8; EOCD_SIZE as usize];
    read_exact_at(reader, eocd_offset, &mut record)?;

    let entry_count = u16::from_le_bytes([record[10], record[11]]);
    let directory_offset = u32::from_le_bytes([record[16], record[17], record[18], record[19]]);

    if directory_offset == 0xFFFF_FFFF || entry_count == 0xFFFF {
        return zip64_directory_bounds(reader, eocd_offset);
    }
    Ok((u64::from(directory_offset), u64::from(entry_count)))
}

fn zip64_directory_bounds<R: Read + Seek>(
    reader: &mut R,
    eocd_offset: u64,
) -> Result<(u64, u64), TilesetError> {
    if eocd_offset < ZIP64_LOCATOR_SIZE {
        return Err(TilesetError::MissingEndOfCentralDirectory);
    }

    let locator_offset = eocd_offset - ZIP64_LOCATOR_SIZE;
    let mut locator = [0u8; ZIP64_LOCATOR_SIZE as usize];
    read_exact_at(reader, locator_offset, &mut locator)?;
    if locator[..4] != ZIP64_LOCATOR_SIGNATURE {
        return Err(TilesetError::MissingEndOfCentralDirectory);
    }
    let zip64_eocd_offset = field_u64(&locator, 8);

    let mut record = [0u8; ZIP64_EOCD_SIZE];
    read_exact_at(reader, zip64_eocd_offset, &mut record)?;
    if record[..4] != ZIP64_EOCD_SIGNATURE {
        return Err(TilesetError::MissingEndOfCentralDirectory);
    }

    let entry_count = field_u64(&record, 32);
    let directory_offset = field_u64(&record, 48);
    Ok((directory_offset, entry_count))
}

/// Walks the central directory and returns the local header offset of the
/// entry named [`INDEX_ENTRY_NAME`].
fn find_index_entry<R: Read + Seek>(
    reader: &mut R,
    directory_offset: u64,
    entry_count: u64,
) -> Result<u64, TilesetError> {
    let mut position = directory_offset;
    for _ in 0..entry_count {
        let mut header = [0u8; CENTRAL_HEADER_SIZE as usize];
        read_exact_at(reader, position, &mut header)?;
        if header[..4] != CENTRAL_HEADER_SIGNATURE {
            return Err(TilesetError::BadCentralHeader { offset: position });
        }

        let compressed_size = u32::from_le_bytes([header[20], header[21], header[22], header[23]]);
        let uncompressed_size =
            u32::from_le_bytes([header[24], header[25], header[26], header[27]]);
        let name_length = u16::from_le_bytes([header[28], header[29]]) as u64;
        let extra_length = u16::from_le_bytes([header[30], header[31]]) as u64;
        let comment_length = u16::from_le_bytes([header[32], header[33]]) as u64;
        let local_offset = u32::from_le_bytes([header[42], header[43], header[44], header[45]]);

        let name = read_vec_at(reader, position + CENTRAL_HEADER_SIZE, name_length as usize)?;
        if name == INDEX_ENTRY_NAME.as_bytes() {
            let mut offset = u64::from(local_offset);
            if local_offset == 0xFFFF_FFFF {
                let extra = read_vec_at(
                    reader,
                    position + CENTRAL_HEADER_SIZE + name_length,
                    extra_length as usize,
                )?;
                offset = zip64_local_offset(&extra, uncompressed_size, compressed_size)
                    .unwrap_or(offset);
            }
            return Ok(offset);
        }

        position += CENTRAL_HEADER_SIZE + name_length + extra_length + comment_length;
    }
    Err(TilesetError::MissingIndexEntry)
}

/// Extracts the 64-bit local header offset from a central entry's ZIP64
/// extra field. The offset follows the size fields, each of which is only
/// present when its 32-bit counterpart saturated.
fn zip64_local_offset(extra: &[u8], uncompressed_size: u32, compressed_size: u32) -> Option<u64> {
    let mut position = 0;
    while position + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[position], extra[position + 1]]);
        let size = u16::from_le_bytes([extra[position + 2], extra[position + 3]]) as usize;
        let data_end = position + 4 + size;
        if id == 0x0001 && data_end <= extra.len() {
            let mut field = position + 4;
            if uncompressed_size == 0xFFFF_FFFF {
                field += 8;
            }
            if compressed_size == 0xFFFF_FFFF {
                field += 8;
            }
            if field + 8 <= data_end {
                return Some(field_u64(extra, field));
            }
            return None;
        }
        position = data_end;
    }
    None
}
