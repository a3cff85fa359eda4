//! Parsing of ZIP local file headers at known byte offsets.
//!
//! The hash index stores offsets of local file headers, not of payloads, so
//! every lookup and every enumeration step parses one of these headers on
//! demand. Headers are transient: nothing here is cached between calls.

use std::io::{Read, Seek};

use crate::fileio::{read_exact_at, read_vec_at};
use crate::TilesetError;

/// Local file header signature, `PK\x03\x04`.
pub const LOCAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Fixed size of the local file header, before the variable name and extra
/// fields.
pub const LOCAL_HEADER_SIZE: u64 = 30;

// Byte offsets of the fixed local header fields.
const COMPRESSION_METHOD: usize = 8;
const COMPRESSED_SIZE: usize = 18;
const UNCOMPRESSED_SIZE: usize = 22;
const NAME_LENGTH: usize = 26;
const EXTRA_LENGTH: usize = 28;

/// Header id of the ZIP64 extended information extra field.
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Sentinel in a 32-bit size field indicating the real value lives in the
/// ZIP64 extra field.
const ZIP64_SATURATED: u32 = 0xFFFF_FFFF;

/// How an entry's payload bytes are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Payload stored verbatim.
    Stored,
    /// Raw deflate stream.
    Deflated,
    /// Any other method code; readable as metadata but not decodable.
    Unsupported(u16),
}

impl CompressionMethod {
    fn from_code(code: u16) -> Self {
        match code {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            other => CompressionMethod::Unsupported(other),
        }
    }
}

/// A parsed local file header.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    /// The entry key, i.e. the relative path stored in the archive.
    pub name: String,
    /// Payload encoding.
    pub compression: CompressionMethod,
    /// Size of the payload as stored in the container.
    pub compressed_size: u64,
    /// Size of the payload after decompression.
    pub uncompressed_size: u64,
    /// Byte offset at which the payload starts, right after the variable
    /// name and extra fields.
    pub payload_offset: u64,
}

/// Parses the local file header starting at `offset`.
pub fn read_local_entry<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
) -> Result<LocalEntry, TilesetError> {
    let header = read_header(reader, offset)?;

    let name_length = field_u16(&header, NAME_LENGTH) as u64;
    let extra_length = field_u16(&header, EXTRA_LENGTH) as u64;

    let name_bytes = read_vec_at(reader, offset + LOCAL_HEADER_SIZE, name_length as usize)?;
    let name = String::from_utf8(name_bytes)?;

    let mut compressed_size = u64::from(field_u32(&header, COMPRESSED_SIZE));
    let mut uncompressed_size = u64::from(field_u32(&header, UNCOMPRESSED_SIZE));
    if compressed_size == u64::from(ZIP64_SATURATED)
        || uncompressed_size == u64::from(ZIP64_SATURATED)
    {
        let extra = read_vec_at(
            reader,
            offset + LOCAL_HEADER_SIZE + name_length,
            extra_length as usize,
        )?;
        apply_zip64_sizes(&extra, &mut uncompressed_size, &mut compressed_size);
    }

    Ok(LocalEntry {
        name,
        compression: CompressionMethod::from_code(field_u16(&header, COMPRESSION_METHOD)),
        compressed_size,
        uncompressed_size,
        payload_offset: offset + LOCAL_HEADER_SIZE + name_length + extra_length,
    })
}

/// Recovers only the entry name at `offset`.
///
/// This is the enumeration fast path: it skips the size and extra-field
/// bookkeeping that a payload read needs.
pub fn read_entry_name<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
) -> Result<String, TilesetError> {
    let header = read_header(reader, offset)?;
    let name_length = field_u16(&header, NAME_LENGTH) as usize;
    let name_bytes = read_vec_at(reader, offset + LOCAL_HEADER_SIZE, name_length)?;
    Ok(String::from_utf8(name_bytes)?)
}

/// Reads and decodes the payload of a parsed entry.
///
/// Identity for [`CompressionMethod::Stored`]; raw-deflate decompression for
/// [`CompressionMethod::Deflated`]. Fails if the decoded length does not
/// match the header's uncompressed size.
pub fn read_entry_payload<R: Read + Seek>(
    reader: &mut R,
    entry: &LocalEntry,
) -> Result<Vec<u8>, TilesetError> {
    let compressed = read_vec_at(
        reader,
        entry.payload_offset,
        entry.compressed_size as usize,
    )?;

    let payload = match entry.compression {
        CompressionMethod::Stored => compressed,
        CompressionMethod::Deflated => {
            let mut decoded = Vec::with_capacity(entry.uncompressed_size as usize);
            flate2::read::DeflateDecoder::new(compressed.as_slice())
                .read_to_end(&mut decoded)?;
            decoded
        }
        CompressionMethod::Unsupported(method) => {
            return Err(TilesetError::UnsupportedCompression { method });
        }
    };

    if payload.len() as u64 != entry.uncompressed_size {
        return Err(TilesetError::SizeMismatch {
            name: entry.name.clone(),
            expected: entry.uncompressed_size,
            actual: payload.len() as u64,
        });
    }
    Ok(payload)
}

fn read_header<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
) -> Result<[u8; LOCAL_HEADER_SIZE as usize], TilesetError> {
    let mut header = [0u8; LOCAL_HEADER_SIZE as usize];
    read_exact_at(reader, offset, &mut header)?;
    if header[..4] != LOCAL_HEADER_SIGNATURE {
        return Err(TilesetError::BadLocalHeader { offset });
    }
    Ok(header)
}

fn field_u16(header: &[u8], offset: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&header[offset..offset + 2]);
    u16::from_le_bytes(bytes)
}

fn field_u32(header: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&header[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// Replaces saturated 32-bit sizes with their 64-bit values from the ZIP64
/// extra field. Field order inside the extra block is uncompressed size
/// first, then compressed size; each is present only if the corresponding
/// 32-bit field saturated.
pub(crate) fn apply_zip64_sizes(extra: &[u8], uncompressed: &mut u64, compressed: &mut u64) {
    let mut position = 0;
    while position + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[position], extra[position + 1]]);
        let size = u16::from_le_bytes([extra[position + 2], extra[position + 3]]) as usize;
        let data_end = position + 4 + size;
        if id == ZIP64_EXTRA_ID && data_end <= extra.len() {
            let mut field = position + 4;
            if *uncompressed == u64::from(ZIP64_SATURATED) && field + 8 <= data_end {
                *uncompressed = field_u64(extra, field);
                field += 8;
            }
            if *compressed == u64::from(ZIP64_SATURATED) && field + 8 <= data_end {
                *compressed = field_u64(extra, field);
            }
            return;
        }
        position = data_end;
    }
}

pub(crate) fn field_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut field = [0u8; 8];
    field.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(field)
}
