//! DXBC chunk container
//!
//! | Offset | Type        | Name        |
//! | -----: | ----------- | ----------- |
//! | 0      | [u8; 4]     | magic `DXBC` |
//! | 4      | [u8; 16]    | checksum    |
//! | 20     | u32         | reserved    |
//! | 24     | u32         | total_size  |
//! | 28     | u32         | chunk_count |
//! | 32     | [u32; N]    | chunk offsets |
//!
//! Each offset points at a chunk: tag `[u8; 4]`, size `u32`, then `size`
//! payload bytes. Offsets are absolute from the start of the container.

use std::fmt;

use log::trace;
use shcore::buf::{read_array, read_u32_le, slice_at};
use shcore::FourCC;

use crate::error::DxbcError;

pub const DXBC_MAGIC: FourCC = FourCC(*b"DXBC");
pub const DXBC_HEADER_LEN: usize = 4 + 16 + 4 + 4 + 4;
pub const CHUNK_HEADER_LEN: usize = 8;

// Real containers hold a handful of chunks, this only bounds the work done
// on garbage.
pub const MAX_CHUNK_COUNT: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DxbcHeader {
    pub magic: FourCC,
    pub checksum: [u8; 16],
    pub reserved: u32,
    pub total_size: u32,
    pub chunk_count: u32,
}

/// One row of the chunk offset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDirectoryEntry {
    /// Position in the offset table.
    pub index: usize,
    pub tag: FourCC,
    /// Offset of the chunk header.
    pub offset: usize,
    /// Payload length from the chunk header, not yet checked against the
    /// container size.
    pub length: u32,
}

impl ChunkDirectoryEntry {
    pub fn payload_offset(&self) -> usize {
        self.offset + CHUNK_HEADER_LEN
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct DxbcChunk<'a> {
    pub tag: FourCC,
    pub payload: &'a [u8],
}

impl fmt::Debug for DxbcChunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DxbcChunk")
            .field("tag", &self.tag)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Result of looking up one tag in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction<'a> {
    Success(DxbcChunk<'a>),
    NotFound { tag: FourCC },
    Malformed(DxbcError),
}

impl<'a> Extraction<'a> {
    pub fn payload(&self) -> Option<&'a [u8]> {
        match self {
            Extraction::Success(chunk) => Some(chunk.payload),
            _ => None,
        }
    }
}

/// A parsed chunk offset table over a borrowed container.
///
/// Parsing checks that every chunk header lies inside `total_size`. Payload
/// extents are only checked when a payload is taken, so one bad chunk does
/// not hide the others.
#[derive(Debug, Clone)]
pub struct ChunkDirectory<'a> {
    bytes: &'a [u8],
    header: DxbcHeader,
    entries: Vec<ChunkDirectoryEntry>,
}

impl<'a> ChunkDirectory<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<ChunkDirectory<'a>, DxbcError> {
        if bytes.len() < DXBC_HEADER_LEN {
            return Err(DxbcError::header(
                0,
                format!("need at least {DXBC_HEADER_LEN} bytes, got {}", bytes.len()),
            ));
        }

        let magic = FourCC(read_array(bytes, 0).ok_or_else(|| DxbcError::header(0, "no magic"))?);
        if magic != DXBC_MAGIC {
            return Err(DxbcError::header(
                0,
                format!("bad magic {magic}, expected {DXBC_MAGIC}"),
            ));
        }

        // Header length was checked above
        let checksum = read_array::<16>(bytes, 4).unwrap_or_default();
        let reserved = read_u32_le(bytes, 20).unwrap_or_default();
        let total_size = read_u32_le(bytes, 24).unwrap_or_default();
        let chunk_count = read_u32_le(bytes, 28).unwrap_or_default();

        if (total_size as usize) < DXBC_HEADER_LEN {
            return Err(DxbcError::header(
                24,
                format!("total_size {total_size} is below the {DXBC_HEADER_LEN} byte header"),
            ));
        }
        if total_size as usize > bytes.len() {
            return Err(DxbcError::header(
                24,
                format!("total_size {total_size} exceeds buffer length {}", bytes.len()),
            ));
        }
        let bytes = &bytes[..total_size as usize];

        if chunk_count > MAX_CHUNK_COUNT {
            return Err(DxbcError::directory(
                28,
                format!("chunk_count {chunk_count} exceeds maximum {MAX_CHUNK_COUNT}"),
            ));
        }

        let table_end = DXBC_HEADER_LEN + chunk_count as usize * 4;
        if table_end > bytes.len() {
            return Err(DxbcError::directory(
                DXBC_HEADER_LEN,
                format!(
                    "{chunk_count} chunk offsets end at {table_end}, past total_size {total_size}"
                ),
            ));
        }

        let mut entries = Vec::with_capacity(chunk_count as usize);
        for index in 0..chunk_count as usize {
            let table_pos = DXBC_HEADER_LEN + index * 4;
            let offset = read_u32_le(bytes, table_pos)
                .ok_or_else(|| DxbcError::directory(table_pos, "offset table cut short"))?
                as usize;

            if offset < table_end {
                let region = if offset < DXBC_HEADER_LEN { "header" } else { "offset table" };
                return Err(DxbcError::directory(
                    table_pos,
                    format!("chunk {index} offset {offset} points into the {region}"),
                ));
            }

            let (Some(tag), Some(length)) =
                (read_array::<4>(bytes, offset), read_u32_le(bytes, offset + 4))
            else {
                return Err(DxbcError::chunk(
                    offset,
                    format!("chunk {index} header is outside total_size {total_size}"),
                ));
            };

            trace!("chunk {index}: {} at {offset}, {length} bytes", FourCC(tag));
            entries.push(ChunkDirectoryEntry {
                index,
                tag: FourCC(tag),
                offset,
                length,
            });
        }

        Ok(ChunkDirectory {
            bytes,
            header: DxbcHeader {
                magic,
                checksum,
                reserved,
                total_size,
                chunk_count,
            },
            entries,
        })
    }

    pub fn header(&self) -> &DxbcHeader {
        &self.header
    }

    pub fn entries(&self) -> &[ChunkDirectoryEntry] {
        &self.entries
    }

    /// Bounds checked payload of `entry`.
    pub fn payload(&self, entry: &ChunkDirectoryEntry) -> Result<&'a [u8], DxbcError> {
        slice_at(self.bytes, entry.payload_offset(), entry.length as usize).ok_or_else(|| {
            DxbcError::chunk(
                entry.offset,
                format!(
                    "chunk {} ({}) payload of {} bytes runs past total_size {}",
                    entry.index, entry.tag, entry.length, self.header.total_size
                ),
            )
        })
    }

    /// All chunks in table order.
    pub fn chunks(&self) -> impl Iterator<Item = Result<DxbcChunk<'a>, DxbcError>> + '_ {
        self.entries.iter().map(|entry| {
            self.payload(entry).map(|payload| DxbcChunk {
                tag: entry.tag,
                payload,
            })
        })
    }

    /// First chunk whose tag matches `tag` exactly.
    pub fn find(&self, tag: FourCC) -> Extraction<'a> {
        let Some(entry) = self.entries.iter().find(|e| e.tag == tag) else {
            return Extraction::NotFound { tag };
        };
        match self.payload(entry) {
            Ok(payload) => Extraction::Success(DxbcChunk { tag, payload }),
            Err(err) => Extraction::Malformed(err),
        }
    }

    /// Every chunk tagged `tag`, in table order. No match is an empty list.
    pub fn find_all(&self, tag: FourCC) -> Result<Vec<DxbcChunk<'a>>, DxbcError> {
        self.entries
            .iter()
            .filter(|e| e.tag == tag)
            .map(|entry| {
                self.payload(entry).map(|payload| DxbcChunk { tag, payload })
            })
            .collect()
    }
}

impl fmt::Display for ChunkDirectory<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} container, {} bytes, {} chunks",
            self.header.magic, self.header.total_size, self.header.chunk_count
        )?;
        for entry in &self.entries {
            let status = match self.payload(entry) {
                Ok(_) => "",
                Err(_) => " (truncated)",
            };
            writeln!(
                f,
                "  [{:>2}] {} @ {:>8} {:>10} bytes{status}",
                entry.index, entry.tag, entry.offset, entry.length
            )?;
        }
        Ok(())
    }
}

/// Parse `bytes` and look up `tag` in one step.
pub fn extract(bytes: &[u8], tag: FourCC) -> Extraction<'_> {
    match ChunkDirectory::parse(bytes) {
        Ok(dir) => dir.find(tag),
        Err(err) => Extraction::Malformed(err),
    }
}
