//! Blob decompression
//!
//! Blobs are usually LZ4 but the container does not say which flavour. Frame
//! formats carry their own size so they are decoded until the frame ends; a
//! raw LZ4 block needs the caller to bound the output.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use log::trace;
use serde::Deserialize;

use crate::error::DecodeError;
use crate::frame::{Framing, RawBlobSpan};

pub const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Compression {
    /// Pick by magic number, raw LZ4 block when none matches.
    #[default]
    Auto,
    Lz4Frame,
    Lz4Block,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Auto => write!(f, "auto"),
            Compression::Lz4Frame => write!(f, "lz4-frame"),
            Compression::Lz4Block => write!(f, "lz4-block"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Compression::Auto),
            "lz4-frame" => Ok(Compression::Lz4Frame),
            "lz4-block" => Ok(Compression::Lz4Block),
            "zstd" => Ok(Compression::Zstd),
            x => Err(format!(
                "unknown compression {x:?} (expected auto, lz4-frame, lz4-block or zstd)"
            )),
        }
    }
}

impl Compression {
    /// Resolve [`Compression::Auto`] against the first bytes of a blob.
    pub fn detect(self, data: &[u8]) -> Compression {
        match self {
            Compression::Auto if data.starts_with(&LZ4_FRAME_MAGIC) => Compression::Lz4Frame,
            Compression::Auto if data.starts_with(&ZSTD_MAGIC) => Compression::Zstd,
            Compression::Auto => Compression::Lz4Block,
            x => x,
        }
    }
}

pub trait Decompressor: Send + Sync {
    /// Decompress one blob. `size_hint` is the exact decompressed size when
    /// the container records it.
    fn decompress(&self, data: &[u8], size_hint: Option<u64>) -> Result<Vec<u8>, DecodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    pub compression: Compression,
    pub max_decompressed_size: usize,
    /// Output bound for raw LZ4 blocks without a size hint.
    pub max_block_size: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Codec {
            compression: Compression::Auto,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

impl Codec {
    pub fn new(compression: Compression) -> Self {
        Codec {
            compression,
            ..Codec::default()
        }
    }

    fn read_limited<R: Read>(
        &self,
        reader: R,
        io_err: fn(std::io::Error) -> DecodeError,
    ) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        reader
            .take(self.max_decompressed_size as u64 + 1)
            .read_to_end(&mut out)
            .map_err(io_err)?;

        if out.len() > self.max_decompressed_size {
            return Err(DecodeError::TooLarge {
                limit: self.max_decompressed_size,
            });
        }
        Ok(out)
    }

    fn block(&self, data: &[u8], size_hint: Option<u64>) -> Result<Vec<u8>, DecodeError> {
        let capacity = match size_hint {
            Some(hint) if hint > self.max_decompressed_size as u64 => {
                return Err(DecodeError::TooLarge {
                    limit: self.max_decompressed_size,
                })
            }
            Some(hint) => hint as usize,
            None => self.max_block_size.min(self.max_decompressed_size),
        };

        let out = lz4_flex::block::decompress(data, capacity)?;
        match size_hint {
            Some(hint) if out.len() as u64 != hint => Err(DecodeError::SizeMismatch {
                expected: hint,
                found: out.len(),
            }),
            _ => Ok(out),
        }
    }
}

impl Decompressor for Codec {
    fn decompress(&self, data: &[u8], size_hint: Option<u64>) -> Result<Vec<u8>, DecodeError> {
        let compression = self.compression.detect(data);
        trace!("decompressing {} bytes as {compression}", data.len());

        match compression {
            Compression::Lz4Frame => {
                self.read_limited(lz4_flex::frame::FrameDecoder::new(data), DecodeError::Lz4Frame)
            }
            Compression::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(data).map_err(DecodeError::Zstd)?;
                self.read_limited(decoder, DecodeError::Zstd)
            }
            Compression::Lz4Block | Compression::Auto => self.block(data, size_hint),
        }
    }
}

/// A blob after decompression, independent of the cache file buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressedBlob {
    pub sequence_index: usize,
    pub bytes: Vec<u8>,
}

/// Decompress the blob at `span`, `data` being the span's bytes.
///
/// Only delimited framing records the decompressed size, sized framing
/// leaves the output length to the decoder.
pub fn decompress_blob(
    codec: &dyn Decompressor,
    span: &RawBlobSpan,
    data: &[u8],
    framing: Framing,
) -> Result<DecompressedBlob, DecodeError> {
    let size_hint = match framing {
        Framing::Sized => None,
        Framing::Delimited => Some(span.declared_size),
    };

    Ok(DecompressedBlob {
        sequence_index: span.sequence_index,
        bytes: codec.decompress(data, size_hint)?,
    })
}
