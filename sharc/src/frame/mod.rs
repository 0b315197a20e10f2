//! Marker framed shader cache container
//!
//! A shader cache file is a flat sequence of compressed blobs. Each blob
//! begins with the four byte marker `ZZZ4` followed by a little endian size
//! field and the blob bytes. There is no index, the only way to find the
//! blobs is to scan for the marker.
//!
//! | Type          | Name   | Description |
//! | ------------: | ------ | ----------- |
//! | [u8; 4]       | marker | Always `ZZZ4` (`5A 5A 5A 34`) |
//! | u32 or u64    | size   | Blob length in bytes, the width is not recorded anywhere |
//! | [u8; N]       | blob   | Compressed blob, see [`crate::decompress`] |
//!
//! The very first blob of a file is the engine's header/index blob and is
//! never emitted, see [`HEADER_BLOBS`]. Bytes after the last blob (padding)
//! are ignored.
//!
//! # Size field width
//!
//! Some writers emit a 4 byte size and some an 8 byte size. The width is
//! recovered by checking which interpretation makes the blob end exactly on
//! the next marker (or inside the file for the last blob). See
//! [`size::resolve_size`].
//!
//! # Delimited framing
//!
//! Older tooling treats the marker as a plain delimiter: a blob runs from the
//! marker to the next marker (or end of file) and the size field holds the
//! *decompressed* size of a raw LZ4 block. Everything before the first marker
//! is the header. This is selected with [`Framing::Delimited`].
//!
//! A marker sequence that happens to occur inside a blob cannot be told apart
//! from a real marker. With [`Framing::Sized`] such a blob fails to resolve
//! and is reported as malformed instead of being silently cut in two.

pub mod scan;
pub mod size;
pub mod split;

#[cfg(any(test, feature = "test-utils"))]
pub mod builder;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use shcore::FourCC;

use crate::frame::size::SizeWidth;

pub const MARKER: FourCC = FourCC(*b"ZZZ4");

/// Number of leading blobs that hold the engine's own header/index.
pub const HEADER_BLOBS: usize = 1;

/// How blob boundaries are derived from the markers.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Boundaries come from the size field, the next marker must follow.
    #[default]
    Sized,
    /// Boundaries come from the markers, the size field is the decompressed size.
    Delimited,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Sized => write!(f, "sized"),
            Framing::Delimited => write!(f, "delimited"),
        }
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sized" => Ok(Framing::Sized),
            "delimited" => Ok(Framing::Delimited),
            x => Err(format!("unknown framing {x:?} (expected sized or delimited)")),
        }
    }
}

/// Location of one blob inside the raw cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlobSpan {
    /// Position of the blob in the file, the header blob is 0.
    pub sequence_index: usize,
    pub marker_offset: usize,
    /// First byte of the blob, right after the size field.
    pub start_offset: usize,
    pub length: usize,
    pub size_field_width: SizeWidth,
    /// Raw value of the size field. Equal to `length` for sized framing, the
    /// decompressed size for delimited framing.
    pub declared_size: u64,
}

impl RawBlobSpan {
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.length
    }

    /// The blob bytes, `None` if the span does not belong to `file`.
    pub fn bytes<'a>(&self, file: &'a [u8]) -> Option<&'a [u8]> {
        shcore::buf::slice_at(file, self.start_offset, self.length)
    }
}
