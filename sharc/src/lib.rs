//! Outer shader cache container: marker scanning, blob splitting and blob
//! decompression.

pub mod decompress;
pub mod error;
pub mod frame;

pub use crate::decompress::{Codec, Compression, DecompressedBlob, Decompressor};
pub use crate::error::{DecodeError, FrameError, SizeError};
pub use crate::frame::split::{split, Split, Splitter};
pub use crate::frame::{Framing, RawBlobSpan};
