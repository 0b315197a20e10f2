//! Bounds checked reader for the DXBC chunk container found inside
//! decompressed shader cache blobs, plus the DXIL program header that wraps
//! the LLVM bitcode.

pub mod dxbc;
pub mod dxil;
pub mod error;

/// Synthetic container builders, only for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::dxbc::{
    extract, ChunkDirectory, ChunkDirectoryEntry, DxbcChunk, DxbcHeader, Extraction,
};
pub use crate::dxil::{is_program_tag, parse_dxil_program, DxilProgram};
pub use crate::error::DxbcError;
