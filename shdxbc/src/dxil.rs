//! DXIL program header
//!
//! `DXIL` and `ILDB` chunks wrap LLVM bitcode in a small header:
//!
//! | Offset | Type    | Name |
//! | -----: | ------- | ---- |
//! | 0      | u32     | program version (shader kind << 16, major << 4, minor) |
//! | 4      | u32     | program size in dwords |
//! | 8      | [u8; 4] | `DXIL` |
//! | 12     | u32     | DXIL version |
//! | 16     | u32     | bitcode offset, relative to offset 8 |
//! | 20     | u32     | bitcode size |

use log::debug;
use memchr::memmem;
use shcore::buf::{read_u32_le, slice_at};
use shcore::FourCC;

use crate::error::DxbcError;

pub const DXIL_TAG: FourCC = FourCC(*b"DXIL");
pub const ILDB_TAG: FourCC = FourCC(*b"ILDB");
pub const BITCODE_MAGIC: [u8; 4] = [b'B', b'C', 0xC0, 0xDE];
pub const PROGRAM_HEADER_LEN: usize = 24;

const DXIL_SIGNATURE: &[u8; 4] = b"DXIL";
const BITCODE_BASE: usize = 8;

/// Chunks whose payload is a DXIL program rather than opaque bytes.
pub fn is_program_tag(tag: FourCC) -> bool {
    tag == DXIL_TAG || tag == ILDB_TAG
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DxilProgram<'a> {
    pub program_version: u32,
    pub size_in_dwords: u32,
    pub dxil_version: u32,
    /// Offset of the bitcode inside the chunk payload.
    pub bitcode_offset: usize,
    pub bitcode: &'a [u8],
}

impl DxilProgram<'_> {
    pub fn shader_kind(&self) -> u16 {
        (self.program_version >> 16) as u16
    }

    pub fn shader_model(&self) -> (u8, u8) {
        (
            ((self.program_version >> 4) & 0xF) as u8,
            (self.program_version & 0xF) as u8,
        )
    }
}

/// Locate the LLVM bitcode inside a `DXIL`/`ILDB` chunk payload.
///
/// The header's bitcode offset is tried first. Some writers leave it stale, in
/// that case the first bitcode magic in the payload is used.
pub fn parse_dxil_program(payload: &[u8]) -> Result<DxilProgram<'_>, DxbcError> {
    if payload.len() < PROGRAM_HEADER_LEN {
        return Err(DxbcError::program(
            0,
            format!(
                "need at least {PROGRAM_HEADER_LEN} bytes, got {}",
                payload.len()
            ),
        ));
    }
    if slice_at(payload, 8, 4) != Some(&DXIL_SIGNATURE[..]) {
        return Err(DxbcError::program(8, "missing DXIL signature"));
    }

    // Header length was checked above
    let field = |offset| read_u32_le(payload, offset).unwrap_or_default();
    let program_version = field(0);
    let size_in_dwords = field(4);
    let dxil_version = field(12);
    let header_offset = BITCODE_BASE + field(16) as usize;
    let bitcode_size = field(20) as usize;

    let bitcode_offset = if slice_at(payload, header_offset, 4) == Some(&BITCODE_MAGIC[..]) {
        header_offset
    } else {
        let found = memmem::find(payload, &BITCODE_MAGIC).ok_or_else(|| {
            DxbcError::program(header_offset, "no bitcode magic in DXIL program")
        })?;
        debug!("bitcode not at header offset {header_offset}, found magic at {found}");
        found
    };

    let bitcode = slice_at(payload, bitcode_offset, bitcode_size).ok_or_else(|| {
        DxbcError::program(
            bitcode_offset,
            format!(
                "truncated before bitcode ended ({bitcode_size} bytes declared, {} available)",
                payload.len() - bitcode_offset
            ),
        )
    })?;

    Ok(DxilProgram {
        program_version,
        size_in_dwords,
        dxil_version,
        bitcode_offset,
        bitcode,
    })
}
