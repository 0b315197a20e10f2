use shcore::FourCC;

/// Build a DXBC container holding `chunks` in order.
///
/// The checksum is left zeroed, nothing in this crate verifies it.
pub fn build_container(chunks: &[(FourCC, &[u8])]) -> Vec<u8> {
    let table_end = 32 + 4 * chunks.len();
    let mut out = Vec::with_capacity(table_end);

    out.extend_from_slice(b"DXBC");
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // total_size, patched below
    out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
    out.resize(table_end, 0);

    for (i, (tag, data)) in chunks.iter().enumerate() {
        let offset = out.len() as u32;
        out[32 + i * 4..36 + i * 4].copy_from_slice(&offset.to_le_bytes());

        out.extend_from_slice(tag.as_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }

    let total_size = out.len() as u32;
    out[24..28].copy_from_slice(&total_size.to_le_bytes());
    out
}

/// Build a `DXIL` chunk payload with `bitcode` right after the header.
pub fn build_dxil_program(program_version: u32, bitcode: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(24 + bitcode.len());
    let dwords = (24 + bitcode.len()).div_ceil(4) as u32;

    out.extend_from_slice(&program_version.to_le_bytes());
    out.extend_from_slice(&dwords.to_le_bytes());
    out.extend_from_slice(b"DXIL");
    out.extend_from_slice(&0x0106u32.to_le_bytes());
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&(bitcode.len() as u32).to_le_bytes());
    out.extend_from_slice(bitcode);
    out
}
