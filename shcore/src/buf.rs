use byteorder::{ByteOrder, LittleEndian};

/// Borrow `len` bytes starting at `offset`.
///
/// Returns `None` when the range overflows or does not fit inside `buf`, so
/// callers never index out of bounds on untrusted offsets.
pub fn slice_at(buf: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    let end = offset.checked_add(len)?;
    buf.get(offset..end)
}

pub fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    slice_at(buf, offset, 4).map(LittleEndian::read_u32)
}

pub fn read_u64_le(buf: &[u8], offset: usize) -> Option<u64> {
    slice_at(buf, offset, 8).map(LittleEndian::read_u64)
}

pub fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    slice_at(buf, offset, N)?.try_into().ok()
}

/// `base + header + len` as a `usize`, or `None` on overflow.
///
/// Used to turn a length field read from disk into an exclusive end offset.
pub fn end_offset(base: usize, header: usize, len: u64) -> Option<usize> {
    let len = usize::try_from(len).ok()?;
    base.checked_add(header)?.checked_add(len)
}
