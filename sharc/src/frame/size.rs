use std::fmt;

use log::trace;
use shcore::buf::{end_offset, read_u32_le, read_u64_le};

use crate::error::SizeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeWidth {
    U32,
    U64,
}

impl SizeWidth {
    pub fn len(&self) -> usize {
        match self {
            SizeWidth::U32 => 4,
            SizeWidth::U64 => 8,
        }
    }
}

impl fmt::Display for SizeWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeWidth::U32 => write!(f, "u32"),
            SizeWidth::U64 => write!(f, "u64"),
        }
    }
}

/// A size field whose width has been settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeField {
    pub width: SizeWidth,
    pub value: u64,
    /// First blob byte (right after the size field).
    pub start: usize,
    /// One past the last blob byte.
    pub end: usize,
}

/// Decide the width of the size field at `field_offset`.
///
/// `next_marker` is the offset of the first marker found after the field,
/// `None` when this is the last blob of the file. The 4 byte reading wins
/// when it lands the blob end on `next_marker`; otherwise the 8 byte reading
/// must. For the last blob see [`resolve_last`].
pub fn resolve_size(
    buf: &[u8],
    field_offset: usize,
    next_marker: Option<usize>,
) -> Result<SizeField, SizeError> {
    let value32 = read_u32_le(buf, field_offset)
        .ok_or(SizeError::Truncated { offset: field_offset })? as u64;
    let value64 = read_u64_le(buf, field_offset);

    let narrow = end_offset(field_offset, 4, value32).map(|end| SizeField {
        width: SizeWidth::U32,
        value: value32,
        start: field_offset + 4,
        end,
    });
    let wide = value64.and_then(|value| {
        end_offset(field_offset, 8, value).map(|end| SizeField {
            width: SizeWidth::U64,
            value,
            start: field_offset + 8,
            end,
        })
    });

    let resolved = match next_marker {
        Some(next) => [narrow, wide]
            .into_iter()
            .flatten()
            .find(|field| field.end == next)
            .ok_or(SizeError::Mismatch {
                offset: field_offset,
                next_marker: next,
            })?,
        None => resolve_last(buf, field_offset, narrow, wide)?,
    };

    trace!(
        "size field at {field_offset}: {} = {} ({}..{})",
        resolved.width,
        resolved.value,
        resolved.start,
        resolved.end
    );
    Ok(resolved)
}

/// The last blob has no marker behind it. A reading that ends exactly on end
/// of file wins. Otherwise the blob is followed by padding: when both readings
/// stay inside the file, only the one leaving nothing but zero bytes behind
/// is accepted.
fn resolve_last(
    buf: &[u8],
    field_offset: usize,
    narrow: Option<SizeField>,
    wide: Option<SizeField>,
) -> Result<SizeField, SizeError> {
    let len = buf.len();
    let candidates = || [narrow, wide].into_iter().flatten();

    if let Some(exact) = candidates().find(|field| field.end == len) {
        return Ok(exact);
    }

    let inside: Vec<SizeField> = candidates().filter(|field| field.end < len).collect();
    match inside[..] {
        [] => Err(SizeError::PastEof {
            offset: field_offset,
            file_len: len,
        }),
        [only] => Ok(only),
        _ => {
            let padded: Vec<SizeField> = inside
                .into_iter()
                .filter(|field| buf[field.end..].iter().all(|b| *b == 0))
                .collect();
            match padded[..] {
                [only] => Ok(only),
                _ => Err(SizeError::Ambiguous {
                    offset: field_offset,
                }),
            }
        }
    }
}

#[cfg(test)]
mod test_resolve_size {
    use super::*;

    fn with_u32(len: u32, payload: usize) -> Vec<u8> {
        let mut buf = len.to_le_bytes().to_vec();
        buf.resize(4 + payload, 0xAA);
        buf
    }

    fn with_u64(len: u64, payload: usize) -> Vec<u8> {
        let mut buf = len.to_le_bytes().to_vec();
        buf.resize(8 + payload, 0xAA);
        buf
    }

    #[test]
    fn narrow_lands_on_marker() {
        let mut buf = with_u32(5, 5);
        let next = buf.len();
        buf.extend_from_slice(b"ZZZ4");

        let field = resolve_size(&buf, 0, Some(next)).unwrap();
        assert_eq!(field.width, SizeWidth::U32);
        assert_eq!(field.value, 5);
        assert_eq!((field.start, field.end), (4, 9));
    }

    #[test]
    fn wide_lands_on_marker() {
        let mut buf = with_u64(12, 12);
        let next = buf.len();
        buf.extend_from_slice(b"ZZZ4");

        let field = resolve_size(&buf, 0, Some(next)).unwrap();
        assert_eq!(field.width, SizeWidth::U64);
        assert_eq!(field.value, 12);
        assert_eq!((field.start, field.end), (8, 20));
    }

    #[test]
    fn colliding_low_word_picks_width_that_hits_marker() {
        // Low 32 bits read 16 either way, only the 8 byte reading lands on
        // the marker placed after 16 payload bytes.
        let mut buf = with_u64(16, 16);
        let next = buf.len();
        buf.extend_from_slice(b"ZZZ4");
        let field = resolve_size(&buf, 0, Some(next)).unwrap();
        assert_eq!(field.width, SizeWidth::U64);

        // Same bytes but the marker sits where the 4 byte reading ends.
        let mut buf = with_u32(16, 16);
        let next = buf.len();
        buf.extend_from_slice(b"ZZZ4");
        let field = resolve_size(&buf, 0, Some(next)).unwrap();
        assert_eq!(field.width, SizeWidth::U32);
    }

    #[test]
    fn neither_width_hits_marker() {
        let mut buf = with_u32(3, 7);
        let next = buf.len();
        buf.extend_from_slice(b"ZZZ4");

        assert_eq!(
            resolve_size(&buf, 0, Some(next)),
            Err(SizeError::Mismatch {
                offset: 0,
                next_marker: next,
            })
        );
    }

    #[test]
    fn field_offset_is_honoured() {
        let mut buf = b"ZZZ4".to_vec();
        buf.extend_from_slice(&with_u32(2, 2));
        let next = buf.len();
        buf.extend_from_slice(b"ZZZ4");

        let field = resolve_size(&buf, 4, Some(next)).unwrap();
        assert_eq!((field.start, field.end), (8, 10));
    }

    #[test]
    fn last_blob_exact_eof() {
        let buf = with_u64(3, 3);
        let field = resolve_size(&buf, 0, None).unwrap();
        assert_eq!(field.width, SizeWidth::U64);
        assert_eq!(field.end, buf.len());
    }

    #[test]
    fn last_blob_with_padding() {
        let mut buf = with_u32(3, 3);
        buf.extend_from_slice(&[0u8; 16]);
        let field = resolve_size(&buf, 0, None).unwrap();
        assert_eq!(field.width, SizeWidth::U32);
        assert_eq!(field.end, 7);
    }

    #[test]
    fn last_wide_blob_with_padding() {
        let mut buf = with_u64(5, 0);
        buf.extend_from_slice(b"hello");
        buf.extend_from_slice(&[0u8; 16]);

        let field = resolve_size(&buf, 0, None).unwrap();
        assert_eq!(field.width, SizeWidth::U64);
        assert_eq!(&buf[field.start..field.end], b"hello");
    }

    #[test]
    fn last_blob_both_widths_plausible() {
        // Either reading leaves only zeros behind
        let mut buf = with_u64(4, 0);
        buf.extend_from_slice(&[0u8; 16]);
        assert_eq!(
            resolve_size(&buf, 0, None),
            Err(SizeError::Ambiguous { offset: 0 })
        );

        // Either reading leaves non zero bytes behind
        let mut buf = with_u64(2, 0);
        buf.extend_from_slice(b"abcdefgh");
        assert_eq!(
            resolve_size(&buf, 0, None),
            Err(SizeError::Ambiguous { offset: 0 })
        );
    }

    #[test]
    fn last_blob_past_eof() {
        let buf = with_u32(100, 3);
        assert_eq!(
            resolve_size(&buf, 0, None),
            Err(SizeError::PastEof {
                offset: 0,
                file_len: 7,
            })
        );
    }

    #[test]
    fn truncated_field() {
        assert_eq!(
            resolve_size(&[1, 2, 3], 0, None),
            Err(SizeError::Truncated { offset: 0 })
        );
    }

    #[test]
    fn huge_value_does_not_overflow() {
        let buf = with_u64(u64::MAX, 0);
        assert!(resolve_size(&buf, 0, None).is_err());
        assert!(resolve_size(&buf, 0, Some(8)).is_err());
    }

    #[test]
    fn empty_blob() {
        let mut buf = with_u32(0, 0);
        buf.extend_from_slice(b"ZZZ4");
        let field = resolve_size(&buf, 0, Some(4)).unwrap();
        assert_eq!((field.width, field.start, field.end), (SizeWidth::U32, 4, 4));
    }
}
