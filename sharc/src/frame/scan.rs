use memchr::memmem;

use crate::frame::MARKER;

/// Offset of the first marker at or after `from`.
pub fn find_marker(buf: &[u8], from: usize) -> Option<usize> {
    let hay = buf.get(from..)?;
    memmem::find(hay, MARKER.as_bytes()).map(|pos| from + pos)
}

/// Every non overlapping marker in file order.
pub fn markers(buf: &[u8]) -> Markers<'_> {
    Markers { buf, from: 0 }
}

pub struct Markers<'a> {
    buf: &'a [u8],
    from: usize,
}

impl Iterator for Markers<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let found = find_marker(self.buf, self.from)?;
        self.from = found + MARKER.0.len();
        Some(found)
    }
}

#[cfg(test)]
mod test_find_marker {
    use super::*;

    #[test]
    fn empty() {
        assert_eq!(find_marker(b"", 0), None);
        assert_eq!(markers(b"").count(), 0);
    }

    #[test]
    fn start_past_end() {
        assert_eq!(find_marker(b"ZZZ4", 5), None);
    }

    #[test]
    fn at_start_and_restart() {
        let buf = b"ZZZ4abcZZZ4";
        assert_eq!(find_marker(buf, 0), Some(0));
        assert_eq!(find_marker(buf, 4), Some(7));
        assert_eq!(find_marker(buf, 8), None);
    }

    #[test]
    fn partial_overlap_is_not_a_match() {
        // "ZZZZ4" holds exactly one marker, starting at 1
        assert_eq!(markers(b"ZZZZ4").collect::<Vec<_>>(), vec![1]);
        assert_eq!(markers(b"ZZZ ZZ4 Z4").count(), 0);
    }

    #[test]
    fn back_to_back() {
        assert_eq!(markers(b"ZZZ4ZZZ4ZZZ4").collect::<Vec<_>>(), vec![0, 4, 8]);
    }
}
