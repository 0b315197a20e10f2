use log::{debug, trace};
use shcore::buf::{read_u32_le, read_u64_le};

use crate::error::{FrameError, SizeError};
use crate::frame::scan::find_marker;
use crate::frame::size::{resolve_size, SizeWidth};
use crate::frame::{Framing, RawBlobSpan, HEADER_BLOBS, MARKER};

const MARKER_LEN: usize = MARKER.0.len();

// State machine enum
#[derive(Debug, Clone, Copy)]
enum Spo {
    Start,
    ScanningMarker { from: usize },
    ResolvingSize { marker: usize },
    EmittingBlob(RawBlobSpan),
    End,
}

/// Iterator over the blobs of a cache file, header blob excluded.
///
/// With [`Framing::Sized`] the first error ends the iteration, since without
/// a trusted blob end there is no way to find the next marker. Blobs yielded
/// before the error stay valid. With [`Framing::Delimited`] the markers alone
/// delimit the blobs, so a bad size field only fails its own blob.
pub struct Splitter<'a> {
    buf: &'a [u8],
    framing: Framing,
    state: Spo,
    sequence: usize,
}

impl<'a> Splitter<'a> {
    pub fn new(buf: &'a [u8], framing: Framing) -> Self {
        Splitter {
            buf,
            framing,
            state: Spo::Start,
            sequence: 0,
        }
    }

    fn next_sized(&mut self) -> Option<Result<RawBlobSpan, FrameError>> {
        loop {
            match self.state {
                Spo::Start => {
                    trace!("start, {} bytes", self.buf.len());
                    self.state = Spo::ScanningMarker { from: 0 };
                }

                // Only the first scan can skip bytes (the engine header). After
                // that the size resolution guarantees the blob ended either on
                // a marker or after the last marker of the file.
                Spo::ScanningMarker { from } => {
                    self.state = match find_marker(self.buf, from) {
                        Some(marker) => Spo::ResolvingSize { marker },
                        None => {
                            trace!("{} trailing bytes", self.buf.len().saturating_sub(from));
                            Spo::End
                        }
                    };
                }

                Spo::ResolvingSize { marker } => {
                    let field_offset = marker + MARKER_LEN;
                    // Search past the narrowest size field so it is never
                    // mistaken for the next marker
                    let next_marker = find_marker(self.buf, field_offset + 4);

                    match resolve_size(self.buf, field_offset, next_marker) {
                        Ok(field) => {
                            debug!(
                                "blob {} at {marker}: {} size, {} bytes",
                                self.sequence, field.width, field.value
                            );
                            self.state = Spo::EmittingBlob(RawBlobSpan {
                                sequence_index: self.sequence,
                                marker_offset: marker,
                                start_offset: field.start,
                                length: field.end - field.start,
                                size_field_width: field.width,
                                declared_size: field.value,
                            });
                        }
                        Err(source) => {
                            self.state = Spo::End;
                            return Some(Err(FrameError::Size {
                                sequence_index: self.sequence,
                                source,
                            }));
                        }
                    }
                }

                Spo::EmittingBlob(span) => {
                    self.sequence += 1;
                    self.state = Spo::ScanningMarker {
                        from: span.end_offset(),
                    };

                    if span.sequence_index < HEADER_BLOBS {
                        debug!("dropping header blob {}", span.sequence_index);
                        continue;
                    }
                    return Some(Ok(span));
                }

                Spo::End => return None,
            }
        }
    }

    fn next_delimited(&mut self) -> Option<Result<RawBlobSpan, FrameError>> {
        loop {
            match self.state {
                Spo::Start => {
                    // Everything in front of the first marker is the header
                    self.sequence = HEADER_BLOBS;
                    self.state = Spo::ScanningMarker { from: 0 };
                }

                Spo::ScanningMarker { from } => {
                    self.state = match find_marker(self.buf, from) {
                        Some(marker) => Spo::ResolvingSize { marker },
                        None => Spo::End,
                    };
                }

                Spo::ResolvingSize { marker } => {
                    let field_offset = marker + MARKER_LEN;
                    let end = find_marker(self.buf, field_offset).unwrap_or(self.buf.len());

                    if end == field_offset {
                        trace!("skipping empty segment at {marker}");
                        self.state = Spo::ScanningMarker { from: end };
                        continue;
                    }

                    let sequence_index = self.sequence;
                    self.sequence += 1;

                    match delimited_span(self.buf, sequence_index, marker, end) {
                        Ok(span) => {
                            debug!(
                                "blob {sequence_index} at {marker}: {} bytes, {} decompressed",
                                span.length, span.declared_size
                            );
                            self.state = Spo::EmittingBlob(span);
                        }
                        Err(err) => {
                            self.state = Spo::ScanningMarker { from: end };
                            return Some(Err(err));
                        }
                    }
                }

                Spo::EmittingBlob(span) => {
                    self.state = Spo::ScanningMarker {
                        from: span.end_offset(),
                    };
                    return Some(Ok(span));
                }

                Spo::End => return None,
            }
        }
    }
}

// The size field holds the decompressed size, u32 unless that reads as zero.
fn delimited_span(
    buf: &[u8],
    sequence_index: usize,
    marker: usize,
    end: usize,
) -> Result<RawBlobSpan, FrameError> {
    let field_offset = marker + MARKER_LEN;
    let segment = &buf[..end];
    let size_err = |source| FrameError::Size {
        sequence_index,
        source,
    };

    let (width, declared_size) = match read_u32_le(segment, field_offset) {
        None => return Err(size_err(SizeError::Truncated { offset: field_offset })),
        Some(v) if v > 0 => (SizeWidth::U32, v as u64),
        Some(_) => match read_u64_le(segment, field_offset) {
            Some(v) if v > 0 => (SizeWidth::U64, v),
            _ => return Err(size_err(SizeError::Zero { offset: field_offset })),
        },
    };

    let start_offset = field_offset + width.len();
    if start_offset >= end {
        return Err(FrameError::Empty {
            sequence_index,
            offset: field_offset,
        });
    }

    Ok(RawBlobSpan {
        sequence_index,
        marker_offset: marker,
        start_offset,
        length: end - start_offset,
        size_field_width: width,
        declared_size,
    })
}

impl Iterator for Splitter<'_> {
    type Item = Result<RawBlobSpan, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.framing {
            Framing::Sized => self.next_sized(),
            Framing::Delimited => self.next_delimited(),
        }
    }
}

/// Everything the splitter produced for one file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Split {
    pub spans: Vec<RawBlobSpan>,
    pub errors: Vec<FrameError>,
}

pub fn split(buf: &[u8], framing: Framing) -> Split {
    let mut out = Split::default();
    for item in Splitter::new(buf, framing) {
        match item {
            Ok(span) => out.spans.push(span),
            Err(err) => out.errors.push(err),
        }
    }
    out
}
