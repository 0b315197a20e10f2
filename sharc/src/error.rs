use thiserror::Error;

/// Failure to settle a blob's size field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    #[error("size field at {offset} is cut off by end of file")]
    Truncated { offset: usize },
    #[error("size field at {offset} misses the next marker at {next_marker} as u32 and u64")]
    Mismatch { offset: usize, next_marker: usize },
    #[error("size field at {offset} runs past end of file ({file_len} bytes) as u32 or u64")]
    PastEof { offset: usize, file_len: usize },
    #[error("size field at {offset} is zero")]
    Zero { offset: usize },
    #[error("size field at {offset} of the last blob reads as u32 and u64 alike")]
    Ambiguous { offset: usize },
}

impl SizeError {
    pub fn offset(&self) -> usize {
        match self {
            SizeError::Truncated { offset }
            | SizeError::Mismatch { offset, .. }
            | SizeError::PastEof { offset, .. }
            | SizeError::Zero { offset }
            | SizeError::Ambiguous { offset } => *offset,
        }
    }
}

/// Structural failure while splitting the outer cache container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("blob {sequence_index}: {source}")]
    Size {
        sequence_index: usize,
        #[source]
        source: SizeError,
    },
    #[error("blob {sequence_index}: no data after size field at {offset}")]
    Empty { sequence_index: usize, offset: usize },
}

impl FrameError {
    pub fn sequence_index(&self) -> usize {
        match self {
            FrameError::Size { sequence_index, .. }
            | FrameError::Empty { sequence_index, .. } => *sequence_index,
        }
    }

    /// Byte offset in the cache file where the problem was detected.
    pub fn offset(&self) -> usize {
        match self {
            FrameError::Size { source, .. } => source.offset(),
            FrameError::Empty { offset, .. } => *offset,
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("lz4 frame decompression failed: {0}")]
    Lz4Frame(#[source] std::io::Error),
    #[error("lz4 block decompression failed: {0}")]
    Lz4Block(#[from] lz4_flex::block::DecompressError),
    #[error("zstd decompression failed: {0}")]
    Zstd(#[source] std::io::Error),
    #[error("blob decompressed to {found} bytes, {expected} were declared")]
    SizeMismatch { expected: u64, found: usize },
    #[error("decompressed data exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
}
