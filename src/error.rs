use std::fmt;
use std::path::{Path, PathBuf};

use sharc::{DecodeError, FrameError};
use shcore::FourCC;
use shdxbc::DxbcError;
use shtool::ToolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("decompression failed: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Container(#[from] DxbcError),
    #[error("no {tag} chunk")]
    NotFound { tag: FourCC },
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("output {dir:?} is already claimed by {first:?}")]
    OutputConflict { dir: PathBuf, first: PathBuf },
    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse failure classes used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    Malformed,
    NotFound,
    Decode,
    Tool,
    Conflict,
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Malformed => write!(f, "malformed"),
            FailureKind::NotFound => write!(f, "not found"),
            FailureKind::Decode => write!(f, "decode"),
            FailureKind::Tool => write!(f, "tool"),
            FailureKind::Conflict => write!(f, "conflict"),
            FailureKind::Io => write!(f, "io"),
        }
    }
}

impl PipelineError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Frame(_) | PipelineError::Container(_) => FailureKind::Malformed,
            PipelineError::Decode(_) => FailureKind::Decode,
            PipelineError::NotFound { .. } => FailureKind::NotFound,
            PipelineError::Tool(_) => FailureKind::Tool,
            PipelineError::OutputConflict { .. } => FailureKind::Conflict,
            PipelineError::Io { .. } => FailureKind::Io,
        }
    }

    /// Offset carried by the error itself, if any.
    pub fn offset(&self) -> Option<usize> {
        match self {
            PipelineError::Frame(err) => Some(err.offset()),
            PipelineError::Container(err) => Some(err.offset()),
            _ => None,
        }
    }
}

/// A failure with the context needed to find it again.
///
/// `offset` is a cache file offset, except for container failures where it
/// is an offset inside the decompressed blob.
#[derive(Debug)]
pub struct Failure {
    pub file: PathBuf,
    pub sequence_index: Option<usize>,
    pub offset: Option<usize>,
    pub error: PipelineError,
}

impl Failure {
    pub fn file(file: &Path, error: impl Into<PipelineError>) -> Self {
        let error = error.into();
        Failure {
            file: file.to_path_buf(),
            sequence_index: None,
            offset: error.offset(),
            error,
        }
    }

    pub fn blob(file: &Path, sequence_index: usize, error: impl Into<PipelineError>) -> Self {
        Failure {
            sequence_index: Some(sequence_index),
            ..Failure::file(file, error)
        }
    }

    /// Offset for errors that do not carry one.
    pub fn at(mut self, offset: usize) -> Self {
        self.offset.get_or_insert(offset);
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(seq) = self.sequence_index {
            write!(f, " blob {seq}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " @ {offset}")?;
        }
        write!(f, ": [{}] {}", self.kind(), self.error)
    }
}
