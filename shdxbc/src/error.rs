use thiserror::Error;

/// Structural problem in a DXBC container, located by byte offset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DxbcError {
    #[error("malformed DXBC header at {offset}: {reason}")]
    Header { offset: usize, reason: String },
    #[error("malformed chunk offset table at {offset}: {reason}")]
    Directory { offset: usize, reason: String },
    #[error("malformed chunk at {offset}: {reason}")]
    Chunk { offset: usize, reason: String },
    #[error("malformed DXIL program at {offset}: {reason}")]
    Program { offset: usize, reason: String },
}

impl DxbcError {
    pub(crate) fn header(offset: usize, reason: impl Into<String>) -> Self {
        DxbcError::Header {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn directory(offset: usize, reason: impl Into<String>) -> Self {
        DxbcError::Directory {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn chunk(offset: usize, reason: impl Into<String>) -> Self {
        DxbcError::Chunk {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn program(offset: usize, reason: impl Into<String>) -> Self {
        DxbcError::Program {
            offset,
            reason: reason.into(),
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            DxbcError::Header { offset, .. }
            | DxbcError::Directory { offset, .. }
            | DxbcError::Chunk { offset, .. }
            | DxbcError::Program { offset, .. } => *offset,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            DxbcError::Header { reason, .. }
            | DxbcError::Directory { reason, .. }
            | DxbcError::Chunk { reason, .. }
            | DxbcError::Program { reason, .. } => reason,
        }
    }
}
