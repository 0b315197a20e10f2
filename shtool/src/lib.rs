//! External disassemblers turning extracted bitcode into readable IR.
//!
//! The tools run out of process. A tool that is not installed is skipped, it
//! is not an error.

pub mod process;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use log::{debug, warn};
use thiserror::Error;

pub use crate::process::{Dxc, LlvmDis};

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("could not start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{tool} succeeded but wrote nothing to {path:?}")]
    NoOutput { tool: String, path: PathBuf },
    #[error("could not write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Inputs of one disassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmJob {
    /// Raw LLVM bitcode.
    pub bitcode: PathBuf,
    /// The DXBC container the bitcode came from.
    pub container: PathBuf,
    /// Output path without extension, each tool appends its own.
    pub stem: PathBuf,
}

impl DisasmJob {
    pub fn output(&self, suffix: &str) -> PathBuf {
        let mut path = OsString::from(self.stem.as_os_str());
        path.push(suffix);
        PathBuf::from(path)
    }
}

pub trait Disassembler: Send + Sync {
    fn name(&self) -> &str;

    /// Path of the written IR, `None` when the tool is unavailable.
    fn disassemble(&self, job: &DisasmJob) -> Result<Option<PathBuf>, ToolError>;
}

/// Try each tool in order until one produces output.
pub struct Chain {
    tools: Vec<Box<dyn Disassembler>>,
}

impl Chain {
    pub fn new(tools: Vec<Box<dyn Disassembler>>) -> Self {
        Chain { tools }
    }
}

impl Disassembler for Chain {
    fn name(&self) -> &str {
        "chain"
    }

    /// Missing tools are passed over. If every available tool failed the
    /// first failure is returned.
    fn disassemble(&self, job: &DisasmJob) -> Result<Option<PathBuf>, ToolError> {
        let mut first_err = None;

        for tool in &self.tools {
            match tool.disassemble(job) {
                Ok(Some(path)) => return Ok(Some(path)),
                Ok(None) => debug!("{} unavailable for {:?}", tool.name(), job.bitcode),
                Err(err) => {
                    warn!("{} failed on {:?}: {err}", tool.name(), job.bitcode);
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

pub(crate) fn require_output(tool: &str, path: &Path) -> Result<PathBuf, ToolError> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(ToolError::NoOutput {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        })
    }
}
