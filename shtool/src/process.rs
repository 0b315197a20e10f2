use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Command, Output};

use log::{debug, warn};

use crate::{require_output, DisasmJob, Disassembler, ToolError};

/// Run `cmd`, `None` when the executable does not exist.
fn run(tool: &str, cmd: &mut Command) -> Result<Option<Output>, ToolError> {
    debug!("running {cmd:?}");

    let output = match cmd.output() {
        Ok(output) => output,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("{tool} not found, skipping");
            return Ok(None);
        }
        Err(source) => {
            return Err(ToolError::Spawn {
                tool: tool.to_string(),
                source,
            })
        }
    };

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(Some(output))
}

/// `llvm-dis BITCODE -o STEM.ll`
pub struct LlvmDis {
    pub program: PathBuf,
}

impl Default for LlvmDis {
    fn default() -> Self {
        LlvmDis {
            program: PathBuf::from("llvm-dis"),
        }
    }
}

impl Disassembler for LlvmDis {
    fn name(&self) -> &str {
        "llvm-dis"
    }

    fn disassemble(&self, job: &DisasmJob) -> Result<Option<PathBuf>, ToolError> {
        let out = job.output(".ll");
        let mut cmd = Command::new(&self.program);
        cmd.arg(&job.bitcode).arg("-o").arg(&out);

        match run(self.name(), &mut cmd)? {
            Some(_) => require_output(self.name(), &out).map(Some),
            None => Ok(None),
        }
    }
}

/// `dxc ARGS CONTAINER`, stdout saved as `STEM.dxil_ir.txt`
///
/// Each argument set is tried in order until one exits successfully with
/// something on stdout.
pub struct Dxc {
    pub program: PathBuf,
    pub arg_sets: Vec<Vec<OsString>>,
}

fn default_dxc_arg_sets() -> Vec<Vec<OsString>> {
    [&["-dumpbin", "-dxil"][..], &["-dumpbin"], &["-dumpbin", "-all"]]
        .iter()
        .map(|set| set.iter().map(OsString::from).collect())
        .collect()
}

impl Default for Dxc {
    fn default() -> Self {
        Dxc {
            program: PathBuf::from("dxc"),
            arg_sets: default_dxc_arg_sets(),
        }
    }
}

impl Dxc {
    pub fn new(program: PathBuf) -> Self {
        Dxc {
            program,
            ..Dxc::default()
        }
    }

    /// Only ever run with `args`, no fallbacks.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.arg_sets = vec![args.into_iter().map(Into::into).collect()];
        self
    }
}

impl Disassembler for Dxc {
    fn name(&self) -> &str {
        "dxc"
    }

    fn disassemble(&self, job: &DisasmJob) -> Result<Option<PathBuf>, ToolError> {
        let out = job.output(".dxil_ir.txt");
        let mut first_err = None;

        for args in &self.arg_sets {
            let mut cmd = Command::new(&self.program);
            cmd.args(args).arg(&job.container);

            let output = match run(self.name(), &mut cmd) {
                Ok(Some(output)) => output,
                Ok(None) => return Ok(None),
                Err(err) => {
                    debug!("{err}");
                    first_err.get_or_insert(err);
                    continue;
                }
            };
            if output.stdout.is_empty() {
                first_err.get_or_insert(ToolError::NoOutput {
                    tool: self.name().to_string(),
                    path: out.clone(),
                });
                continue;
            }

            std::fs::write(&out, &output.stdout).map_err(|source| ToolError::Io {
                path: out.clone(),
                source,
            })?;
            return Ok(Some(out));
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod test_process {
    use super::*;
    use tempfile::tempdir;

    fn job(dir: &std::path::Path) -> DisasmJob {
        DisasmJob {
            bitcode: dir.join("a.dxil"),
            container: dir.join("a.lz4_decompressed"),
            stem: dir.join("a"),
        }
    }

    #[test]
    fn missing_tool_is_skipped() {
        let dir = tempdir().unwrap();
        let llvm = LlvmDis {
            program: dir.path().join("no-such-llvm-dis"),
        };
        let dxc = Dxc {
            program: dir.path().join("no-such-dxc"),
            ..Dxc::default()
        };
        assert!(llvm.disassemble(&job(dir.path())).unwrap().is_none());
        assert!(dxc.disassemble(&job(dir.path())).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool() {
        let dir = tempdir().unwrap();
        let tool = LlvmDis {
            program: PathBuf::from("false"),
        };
        assert!(matches!(
            tool.disassemble(&job(dir.path())),
            Err(ToolError::Failed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn success_without_output_file() {
        let dir = tempdir().unwrap();
        let tool = LlvmDis {
            program: PathBuf::from("true"),
        };
        assert!(matches!(
            tool.disassemble(&job(dir.path())),
            Err(ToolError::NoOutput { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn configured_args_are_passed_through() {
        let dir = tempdir().unwrap();
        let tool = Dxc::new(PathBuf::from("echo")).with_args(["-dumpbin", "-all"]);
        let out = tool.disassemble(&job(dir.path())).unwrap().unwrap();

        let text = std::fs::read_to_string(out).unwrap();
        assert!(text.starts_with("-dumpbin -all "));
        assert!(text.trim_end().ends_with("a.lz4_decompressed"));
    }

    #[cfg(unix)]
    #[test]
    fn falls_back_to_next_arg_set() {
        let dir = tempdir().unwrap();
        let tool = Dxc {
            program: PathBuf::from("sh"),
            arg_sets: vec![
                vec!["-c".into(), "exit 3".into()],
                vec!["-c".into(), "true".into()],
                vec!["-c".into(), "echo second".into()],
            ],
        };
        let out = tool.disassemble(&job(dir.path())).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "second\n");
    }

    #[cfg(unix)]
    #[test]
    fn every_arg_set_failing_reports_first_failure() {
        let dir = tempdir().unwrap();
        let tool = Dxc {
            program: PathBuf::from("sh"),
            arg_sets: vec![vec!["-c".into(), "exit 3".into()], vec!["-c".into(), "true".into()]],
        };
        assert!(matches!(
            tool.disassemble(&job(dir.path())),
            Err(ToolError::Failed { .. })
        ));
        assert!(!dir.path().join("a.dxil_ir.txt").exists());
    }

    #[test]
    fn default_args() {
        let tool = Dxc::default();
        assert_eq!(tool.arg_sets[0], vec![OsString::from("-dumpbin"), OsString::from("-dxil")]);
        assert_eq!(tool.arg_sets.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn stdout_is_captured() {
        let dir = tempdir().unwrap();
        let tool = Dxc {
            program: PathBuf::from("echo"),
            ..Dxc::default()
        };
        let out = tool.disassemble(&job(dir.path())).unwrap().unwrap();
        assert_eq!(out, dir.path().join("a.dxil_ir.txt"));

        let text = std::fs::read_to_string(out).unwrap();
        assert!(text.contains("a.lz4_decompressed"));
    }
}
