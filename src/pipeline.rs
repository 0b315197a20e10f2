//! Per cache file processing.
//!
//! One file runs start to finish on one thread: split, decompress each blob,
//! extract the requested chunk, optionally disassemble it, then publish the
//! staged output directory. Blob failures are collected and never stop the
//! other blobs of the file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sharc::decompress::decompress_blob;
use sharc::{split, Decompressor, Framing, Split};
use shcore::FourCC;
use shdxbc::{extract, is_program_tag, parse_dxil_program, ChunkDirectory, Extraction};
use shtool::{DisasmJob, Disassembler};

use crate::artifact::{self, Staging};
use crate::error::{Failure, FailureKind, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub tag: FourCC,
    pub framing: Framing,
    pub skip_split: bool,
    pub skip_extract: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            tag: FourCC(*b"DXIL"),
            framing: Framing::Sized,
            skip_split: false,
            skip_extract: false,
        }
    }
}

/// What happened to one cache file.
#[derive(Debug, Default)]
pub struct FileReport {
    pub file: PathBuf,
    pub output_dir: PathBuf,
    pub blobs: usize,
    pub decompressed: usize,
    pub extracted: usize,
    pub disassembled: usize,
    pub failures: Vec<Failure>,
}

pub struct Pipeline {
    pub options: PipelineOptions,
    pub codec: Box<dyn Decompressor>,
    pub disassembler: Option<Box<dyn Disassembler>>,
}

/// The `tag` payload of a container. Program chunks are unwrapped down to
/// their bitcode.
pub fn extract_payload(container: &[u8], tag: FourCC) -> Result<&[u8], PipelineError> {
    match extract(container, tag) {
        Extraction::Success(chunk) if is_program_tag(tag) => {
            Ok(parse_dxil_program(chunk.payload)?.bitcode)
        }
        Extraction::Success(chunk) => Ok(chunk.payload),
        Extraction::NotFound { tag } => Err(PipelineError::NotFound { tag }),
        Extraction::Malformed(err) => Err(err.into()),
    }
}

impl Pipeline {
    pub fn new(options: PipelineOptions, codec: Box<dyn Decompressor>) -> Self {
        Pipeline {
            options,
            codec,
            disassembler: None,
        }
    }

    pub fn with_disassembler(mut self, disassembler: Box<dyn Disassembler>) -> Self {
        self.disassembler = Some(disassembler);
        self
    }

    /// Process `path` into `output_root/<stem>/`.
    ///
    /// `Err` means nothing was published for this file. Blob level problems
    /// end up in the report instead.
    pub fn process_file(&self, path: &Path, output_root: &Path) -> Result<FileReport, Failure> {
        let stem = artifact::file_stem(path);
        let staging = Staging::new(output_root, &stem).map_err(|e| Failure::file(path, e))?;

        let mut report = FileReport {
            file: path.to_path_buf(),
            ..FileReport::default()
        };

        let parts = if self.options.skip_split {
            self.reuse_parts(path, &stem, &staging, &mut report)?
        } else {
            self.split_file(path, &stem, &staging, &mut report)?
        };

        if !self.options.skip_extract {
            for (sequence_index, container) in parts {
                self.extract_blob(path, sequence_index, &container, &stem, &staging, &mut report);
            }
        }

        report.output_dir = staging.publish().map_err(|e| Failure::file(path, e))?;
        Ok(report)
    }

    fn split_file(
        &self,
        path: &Path,
        stem: &str,
        staging: &Staging,
        report: &mut FileReport,
    ) -> Result<Vec<(usize, Vec<u8>)>, Failure> {
        let data = fs::read(path).map_err(|e| Failure::file(path, PipelineError::io(path, e)))?;
        let out = split(&data, self.options.framing);
        debug!(
            "{}: {} blobs, {} framing errors",
            path.display(),
            out.spans.len(),
            out.errors.len()
        );

        for err in out.errors {
            let seq = err.sequence_index();
            let failure = Failure::blob(path, seq, err);
            warn!("{failure}");
            report.failures.push(failure);
        }

        let mut parts = Vec::with_capacity(out.spans.len());
        for span in out.spans {
            report.blobs += 1;
            let seq = span.sequence_index;

            // Spans always lie inside the buffer they were split from
            let Some(raw) = span.bytes(&data) else {
                continue;
            };
            staging
                .write(&artifact::part_name(stem, seq), raw)
                .map_err(|e| Failure::blob(path, seq, e))?;

            let decoded = decompress_blob(self.codec.as_ref(), &span, raw, self.options.framing);
            let blob = match decoded {
                Ok(blob) => blob,
                Err(err) => {
                    let failure = Failure::blob(path, seq, err).at(span.start_offset);
                    warn!("{failure}");
                    report.failures.push(failure);
                    continue;
                }
            };

            staging
                .write(&artifact::decompressed_name(stem, seq), &blob.bytes)
                .map_err(|e| Failure::blob(path, seq, e))?;
            report.decompressed += 1;
            parts.push((seq, blob.bytes));
        }
        Ok(parts)
    }

    /// Pick up the decompressed parts an earlier run left in the output.
    fn reuse_parts(
        &self,
        path: &Path,
        stem: &str,
        staging: &Staging,
        report: &mut FileReport,
    ) -> Result<Vec<(usize, Vec<u8>)>, Failure> {
        let previous = staging.target();
        let entries = fs::read_dir(previous)
            .map_err(|e| Failure::file(path, PipelineError::io(previous, e)))?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Failure::file(path, PipelineError::io(previous, e)))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(seq) = artifact::parse_decompressed_name(stem, &name) {
                found.push((seq, entry.path()));
            }
        }
        found.sort();

        let mut parts = Vec::with_capacity(found.len());
        for (seq, decompressed) in found {
            let raw = previous.join(artifact::part_name(stem, seq));
            if raw.is_file() {
                staging.adopt(&raw).map_err(|e| Failure::blob(path, seq, e))?;
            }
            staging
                .adopt(&decompressed)
                .map_err(|e| Failure::blob(path, seq, e))?;
            let bytes = fs::read(&decompressed)
                .map_err(|e| Failure::blob(path, seq, PipelineError::io(&decompressed, e)))?;

            report.blobs += 1;
            report.decompressed += 1;
            parts.push((seq, bytes));
        }
        debug!("{}: reusing {} decompressed parts", path.display(), parts.len());
        Ok(parts)
    }

    fn extract_blob(
        &self,
        path: &Path,
        seq: usize,
        container: &[u8],
        stem: &str,
        staging: &Staging,
        report: &mut FileReport,
    ) {
        let tag = self.options.tag;
        let part = artifact::part_name(stem, seq);

        let payload = match extract_payload(container, tag) {
            Ok(payload) => payload,
            Err(err) => {
                let failure = Failure::blob(path, seq, err);
                if failure.kind() == FailureKind::NotFound {
                    debug!("{failure}");
                } else {
                    warn!("{failure}");
                }
                report.failures.push(failure);
                return;
            }
        };

        let payload_path = match staging.write(&artifact::payload_name(&part, tag), payload) {
            Ok(p) => p,
            Err(err) => {
                report.failures.push(Failure::blob(path, seq, err));
                return;
            }
        };
        report.extracted += 1;

        let Some(disassembler) = self.disassembler.as_ref().filter(|_| is_program_tag(tag)) else {
            return;
        };
        let job = DisasmJob {
            bitcode: payload_path,
            container: staging.path().join(artifact::decompressed_name(stem, seq)),
            stem: staging.path().join(&part),
        };
        match disassembler.disassemble(&job) {
            Ok(Some(ir)) => {
                debug!("{} wrote {}", disassembler.name(), ir.display());
                report.disassembled += 1;
            }
            Ok(None) => (),
            Err(err) => report.failures.push(Failure::blob(path, seq, err)),
        }
    }
}

/// Extract `tag` from a single decompressed container on disk.
///
/// The payload is written next to `file`, or into `out_dir`, named after the
/// blob the container came from.
pub fn extract_container(
    file: &Path,
    out_dir: Option<&Path>,
    tag: FourCC,
    disassembler: Option<&dyn Disassembler>,
) -> Result<PathBuf, Failure> {
    let data = fs::read(file).map_err(|e| Failure::file(file, PipelineError::io(file, e)))?;
    let payload = extract_payload(&data, tag).map_err(|e| Failure::file(file, e))?;

    let dir = out_dir
        .or_else(|| file.parent())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    fs::create_dir_all(&dir).map_err(|e| Failure::file(file, PipelineError::io(&dir, e)))?;

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let part = artifact::part_of(&name);
    let out = dir.join(artifact::payload_name(part, tag));
    fs::write(&out, payload).map_err(|e| Failure::file(file, PipelineError::io(&out, e)))?;

    if let Some(disassembler) = disassembler.filter(|_| is_program_tag(tag)) {
        let job = DisasmJob {
            bitcode: out.clone(),
            container: file.to_path_buf(),
            stem: dir.join(part),
        };
        if let Some(ir) = disassembler.disassemble(&job).map_err(|e| Failure::file(file, e))? {
            info!("IR written to {}", ir.display());
        }
    }
    Ok(out)
}

/// Human readable description of a cache file or DXBC container.
pub fn inspect(file: &Path, framing: Framing) -> Result<String, Failure> {
    let data = fs::read(file).map_err(|e| Failure::file(file, PipelineError::io(file, e)))?;

    if data.starts_with(shdxbc::dxbc::DXBC_MAGIC.as_bytes()) {
        let dir = ChunkDirectory::parse(&data).map_err(|e| Failure::file(file, e))?;
        return Ok(ContainerSummary(dir).to_string());
    }

    let summary = SplitSummary {
        file_len: data.len(),
        framing,
        split: split(&data, framing),
    };
    Ok(summary.to_string())
}

/// Chunk table plus the program header of each DXIL/ILDB chunk.
struct ContainerSummary<'a>(ChunkDirectory<'a>);

impl fmt::Display for ContainerSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = &self.0;
        write!(f, "{dir}")?;

        for entry in dir.entries().iter().filter(|e| is_program_tag(e.tag)) {
            match dir.payload(entry).and_then(parse_dxil_program) {
                Ok(p) => writeln!(
                    f,
                    "  {}: shader kind {}, model {}.{}, {} bytes of bitcode at {}",
                    entry.tag,
                    p.shader_kind(),
                    p.shader_model().0,
                    p.shader_model().1,
                    p.bitcode.len(),
                    p.bitcode_offset
                )?,
                Err(err) => writeln!(f, "  {}: {err}", entry.tag)?,
            }
        }
        Ok(())
    }
}

/// Blob table of a cache file, followed by its framing errors.
struct SplitSummary {
    file_len: usize,
    framing: Framing,
    split: Split,
}

impl fmt::Display for SplitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} bytes, {} framing, {} blobs after the header",
            self.file_len,
            self.framing,
            self.split.spans.len()
        )?;
        for span in &self.split.spans {
            writeln!(
                f,
                "  [{:>4}] marker @ {:>10}  {:>10} bytes  {} size {}",
                span.sequence_index,
                span.marker_offset,
                span.length,
                span.size_field_width,
                span.declared_size
            )?;
        }
        for err in &self.split.errors {
            writeln!(f, "  error: {err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use sharc::frame::builder::CacheBuilder;
    use shcore::FourCC;
    use shdxbc::test_utils::{build_container, build_dxil_program};
    use std::io::Write;

    pub fn bitcode(i: usize) -> Vec<u8> {
        let mut code = b"BC\xC0\xDE".to_vec();
        code.extend_from_slice(format!("module {i}").as_bytes());
        code
    }

    pub fn container(i: usize) -> Vec<u8> {
        let program = build_dxil_program(0x0006_0060, &bitcode(i));
        build_container(&[
            (FourCC(*b"SFI0"), &[0u8; 8]),
            (FourCC(*b"DXIL"), &program),
        ])
    }

    pub fn lz4_frame(data: &[u8]) -> Vec<u8> {
        let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// Header blob followed by `n` compressed containers.
    pub fn cache_file(n: usize) -> Vec<u8> {
        let mut builder = CacheBuilder::new(Vec::new());
        builder.write_raw(b"engine header").unwrap();
        builder.write_blob32(b"index").unwrap();
        for i in 1..=n {
            builder.write_blob64(&lz4_frame(&container(i))).unwrap();
        }
        builder.into_inner()
    }
}
