//! Output naming and per file staging.
//!
//! Everything produced for cache file `S.cache` lives in `OUT/S/`. It is
//! first written to a hidden staging directory in `OUT` and renamed into
//! place once complete, replacing whatever an earlier run left there.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use shcore::FourCC;
use tempfile::TempDir;

use crate::error::PipelineError;

pub const RAW_SUFFIX: &str = ".cache_part";
pub const DECOMPRESSED_SUFFIX: &str = ".lz4_decompressed";

/// `S_part0001.cache_part`, the common prefix of one blob's artifacts.
pub fn part_name(stem: &str, sequence_index: usize) -> String {
    format!("{stem}_part{sequence_index:04}{RAW_SUFFIX}")
}

pub fn decompressed_name(stem: &str, sequence_index: usize) -> String {
    format!("{}{DECOMPRESSED_SUFFIX}", part_name(stem, sequence_index))
}

/// Name of the extracted `tag` payload, e.g. `S_part0001.cache_part.dxil`.
pub fn payload_name(part: &str, tag: FourCC) -> String {
    format!("{part}.{}", tag.file_extension())
}

/// Sequence index of a decompressed part written by an earlier run.
pub fn parse_decompressed_name(stem: &str, file_name: &str) -> Option<usize> {
    let digits = file_name
        .strip_prefix(stem)?
        .strip_prefix("_part")?
        .strip_suffix(DECOMPRESSED_SUFFIX)?
        .strip_suffix(RAW_SUFFIX)?;

    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Drop a known artifact suffix so derived names line up with the pipeline's.
pub fn part_of(file_name: &str) -> &str {
    file_name
        .strip_suffix(DECOMPRESSED_SUFFIX)
        .unwrap_or(file_name)
}

/// Directory whose `<stem>/` receives the output of `file`.
///
/// Files below `input_root` keep their relative directory, so `IN/sub/d.cache`
/// goes to `OUT/sub/d/`. Anything else lands directly in `output_root`.
pub fn output_root_for(input_root: &Path, file: &Path, output_root: &Path) -> PathBuf {
    file.parent()
        .and_then(|dir| dir.strip_prefix(input_root).ok())
        .map(|rel| output_root.join(rel))
        .unwrap_or_else(|| output_root.to_path_buf())
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Output directory of one cache file.
pub struct Staging {
    dir: TempDir,
    target: PathBuf,
}

impl Staging {
    pub fn new(output_root: &Path, stem: &str) -> Result<Staging, PipelineError> {
        fs::create_dir_all(output_root).map_err(|e| PipelineError::io(output_root, e))?;

        let dir = tempfile::Builder::new()
            .prefix(&format!(".{stem}.staging-"))
            .tempdir_in(output_root)
            .map_err(|e| PipelineError::io(output_root, e))?;

        Ok(Staging {
            dir,
            target: output_root.join(stem),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError> {
        let path = self.dir.path().join(name);
        fs::write(&path, bytes).map_err(|e| PipelineError::io(&path, e))?;
        Ok(path)
    }

    /// Copy an artifact of an earlier run into this staging directory.
    pub fn adopt(&self, from: &Path) -> Result<PathBuf, PipelineError> {
        let name = from.file_name().unwrap_or(from.as_os_str());
        let path = self.dir.path().join(name);
        fs::copy(from, &path).map_err(|e| PipelineError::io(from, e))?;
        Ok(path)
    }

    /// Move the staged directory to its final name.
    ///
    /// A previous output is moved aside first and only deleted once the new
    /// one is in place. If the new one cannot be moved in, the previous output
    /// is put back.
    pub fn publish(self) -> Result<PathBuf, PipelineError> {
        let root = self.target.parent().unwrap_or(Path::new("."));

        let previous = if self.target.exists() {
            let trash = tempfile::Builder::new()
                .prefix(".replaced-")
                .tempdir_in(root)
                .map_err(|e| PipelineError::io(root, e))?;
            fs::rename(&self.target, trash.path().join("previous"))
                .map_err(|e| PipelineError::io(&self.target, e))?;
            Some(trash)
        } else {
            None
        };

        if let Err(err) = fs::rename(self.dir.path(), &self.target) {
            if let Some(trash) = previous {
                restore(trash, &self.target);
            }
            return Err(PipelineError::io(&self.target, err));
        }
        debug!("published {}", self.target.display());

        // Dropping the staging handle is a no-op now its directory is gone,
        // dropping the trash deletes the previous output.
        drop(previous);
        Ok(self.target)
    }
}

// Put a moved aside output back. When that fails too the trash directory is
// kept on disk rather than deleted with the only copy.
fn restore(trash: TempDir, target: &Path) {
    let previous = trash.path().join("previous");
    if let Err(err) = fs::rename(&previous, target) {
        let kept = trash.keep();
        warn!(
            "could not restore {} ({err}), previous output left in {}",
            target.display(),
            kept.display()
        );
    }
}

#[cfg(test)]
mod test_artifact {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn names() {
        assert_eq!(part_name("shaders", 1), "shaders_part0001.cache_part");
        assert_eq!(part_name("shaders", 12345), "shaders_part12345.cache_part");
        assert_eq!(
            decompressed_name("shaders", 7),
            "shaders_part0007.cache_part.lz4_decompressed"
        );
        assert_eq!(
            payload_name("shaders_part0007.cache_part", FourCC(*b"DXIL")),
            "shaders_part0007.cache_part.dxil"
        );
        assert_eq!(payload_name("p", FourCC([b'S', b'F', b'I', 0])), "p.53464900");
    }

    #[test]
    fn parse_names() {
        assert_eq!(
            parse_decompressed_name("a", "a_part0042.cache_part.lz4_decompressed"),
            Some(42)
        );
        assert_eq!(parse_decompressed_name("a", "a_part0042.cache_part"), None);
        assert_eq!(parse_decompressed_name("a", "b_part0042.cache_part.lz4_decompressed"), None);
        assert_eq!(parse_decompressed_name("a", "a_part42.cache_part.lz4_decompressed"), None);
        assert_eq!(part_of("a_part0001.cache_part.lz4_decompressed"), "a_part0001.cache_part");
    }

    #[test]
    fn staged_files_appear_on_publish() {
        let root = tempdir().unwrap();
        let staging = Staging::new(root.path(), "shaders").unwrap();
        staging.write("x.cache_part", b"abc").unwrap();
        assert!(!root.path().join("shaders").exists());

        let out = staging.publish().unwrap();
        assert_eq!(out, root.path().join("shaders"));
        assert_eq!(fs::read(out.join("x.cache_part")).unwrap(), b"abc");
        // Only the published directory is left behind
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn publish_replaces_previous_output() {
        let root = tempdir().unwrap();

        let first = Staging::new(root.path(), "s").unwrap();
        first.write("old", b"1").unwrap();
        first.publish().unwrap();

        let second = Staging::new(root.path(), "s").unwrap();
        second.write("new", b"2").unwrap();
        let out = second.publish().unwrap();

        assert!(!out.join("old").exists());
        assert_eq!(fs::read(out.join("new")).unwrap(), b"2");
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_publish_keeps_previous_output() {
        let root = tempdir().unwrap();

        let first = Staging::new(root.path(), "s").unwrap();
        first.write("old", b"1").unwrap();
        first.publish().unwrap();

        // Staging directory vanishes before it can be moved into place
        let second = Staging::new(root.path(), "s").unwrap();
        fs::remove_dir_all(second.path()).unwrap();
        assert!(second.publish().is_err());

        let out = root.path().join("s");
        assert_eq!(fs::read(out.join("old")).unwrap(), b"1");
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn output_root_keeps_relative_directories() {
        let input = Path::new("in");
        let out = Path::new("out");
        assert_eq!(output_root_for(input, Path::new("in/d.cache"), out), PathBuf::from("out"));
        assert_eq!(
            output_root_for(input, Path::new("in/sub/d.cache"), out),
            PathBuf::from("out/sub")
        );
        assert_eq!(
            output_root_for(input, Path::new("elsewhere/d.cache"), out),
            PathBuf::from("out")
        );
    }

    #[test]
    fn dropped_staging_leaves_nothing() {
        let root = tempdir().unwrap();
        {
            let staging = Staging::new(root.path(), "s").unwrap();
            staging.write("partial", b"1").unwrap();
        }
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
