//! Fixed size worker pool over cache files.
//!
//! Files are handed out through a bounded queue. Each worker checks the
//! cancel token before taking on a new file; a file already in progress
//! always runs to completion.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{info, warn};

use crate::artifact;
use crate::error::{Failure, PipelineError};
use crate::pipeline::{FileReport, Pipeline};

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum Outcome {
    Done(FileReport),
    Failed(Failure),
    Skipped(PathBuf),
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Files that were published, in input order.
    pub completed: Vec<FileReport>,
    /// Files with nothing published.
    pub failed: Vec<Failure>,
    /// Files never started because of cancellation.
    pub skipped: Vec<PathBuf>,
}

impl BatchReport {
    pub fn blob_failures(&self) -> impl Iterator<Item = &Failure> {
        self.completed.iter().flat_map(|r| r.failures.iter())
    }

    pub fn summary(&self) -> String {
        let count = |f: fn(&FileReport) -> usize| self.completed.iter().map(f).sum::<usize>();
        format!(
            concat!(
                "{} files done, {} failed, {} skipped; ",
                "{} blobs, {} decompressed, {} extracted, {} disassembled, {} blob failures"
            ),
            self.completed.len(),
            self.failed.len(),
            self.skipped.len(),
            count(|r| r.blobs),
            count(|r| r.decompressed),
            count(|r| r.extracted),
            count(|r| r.disassembled),
            self.blob_failures().count(),
        )
    }
}

/// Process `files` on `jobs` threads.
///
/// Output for a file under `input_root` mirrors its relative directory below
/// `output_root`. A file whose output directory is already taken by an
/// earlier file in the list fails without being processed.
pub fn run_batch(
    pipeline: &Pipeline,
    input_root: &Path,
    files: &[PathBuf],
    output_root: &Path,
    jobs: usize,
    cancel: &CancelToken,
) -> BatchReport {
    let total = files.len();
    let mut outcomes = Vec::with_capacity(total);
    let mut queue = Vec::with_capacity(total);

    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    for (k, path) in files.iter().enumerate() {
        let root = artifact::output_root_for(input_root, path, output_root);
        match claimed.entry(root.join(artifact::file_stem(path))) {
            Entry::Occupied(first) => {
                let error = PipelineError::OutputConflict {
                    dir: first.key().clone(),
                    first: first.get().to_path_buf(),
                };
                let failure = Failure::file(path, error);
                warn!("{failure}");
                outcomes.push((k, Outcome::Failed(failure)));
            }
            Entry::Vacant(slot) => {
                slot.insert(path.as_path());
                queue.push((k, path.as_path(), root));
            }
        }
    }

    let jobs = jobs.clamp(1, queue.len().max(1));
    let (work_tx, work_rx) = crossbeam_channel::bounded::<(usize, &Path, PathBuf)>(jobs * 2);
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, Outcome)>();

    let processed = thread::scope(|scope| {
        for _ in 0..jobs {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();

            scope.spawn(move || {
                for (k, path, root) in work_rx {
                    let outcome = if cancel.is_cancelled() {
                        Outcome::Skipped(path.to_path_buf())
                    } else {
                        info!("[{}/{total}] Processing {}", k + 1, path.display());
                        match pipeline.process_file(path, &root) {
                            Ok(report) => Outcome::Done(report),
                            Err(failure) => {
                                warn!("{failure}");
                                Outcome::Failed(failure)
                            }
                        }
                    };
                    // Receiver outlives every worker
                    let _ = done_tx.send((k, outcome));
                }
            });
        }
        drop(work_rx);
        drop(done_tx);

        for item in queue {
            if work_tx.send(item).is_err() {
                break;
            }
        }
        drop(work_tx);

        done_rx.iter().collect::<Vec<_>>()
    });
    outcomes.extend(processed);

    outcomes.sort_by_key(|(k, _)| *k);

    let mut report = BatchReport::default();
    for (_, outcome) in outcomes {
        match outcome {
            Outcome::Done(file) => report.completed.push(file),
            Outcome::Failed(failure) => report.failed.push(failure),
            Outcome::Skipped(path) => report.skipped.push(path),
        }
    }
    report
}

#[cfg(test)]
mod test_batch {
    use super::*;
    use crate::pipeline::test_support::cache_file;
    use crate::error::FailureKind;
    use crate::pipeline::PipelineOptions;
    use sharc::Codec;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    /// Relative path to contents of every file under `root`.
    fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut out = BTreeMap::new();
        for entry in ignore::WalkBuilder::new(root).standard_filters(false).build() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_file() {
                let rel = entry.path().strip_prefix(root).unwrap();
                out.insert(rel.display().to_string(), fs::read(entry.path()).unwrap());
            }
        }
        out
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineOptions::default(), Box::new(Codec::default()))
    }

    fn inputs(dir: &Path) -> Vec<PathBuf> {
        let files = vec![dir.join("one.cache"), dir.join("two.cache"), dir.join("three.cache")];
        fs::write(&files[0], cache_file(2)).unwrap();
        fs::write(&files[1], cache_file(3)).unwrap();
        fs::write(&files[2], cache_file(4)).unwrap();
        files
    }

    #[test]
    fn corrupt_file_does_not_affect_others() {
        let dir = tempdir().unwrap();
        let files = inputs(dir.path());
        // Cut file two in half and queue a file that does not exist
        let two = fs::read(&files[1]).unwrap();
        fs::write(&files[1], &two[..two.len() / 2]).unwrap();
        let mut files = files;
        files.insert(2, dir.path().join("missing.cache"));

        let out = dir.path().join("out");
        let cancel = CancelToken::new();
        let report = run_batch(&pipeline(), dir.path(), &files, &out, 3, &cancel);

        assert_eq!(report.completed.len(), 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file, files[2]);

        let one = &report.completed[0];
        assert!(one.failures.is_empty());
        assert_eq!(one.extracted, 2);

        let two = &report.completed[1];
        assert!(!two.failures.is_empty());
        assert!(two.extracted < 3);

        let three = &report.completed[2];
        assert!(three.failures.is_empty());
        assert_eq!(three.extracted, 4);
        assert!(out.join("three/three_part0004.cache_part.dxil").is_file());
    }

    #[test]
    fn reruns_are_byte_identical() {
        let dir = tempdir().unwrap();
        let files = inputs(dir.path());
        let out = dir.path().join("out");

        let cancel = CancelToken::new();
        let first = run_batch(&pipeline(), dir.path(), &files, &out, 2, &cancel);
        let before = snapshot(&out);
        let second = run_batch(&pipeline(), dir.path(), &files, &out, 3, &cancel);
        let after = snapshot(&out);

        assert_eq!(first.completed.len(), 3);
        assert_eq!(second.completed.len(), 3);
        assert_eq!(before.len(), 3 * 2 + 3 * 3 + 4 * 3);
        assert_eq!(before, after);
    }

    #[test]
    fn cancelled_before_start_processes_nothing() {
        let dir = tempdir().unwrap();
        let files = inputs(dir.path());
        let out = dir.path().join("out");

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = run_batch(&pipeline(), dir.path(), &files, &out, 2, &cancel);

        assert!(report.completed.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(report.skipped, files);
        assert!(!out.exists());
    }

    #[test]
    fn empty_batch() {
        let dir = tempdir().unwrap();
        let cancel = CancelToken::new();
        let report = run_batch(&pipeline(), dir.path(), &[], dir.path(), 4, &cancel);
        assert!(report.completed.is_empty());
        assert_eq!(snapshot(dir.path()), BTreeMap::new());
    }

    #[test]
    fn same_stem_in_subdirectories() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(input.join("sub")).unwrap();
        let files = vec![input.join("d.cache"), input.join("sub/d.cache")];
        fs::write(&files[0], cache_file(2)).unwrap();
        fs::write(&files[1], cache_file(3)).unwrap();

        let out = dir.path().join("out");
        let report = run_batch(&pipeline(), &input, &files, &out, 1, &CancelToken::new());

        assert_eq!(report.completed.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.completed[0].output_dir, out.join("d"));
        assert_eq!(report.completed[1].output_dir, out.join("sub/d"));
        assert_eq!(snapshot(&out).len(), 2 * 3 + 3 * 3);
    }

    #[test]
    fn colliding_output_fails_second_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        let other = dir.path().join("other");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&other).unwrap();
        let files = vec![input.join("d.cache"), other.join("d.cache")];
        fs::write(&files[0], cache_file(2)).unwrap();
        fs::write(&files[1], cache_file(3)).unwrap();

        let out = dir.path().join("out");
        let report = run_batch(&pipeline(), &input, &files, &out, 2, &CancelToken::new());

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].file, files[0]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file, files[1]);
        assert_eq!(report.failed[0].kind(), FailureKind::Conflict);
        // Only the first file's artifacts exist
        assert_eq!(snapshot(&out).len(), 2 * 3);
    }

    #[test]
    fn summary_counts() {
        let dir = tempdir().unwrap();
        let files = inputs(dir.path());
        let out = dir.path().join("out");
        let report = run_batch(&pipeline(), dir.path(), &files, &out, 1, &CancelToken::new());
        let summary = report.summary();
        assert!(summary.starts_with("3 files done, 0 failed, 0 skipped; 9 blobs"));
        assert!(summary.contains("9 decompressed, 9 extracted"));
    }
}
