use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use log::{debug, warn};

use crate::cli::ConfigError;

/// Cache files under `root` with the given extension, sorted by file name.
pub fn discover(
    root: &Path,
    extension: &str,
    recursive: bool,
) -> Result<Vec<PathBuf>, ConfigError> {
    if !root.is_dir() {
        return Err(ConfigError::MissingInput(root.to_path_buf()));
    }

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .max_depth(if recursive { None } else { Some(1) })
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(e) => {
                let is_file = e.file_type().is_some_and(|t| t.is_file());
                let matches = e.path().extension().is_some_and(|ext| ext == extension);
                if is_file && matches {
                    debug!("found {}", e.path().display());
                    files.push(e.into_path());
                }
            }
            Err(e) => warn!("skipping unreadable entry: {e}"),
        }
    }
    Ok(files)
}

/// Keep only the file called `name`, the extension is optional.
pub fn select_single(files: Vec<PathBuf>, name: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let found = files.into_iter().find(|path| {
        path.file_name().is_some_and(|n| n == name) || path.file_stem().is_some_and(|n| n == name)
    });

    match found {
        Some(path) => Ok(vec![path]),
        None => Err(ConfigError::MissingSingle(name.to_string())),
    }
}

#[cfg(test)]
mod test_discover {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn tree() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for name in ["b.cache", "a.cache", "notes.txt", "c.cache.bak"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/d.cache"), b"x").unwrap();
        fs::create_dir(dir.path().join("dir.cache")).unwrap();
        dir
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn flat_and_sorted() {
        let dir = tree();
        let files = discover(dir.path(), "cache", false).unwrap();
        assert_eq!(names(&files), vec!["a.cache", "b.cache"]);
    }

    #[test]
    fn recursive() {
        let dir = tree();
        let files = discover(dir.path(), "cache", true).unwrap();
        assert_eq!(names(&files), vec!["a.cache", "b.cache", "d.cache"]);
    }

    #[test]
    fn missing_root() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            discover(&dir.path().join("nope"), "cache", false),
            Err(ConfigError::MissingInput(_))
        ));
    }

    #[test]
    fn single() {
        let dir = tree();
        let files = discover(dir.path(), "cache", false).unwrap();

        assert_eq!(names(&select_single(files.clone(), "b").unwrap()), vec!["b.cache"]);
        assert_eq!(names(&select_single(files.clone(), "a.cache").unwrap()), vec!["a.cache"]);
        assert!(select_single(files, "z").is_err());
    }
}
