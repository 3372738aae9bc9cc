use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{Error, Result};

/// A discovered document file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the walked root directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
    /// Last modification time as seconds since the Unix epoch.
    pub mtime: u64,
}

/// Directory names that are never descended into.
const SKIPPED_DIRS: &[&str] = &["target"];

/// Compile glob patterns (matched against relative paths) into a filter.
pub fn file_filter(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            Error::Config(format!("invalid glob pattern '{pattern}': {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid glob set: {e}")))
}

/// Recursively walk a directory and discover files matching `filter`.
///
/// Skips hidden files/directories (names starting with `.`) and build
/// output directories. Results are sorted by relative path.
pub fn discover_files(
    root: &Path,
    filter: &GlobSet,
) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, filter, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    filter: &GlobSet,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if SKIPPED_DIRS.iter().any(|d| *d == name) {
                continue;
            }
            walk_dir(root, &entry.path(), filter, results)?;
        } else if file_type.is_symlink() {
            let resolved = match entry.path().canonicalize() {
                Ok(p) => p,
                Err(_) => continue, // broken symlink
            };
            // Cycle prevention.
            if resolved.starts_with(root) && resolved.is_dir() {
                continue;
            }
            if resolved.is_file()
                && let Some(df) =
                    make_discovered(root, &entry.path(), &resolved, filter)?
            {
                results.push(df);
            }
        } else if file_type.is_file() {
            let abs = entry.path().canonicalize()?;
            if let Some(df) = make_discovered(root, &entry.path(), &abs, filter)?
            {
                results.push(df);
            }
        }
    }

    Ok(())
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: &Path,
    filter: &GlobSet,
) -> Result<Option<DiscoveredFile>> {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    if !filter.is_match(&relative_path) {
        return Ok(None);
    }

    let mtime = std::fs::metadata(absolute_path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    Ok(Some(DiscoveredFile {
        relative_path,
        absolute_path: absolute_path.to_path_buf(),
        mtime,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_files() -> GlobSet {
        file_filter(&["**/*"]).unwrap()
    }

    fn names(files: &[DiscoveredFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn filter_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("lib.rs"), "fn main() {}").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "Hello").unwrap();

        let filter = file_filter(&["**/*.rs"]).unwrap();
        let files = discover_files(tmp.path(), &filter).unwrap();
        assert_eq!(names(&files), vec!["lib.rs"]);
    }

    #[test]
    fn skips_hidden_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".hidden.txt"), "secret").unwrap();
        std::fs::write(tmp.path().join("visible.txt"), "hello").unwrap();

        let files = discover_files(tmp.path(), &all_files()).unwrap();
        assert_eq!(names(&files), vec!["visible.txt"]);
    }

    #[test]
    fn skips_hidden_and_target_directories() {
        let tmp = tempfile::tempdir().unwrap();
        for dir in [".git", "target"] {
            let path = tmp.path().join(dir);
            std::fs::create_dir(&path).unwrap();
            std::fs::write(path.join("config.txt"), "ignored").unwrap();
        }
        std::fs::write(tmp.path().join("notes.txt"), "notes").unwrap();

        let files = discover_files(tmp.path(), &all_files()).unwrap();
        assert_eq!(names(&files), vec!["notes.txt"]);
    }

    #[test]
    fn recurses_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("subdir");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("deep.txt"), "deep").unwrap();
        std::fs::write(tmp.path().join("top.txt"), "top").unwrap();

        let files = discover_files(tmp.path(), &all_files()).unwrap();
        assert_eq!(names(&files), vec!["subdir/deep.txt", "top.txt"]);
    }

    #[test]
    fn mtime_is_nonzero() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("file.txt"), "content").unwrap();

        let files = discover_files(tmp.path(), &all_files()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].mtime > 0);
    }

    #[test]
    fn results_are_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("z.txt"), "z").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("m.txt"), "m").unwrap();

        let files = discover_files(tmp.path(), &all_files()).unwrap();
        assert_eq!(names(&files), vec!["a.txt", "m.txt", "z.txt"]);
    }

    #[test]
    fn invalid_glob_is_config_error() {
        let err = file_filter(&["a["]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let files = discover_files(tmp.path(), &all_files()).unwrap();
        assert!(files.is_empty());
    }
}
