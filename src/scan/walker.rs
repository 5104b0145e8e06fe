//! Enumeration of candidate message files.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Result, ShelfError};

/// Recursive enumerator of files with a given extension under a root.
///
/// Symlinks are not followed. Any walk error is fatal for the run.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    extension: String,
}

impl Scanner {
    /// Create a scanner over `root` matching `extension` (without the dot, any case).
    pub fn new(root: impl AsRef<Path>, extension: &str) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|_| ShelfError::RootNotFound(root.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(ShelfError::RootNotFound(root.to_path_buf()));
        }
        Ok(Self {
            root: canonical,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily yield root-relative, forward-slash paths of matching files.
    pub fn iter(&self) -> impl Iterator<Item = Result<String>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.matches(entry.path()) {
                        self.relative(entry.path()).map(Ok)
                    } else {
                        None
                    }
                }
                Err(e) => Some(Err(ShelfError::Enumeration {
                    path: e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone()),
                    reason: e.to_string(),
                })),
            })
    }

    /// Collect every matching path, failing on the first walk error.
    pub fn scan(&self) -> Result<Vec<String>> {
        let files = self.iter().collect::<Result<Vec<_>>>()?;
        tracing::info!(
            root = %self.root.display(),
            files = files.len(),
            "Enumerated message files"
        );
        Ok(files)
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    /// Root-relative path, or `None` (with a warning) if it is not valid UTF-8.
    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
        match parts {
            Some(parts) => Some(parts.join("/")),
            None => {
                tracing::warn!(path = %path.display(), "Skipping file with a non UTF-8 name");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("inbox/2024")).unwrap();
        std::fs::write(dir.path().join("a.eml"), b"x").unwrap();
        std::fs::write(dir.path().join("inbox/b.EML"), b"x").unwrap();
        std::fs::write(dir.path().join("inbox/2024/c.eml"), b"x").unwrap();
        std::fs::write(dir.path().join("inbox/notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("eml"), b"x").unwrap();

        let scanner = Scanner::new(dir.path(), "eml").unwrap();
        let files = scanner.scan().unwrap();
        assert_eq!(files, vec!["a.eml", "inbox/2024/c.eml", "inbox/b.EML"]);
    }

    #[test]
    fn test_dotted_extension_argument() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.msg"), b"x").unwrap();
        let scanner = Scanner::new(dir.path(), ".MSG").unwrap();
        assert_eq!(scanner.scan().unwrap(), vec!["a.msg"]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Scanner::new(dir.path().join("missing"), "eml").unwrap_err();
        assert!(matches!(err, ShelfError::RootNotFound(_)));
    }

    #[test]
    fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = Scanner::new(dir.path(), "eml").unwrap();
        assert!(scanner.scan().unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.eml"), b"x").unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.eml")), b"x").unwrap();
        let sub = dir.path().join(OsStr::from_bytes(b"dir\xfe"));
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("inner.eml"), b"x").unwrap();

        let scanner = Scanner::new(dir.path(), "eml").unwrap();
        assert_eq!(scanner.scan().unwrap(), vec!["good.eml"]);
    }
}
