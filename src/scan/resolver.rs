//! Traversal-safe mapping of root-relative paths to absolute paths.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ShelfError};

/// Resolves root-relative message paths inside a fixed, canonical root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|_| ShelfError::RootNotFound(root.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(ShelfError::RootNotFound(root.to_path_buf()));
        }
        Ok(Self { root: canonical })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` to an absolute path inside the root.
    ///
    /// Absolute or rooted input, leftover `..` segments after lexical
    /// normalization, and anything whose canonical form (symlinks followed)
    /// lands outside the root are rejected with [`ShelfError::PathTraversal`].
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rejected = || ShelfError::PathTraversal(relative.to_string());
        let candidate = Path::new(relative);

        if candidate.is_absolute() || candidate.has_root() {
            return Err(rejected());
        }

        let normalized = normalize(candidate).ok_or_else(rejected)?;
        if normalized
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(rejected());
        }

        let joined = self.root.join(&normalized);
        let canonical = canonicalize_lenient(&joined).map_err(|_| rejected())?;

        if canonical.starts_with(&self.root) {
            Ok(canonical)
        } else {
            tracing::warn!(path = relative, "Rejected path outside the emails root");
            Err(rejected())
        }
    }

    /// Express an absolute path under the root as a forward-slash relative path.
    pub fn relative_of(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

/// Collapse `.` and `..` without touching the filesystem.
///
/// A `..` that cannot pop a normal segment is kept so the caller can reject
/// it. Returns `None` for prefix or root components.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                _ => parts.push(component),
            },
            Component::Normal(_) => parts.push(component),
            Component::Prefix(_) | Component::RootDir => return None,
        }
    }
    Some(parts.iter().collect())
}

/// Canonicalize a path that may not exist yet.
///
/// The deepest existing ancestor is canonicalized and the missing tail is
/// appended unchanged. Ancestors are probed without following links, so a
/// dangling symlink counts as existing and fails to canonicalize instead of
/// being treated as a missing component.
fn canonicalize_lenient(path: &Path) -> std::io::Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let no_ancestor = || std::io::Error::new(std::io::ErrorKind::NotFound, "no existing ancestor");
    let mut missing = Vec::new();
    let mut existing = path;
    while std::fs::symlink_metadata(existing).is_err() {
        let name = existing.file_name().ok_or_else(no_ancestor)?;
        missing.push(name.to_os_string());
        existing = existing.parent().ok_or_else(no_ancestor)?;
    }

    // Fails for a dangling link: its target cannot be checked against the root.
    let mut result = existing.canonicalize()?;
    for name in missing.into_iter().rev() {
        result.push(name);
    }
    Ok(result)
}
