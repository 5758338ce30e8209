//! Workspace path guard
//!
//! Every path a tool parameter supplies goes through [`PathGuard::resolve`]
//! before any I/O. Containment is checked on the canonicalized path, never
//! on the raw string: `..` segments and symlinks are resolved first, so a
//! raw-prefix check can never be fooled into escaping the workspace.

use std::io;
use std::path::{Path, PathBuf};

use proxy_domain::ToolError;

/// Canonical workspace root plus the containment check.
///
/// The root is canonicalized once at construction and is process-lifetime
/// constant. Resolution is still performed per call; resolved paths are
/// never cached across invocations.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Create a guard for the given workspace root, creating the
    /// directory if it does not yet exist.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path against the workspace root.
    ///
    /// Relative paths are joined to the root; the result is canonicalized
    /// (following `..` and symlinks) and must land at or under the root.
    /// The target itself may be absent (a file about to be written) as
    /// long as its nearest existing ancestor canonicalizes inside the
    /// workspace.
    pub fn resolve(&self, candidate: &str) -> Result<PathBuf, ToolError> {
        let joined = {
            let candidate = Path::new(candidate);
            if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                self.root.join(candidate)
            }
        };

        let canonical = canonicalize_allow_missing(&joined)
            .map_err(|_| ToolError::workspace_violation(candidate))?;

        if canonical == self.root || canonical.starts_with(&self.root) {
            Ok(canonical)
        } else {
            Err(ToolError::workspace_violation(candidate))
        }
    }

    /// Like [`resolve`](Self::resolve), but the target must exist.
    pub fn resolve_existing(&self, candidate: &str) -> Result<PathBuf, ToolError> {
        let resolved = self.resolve(candidate)?;
        if !resolved.exists() {
            return Err(ToolError::not_found(candidate));
        }
        Ok(resolved)
    }

    /// Workspace-relative rendering for payloads and logs, so host
    /// absolute paths never leak to the client.
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }
}

/// Canonicalize a path whose deepest components may not exist yet.
///
/// Walks up to the nearest existing ancestor, canonicalizes that, and
/// re-appends the missing tail. A missing component that is `..` or `.`
/// has no file name and is rejected, so the tail cannot re-traverse.
fn canonicalize_allow_missing(path: &Path) -> io::Result<PathBuf> {
    match path.canonicalize() {
        Ok(p) => Ok(p),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let parent = path
                .parent()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
            let name = path
                .file_name()
                .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
            Ok(canonicalize_allow_missing(parent)?.join(name))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_domain::ToolErrorKind;
    use tempfile::TempDir;

    fn guard() -> (TempDir, PathGuard) {
        let dir = TempDir::new().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        (dir, guard)
    }

    #[test]
    fn relative_path_resolves_inside_root() {
        let (_dir, guard) = guard();
        std::fs::create_dir(guard.root().join("src")).unwrap();
        let resolved = guard.resolve("src").unwrap();
        assert!(resolved.starts_with(guard.root()));
    }

    #[test]
    fn missing_file_resolves_for_writing() {
        let (_dir, guard) = guard();
        let resolved = guard.resolve("new/deep/file.txt").unwrap();
        assert!(resolved.starts_with(guard.root()));
    }

    #[test]
    fn dotdot_traversal_is_rejected() {
        let (_dir, guard) = guard();
        let err = guard.resolve("../outside.txt").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::WorkspaceViolation);

        let err = guard.resolve("a/../../outside.txt").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::WorkspaceViolation);

        let err = guard.resolve("../../../../etc/passwd").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::WorkspaceViolation);
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let (_dir, guard) = guard();
        let err = guard.resolve("/etc/passwd").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::WorkspaceViolation);
    }

    #[test]
    fn absolute_path_inside_root_is_allowed() {
        let (_dir, guard) = guard();
        let inside = guard.root().join("file.txt");
        std::fs::write(&inside, "x").unwrap();
        let resolved = guard.resolve(inside.to_str().unwrap()).unwrap();
        assert_eq!(resolved, inside.canonicalize().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();

        let (_dir, guard) = guard();
        std::os::unix::fs::symlink(outside.path(), guard.root().join("link")).unwrap();

        let err = guard.resolve("link/secret.txt").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::WorkspaceViolation);
    }

    #[test]
    fn workspace_root_itself_is_allowed() {
        let (_dir, guard) = guard();
        let resolved = guard.resolve(".").unwrap();
        assert_eq!(resolved, guard.root());
    }

    #[test]
    fn display_strips_root_prefix() {
        let (_dir, guard) = guard();
        let inner = guard.root().join("a/b.txt");
        assert_eq!(guard.display(&inner), "a/b.txt");
        assert_eq!(guard.display(guard.root()), ".");
    }

    #[test]
    fn resolve_existing_fails_on_missing_target() {
        let (_dir, guard) = guard();
        let err = guard.resolve_existing("nope.txt").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::NotFound);
    }
}
