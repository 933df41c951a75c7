//! Package filesystem view - glob matching and path resolution for packages

use std::path::Path;
use std::path::PathBuf;

use crate::error::ResolveError;

/// Read-only view of an installed package's filesystem subtree.
///
/// The patcher only ever consumes a package through glob matching of
/// relative paths and resolution of a relative path to an absolute on-disk
/// path, so this is the whole interface.
pub trait PackageFs {
    /// Relative paths matching a glob pattern, in lexicographic order.
    /// Returns an empty vector (not an error) when nothing matches.
    fn glob(&self, pattern: &str) -> Vec<String>;

    /// Resolve a relative path to an absolute on-disk path.
    ///
    /// Fails for paths that do not exist or that resolve outside the
    /// package's real root (for example through a symlink).
    fn os_path(&self, relative: &str) -> Result<PathBuf, ResolveError>;

    /// Opaque identifier of the package's location, for diagnostics
    fn location(&self) -> &str;
}

/// Package filesystem rooted at an on-disk directory
pub struct DirFs {
    root: PathBuf,
    location: String,
}

impl DirFs {
    /// Create a view rooted at `root`. The root is canonicalized up front so
    /// that symlink escapes can be detected during resolution.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ResolveError> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|source| ResolveError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            location: root.display().to_string(),
            root: canonical,
        })
    }

    /// The canonical root directory of the package
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PackageFs for DirFs {
    fn glob(&self, pattern: &str) -> Vec<String> {
        let full = self.root.join(pattern);
        let Some(full) = full.to_str() else {
            return Vec::new();
        };
        let Ok(paths) = glob::glob(full) else {
            return Vec::new();
        };
        let mut matches: Vec<String> = paths
            .filter_map(|entry| entry.ok())
            .filter_map(|path| {
                let relative = path.strip_prefix(&self.root).ok()?;
                Some(relative.to_string_lossy().into_owned())
            })
            .collect();
        matches.sort();
        matches
    }

    fn os_path(&self, relative: &str) -> Result<PathBuf, ResolveError> {
        let full = self.root.join(relative);
        let resolved = full.canonicalize().map_err(|source| ResolveError::Io {
            path: full.clone(),
            source,
        })?;
        if !resolved.starts_with(&self.root) {
            return Err(ResolveError::EscapesRoot {
                path: full,
                root: self.root.clone(),
            });
        }
        Ok(resolved)
    }

    fn location(&self) -> &str {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_glob_returns_sorted_relative_paths() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("lib64/libc.so.6"));
        touch(&dir.path().join("lib/libc.so.6"));
        touch(&dir.path().join("share/doc/readme"));

        let pkg = DirFs::new(dir.path()).unwrap();
        let matches = pkg.glob("lib*/libc.so*");
        assert_eq!(matches, vec!["lib/libc.so.6", "lib64/libc.so.6"]);
    }

    #[test]
    fn test_glob_no_matches_is_empty() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("bin/tool"));

        let pkg = DirFs::new(dir.path()).unwrap();
        assert!(pkg.glob("lib*/*.so*").is_empty());
    }

    #[test]
    fn test_os_path_resolves_inside_root() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("lib/libfoo.so.1"));

        let pkg = DirFs::new(dir.path()).unwrap();
        let resolved = pkg.os_path("lib").unwrap();
        assert_eq!(resolved, pkg.root().join("lib"));
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_os_path_missing_entry_fails() {
        let dir = TempDir::new().unwrap();
        let pkg = DirFs::new(dir.path()).unwrap();
        let err = pkg.os_path("lib/libmissing.so").unwrap_err();
        assert!(matches!(err, ResolveError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_os_path_rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        fs::create_dir_all(outside.path().join("escaped")).unwrap();

        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("escaped"), dir.path().join("lib")).unwrap();

        let pkg = DirFs::new(dir.path()).unwrap();
        let err = pkg.os_path("lib").unwrap_err();
        assert!(matches!(err, ResolveError::EscapesRoot { .. }));
    }
}
