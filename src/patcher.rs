//! glibc patcher - rewrites binaries to use an alternative glibc
//!
//! A [`GlibcPatcher`] is built once per target glibc version. Construction
//! discovers the new dynamic linker and libc directory inside the glibc
//! package; registrations then prepend library directories from dependent
//! packages; finally [`patch`](GlibcPatcher::patch) rewrites individual
//! binaries through the external patchelf tool.
//!
//! Setup is single-writer: finish construction and all registrations before
//! fanning out concurrent `patch` calls. From the first `patch` call onward
//! the patcher is read-only and shared freely.

use std::path::Path;
use std::path::PathBuf;

use log::debug;

use crate::cancel::Cancellation;
use crate::error::PatchError;
use crate::package_fs::PackageFs;
use crate::patchelf::Patchelf;

const LIBC_GLOB: &str = "lib*/libc.so*";
const LINKER_GLOB: &str = "lib*/ld-linux*.so*";
const SHARED_OBJECT_GLOB: &str = "lib*/*.so*";

/// Patches ELF binaries to use an alternative version of glibc
#[derive(Debug)]
pub struct GlibcPatcher {
    /// Absolute path to the new dynamic linker (ld.so)
    interpreter: PathBuf,

    /// Ordered library search path, first-match-wins. Starts with the new
    /// libc's own directory; registered packages prepend their directories.
    search_path: Vec<PathBuf>,

    /// Override for the patchelf executable, mainly for tests
    program: Option<PathBuf>,
}

impl GlibcPatcher {
    /// Create a new patcher, verifying that the glibc package contains the
    /// shared C library and the dynamic linker.
    pub fn new(glibc: &impl PackageFs) -> Result<Self, PatchError> {
        // Verify that we can find a directory with libc in it.
        let matches = glibc.glob(LIBC_GLOB);
        if matches.is_empty() {
            return Err(PatchError::Discovery {
                what: "libc.so",
                pattern: LIBC_GLOB,
                location: glibc.location().to_string(),
            });
        }
        let mut dirs: Vec<&str> = matches.iter().filter_map(parent_dir).collect();
        dirs.sort_unstable(); // pick the shortest name: lib < lib32 < lib64 < libx32
        let lib_dir = glibc.os_path(dirs[0])?;
        debug!("found new libc directory at {}", lib_dir.display());

        // Verify that we can find the new dynamic linker.
        let matches = glibc.glob(LINKER_GLOB);
        if matches.is_empty() {
            return Err(PatchError::Discovery {
                what: "ld.so",
                pattern: LINKER_GLOB,
                location: glibc.location().to_string(),
            });
        }
        let interpreter = glibc.os_path(&matches[0])?;
        debug!("found new dynamic linker at {}", interpreter.display());

        Ok(Self {
            interpreter,
            search_path: vec![lib_dir],
            program: None,
        })
    }

    /// Absolute path of the replacement dynamic linker
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    /// Current library search path, highest precedence first
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Override the patchelf executable used by [`patch`](Self::patch)
    pub fn set_program(&mut self, program: impl Into<PathBuf>) {
        self.program = Some(program.into());
    }

    /// Prepend a dependent package's shared-library directories to the
    /// search path.
    ///
    /// Packages that provide no shared libraries are a no-op, and entries
    /// that fail to resolve to an on-disk path are skipped, so this never
    /// fails the caller. Each call places its directories in front of
    /// everything registered so far: the last-registered package wins.
    pub fn prepend_library_path(&mut self, pkg: &impl PackageFs) {
        let matches = pkg.glob(SHARED_OBJECT_GLOB);
        if matches.is_empty() {
            debug!(
                "not prepending {} to RPATH because no shared libraries were found",
                pkg.location()
            );
            return;
        }
        let mut dirs: Vec<&str> = matches.iter().filter_map(parent_dir).collect();
        dirs.sort_unstable();
        dirs.dedup();

        let mut resolved: Vec<PathBuf> = dirs
            .into_iter()
            .filter_map(|dir| pkg.os_path(dir).ok())
            .collect();
        debug!(
            "prepending {} lib dirs from {} to RPATH",
            resolved.len(),
            pkg.location()
        );
        resolved.append(&mut self.search_path);
        self.search_path = resolved;
    }

    /// Apply the glibc patches to the binary at `input` and write the
    /// patched result to `output`. The original binary is never modified.
    ///
    /// The binary's pre-existing RPATH entries are preserved behind the new
    /// search path, since the binary may still need libraries only it knows
    /// about.
    pub fn patch(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        cancel: &Cancellation,
    ) -> Result<(), PatchError> {
        let input = input.as_ref();
        let output = output.as_ref();

        let cmd = Patchelf {
            print_interpreter: true,
            program: self.program.clone(),
            ..Default::default()
        };
        let old_interpreter = cmd.run(input, cancel)?;

        let cmd = Patchelf {
            print_rpath: true,
            program: self.program.clone(),
            ..Default::default()
        };
        let out = cmd.run(input, cancel)?;
        let old_search_path = out.split(':').filter(|entry| !entry.is_empty());

        let mut rpath: Vec<String> = self
            .search_path
            .iter()
            .map(|dir| dir.display().to_string())
            .collect();
        rpath.extend(old_search_path.map(str::to_string));

        let cmd = Patchelf {
            set_interpreter: Some(self.interpreter.clone()),
            set_rpath: rpath,
            output: Some(output.to_path_buf()),
            program: self.program.clone(),
            ..Default::default()
        };
        debug!(
            "patching glibc on binary {} -> {}: interpreter {} -> {}, rpath {:?}",
            input.display(),
            output.display(),
            old_interpreter,
            self.interpreter.display(),
            cmd.set_rpath,
        );
        cmd.run(input, cancel)?;
        Ok(())
    }
}

fn parent_dir(path: &String) -> Option<&str> {
    Path::new(path).parent()?.to_str()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::package_fs::DirFs;

    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn glibc_fixture() -> (TempDir, DirFs) {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("lib/libc.so.6"));
        touch(&dir.path().join("lib/ld-linux-x86-64.so.2"));
        let pkg = DirFs::new(dir.path()).unwrap();
        (dir, pkg)
    }

    #[test]
    fn test_new_finds_libc_and_linker() {
        let (_dir, glibc) = glibc_fixture();
        let patcher = GlibcPatcher::new(&glibc).unwrap();

        assert_eq!(
            patcher.interpreter(),
            glibc.root().join("lib/ld-linux-x86-64.so.2")
        );
        assert_eq!(patcher.search_path(), &[glibc.root().join("lib")]);
    }

    #[test]
    fn test_new_prefers_plain_lib_over_lib64() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("lib64/libc.so.6"));
        touch(&dir.path().join("lib64/ld-linux-x86-64.so.2"));
        touch(&dir.path().join("lib/libc.so.6"));
        touch(&dir.path().join("lib/ld-linux-x86-64.so.2"));
        let glibc = DirFs::new(dir.path()).unwrap();

        let patcher = GlibcPatcher::new(&glibc).unwrap();
        assert_eq!(patcher.search_path(), &[glibc.root().join("lib")]);
        assert_eq!(
            patcher.interpreter(),
            glibc.root().join("lib/ld-linux-x86-64.so.2")
        );
    }

    #[test]
    fn test_new_fails_without_libc() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("lib/ld-linux-x86-64.so.2"));
        let glibc = DirFs::new(dir.path()).unwrap();

        let err = GlibcPatcher::new(&glibc).unwrap_err();
        assert!(matches!(err, PatchError::Discovery { what: "libc.so", .. }));
    }

    #[test]
    fn test_new_fails_without_linker() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("lib/libc.so.6"));
        let glibc = DirFs::new(dir.path()).unwrap();

        let err = GlibcPatcher::new(&glibc).unwrap_err();
        assert!(matches!(err, PatchError::Discovery { what: "ld.so", .. }));
    }

    #[test]
    fn test_prepend_without_libraries_is_noop() {
        let (_dir, glibc) = glibc_fixture();
        let mut patcher = GlibcPatcher::new(&glibc).unwrap();
        let before = patcher.search_path().to_vec();

        let empty = TempDir::new().unwrap();
        touch(&empty.path().join("bin/tool"));
        let pkg = DirFs::new(empty.path()).unwrap();

        patcher.prepend_library_path(&pkg);
        assert_eq!(patcher.search_path(), before);
    }

    #[test]
    fn test_prepend_sorts_and_dedups_within_package() {
        let (_dir, glibc) = glibc_fixture();
        let mut patcher = GlibcPatcher::new(&glibc).unwrap();

        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("lib64/libz.so.1"));
        touch(&dir.path().join("lib/libb.so.2"));
        touch(&dir.path().join("lib/liba.so.1"));
        let pkg = DirFs::new(dir.path()).unwrap();

        patcher.prepend_library_path(&pkg);
        assert_eq!(
            patcher.search_path(),
            &[
                pkg.root().join("lib"),
                pkg.root().join("lib64"),
                glibc.root().join("lib"),
            ]
        );
    }

    #[test]
    fn test_prepend_last_registered_wins() {
        let (_dir, glibc) = glibc_fixture();
        let mut patcher = GlibcPatcher::new(&glibc).unwrap();

        let dir_a = TempDir::new().unwrap();
        touch(&dir_a.path().join("lib/liba.so.1"));
        let pkg_a = DirFs::new(dir_a.path()).unwrap();

        let dir_b = TempDir::new().unwrap();
        touch(&dir_b.path().join("lib/libb.so.1"));
        let pkg_b = DirFs::new(dir_b.path()).unwrap();

        patcher.prepend_library_path(&pkg_a);
        patcher.prepend_library_path(&pkg_b);

        assert_eq!(
            patcher.search_path(),
            &[
                pkg_b.root().join("lib"),
                pkg_a.root().join("lib"),
                glibc.root().join("lib"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_prepend_skips_unresolvable_directories() {
        let (_dir, glibc) = glibc_fixture();
        let mut patcher = GlibcPatcher::new(&glibc).unwrap();

        // lib escapes the package root through a symlink, lib64 is real.
        let outside = TempDir::new().unwrap();
        touch(&outside.path().join("escaped/libfoo.so.1"));

        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("escaped"), dir.path().join("lib")).unwrap();
        touch(&dir.path().join("lib64/libbar.so.1"));
        let pkg = DirFs::new(dir.path()).unwrap();

        patcher.prepend_library_path(&pkg);
        assert_eq!(
            patcher.search_path(),
            &[pkg.root().join("lib64"), glibc.root().join("lib")]
        );
    }
}
