//! glibcpatch: rewrite ELF binaries to run against an alternative glibc
//!
//! This library patches an ELF executable's dynamic-linker reference and
//! library search path (RPATH) so the binary runs against a different C
//! library than the one it was linked against, without recompilation and
//! without modifying the original file. ELF rewriting itself is delegated
//! to the external `patchelf` tool; this crate contributes the discovery of
//! the new linker and library directories inside package trees and the
//! ordered, first-match-wins composition of the new search path.
//!
//! # Example
//!
//! ```no_run
//! use glibcpatch::{Cancellation, DirFs, GlibcPatcher};
//!
//! // Point at an installed glibc package.
//! let glibc = DirFs::new("/pkgs/glibc-2.39").unwrap();
//! let mut patcher = GlibcPatcher::new(&glibc).unwrap();
//!
//! // Libraries from dependent packages shadow the base libc directory.
//! let openssl = DirFs::new("/pkgs/openssl-3.3").unwrap();
//! patcher.prepend_library_path(&openssl);
//!
//! // Rewrite a binary to a new path; the input is left untouched.
//! patcher
//!     .patch("/pkgs/app/bin/app", "/tmp/app.patched", &Cancellation::new())
//!     .unwrap();
//! ```

pub mod cancel;
pub mod error;
pub mod package_fs;
pub mod patchelf;
pub mod patcher;

pub use cancel::Cancellation;
pub use error::PatchError;
pub use error::ResolveError;
pub use error::ToolError;
pub use package_fs::DirFs;
pub use package_fs::PackageFs;
pub use patchelf::Patchelf;
pub use patcher::GlibcPatcher;
