//! Error types for glibcpatch

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Main error type for patcher construction and patch operations
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("cannot find {what} file matching {pattern:?} in {location}")]
    Discovery {
        what: &'static str,
        pattern: &'static str,
        location: String,
    },

    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Errors resolving a package-relative path to an absolute on-disk path
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("cannot resolve {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} escapes the package root {}", path.display(), root.display())]
    EscapesRoot { path: PathBuf, root: PathBuf },
}

/// Errors from invoking the external binary-rewriting tool
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} cancelled")]
    Cancelled { program: String },
}
