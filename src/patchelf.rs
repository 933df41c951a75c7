//! Invocation wrapper for the external patchelf tool
//!
//! This module does not understand ELF structures itself. It translates a
//! declarative set of requested flags into exactly one `patchelf` process
//! execution and hands back the tool's trimmed standard output. Reading the
//! current interpreter or RPATH and rewriting a binary to a new output path
//! are all expressed through the same flag set.

use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::thread;
use std::time::Duration;

use crate::cancel::Cancellation;
use crate::error::ToolError;

/// Program name resolved through the OS `PATH` lookup when no override is set
pub const DEFAULT_PROGRAM: &str = "patchelf";

/// How often a running invocation checks for exit or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One patchelf invocation.
///
/// Flags are independent and may be combined in a single run; combining them
/// sensibly (for example, not mixing both print modes in one call) is the
/// caller's responsibility. The target binary's path is always the final
/// positional argument.
#[derive(Debug, Default)]
pub struct Patchelf {
    /// New RPATH entries, colon-joined on the command line
    pub set_rpath: Vec<String>,
    /// Print the binary's current RPATH to stdout
    pub print_rpath: bool,

    /// New interpreter (dynamic linker) path
    pub set_interpreter: Option<PathBuf>,
    /// Print the binary's current interpreter to stdout
    pub print_interpreter: bool,

    /// Write the rewritten binary here instead of modifying in place
    pub output: Option<PathBuf>,

    /// Override for the patchelf executable, mainly for tests
    pub program: Option<PathBuf>,
}

impl Patchelf {
    fn program(&self) -> &Path {
        self.program
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_PROGRAM))
    }

    /// Command-line arguments for running against the ELF binary at `elf`
    fn args(&self, elf: &Path) -> Vec<OsString> {
        let mut args = Vec::new();
        if !self.set_rpath.is_empty() {
            args.push(OsString::from("--force-rpath"));
            args.push(OsString::from("--set-rpath"));
            args.push(OsString::from(self.set_rpath.join(":")));
        }
        if self.print_rpath {
            args.push(OsString::from("--print-rpath"));
        }
        if let Some(interpreter) = &self.set_interpreter {
            args.push(OsString::from("--set-interpreter"));
            args.push(interpreter.as_os_str().to_os_string());
        }
        if self.print_interpreter {
            args.push(OsString::from("--print-interpreter"));
        }
        if let Some(output) = &self.output {
            args.push(OsString::from("--output"));
            args.push(output.as_os_str().to_os_string());
        }
        args.push(elf.as_os_str().to_os_string());
        args
    }

    /// Run patchelf against the ELF binary at `elf` and return its trimmed
    /// standard output.
    ///
    /// The spawned process is polled for exit while honoring `cancel`; on
    /// cancellation or deadline expiry it is killed and reaped before the
    /// call returns. A non-zero exit is reported together with the tool's
    /// standard error text.
    pub fn run(&self, elf: &Path, cancel: &Cancellation) -> Result<String, ToolError> {
        let program = self.program().display().to_string();
        let mut child = Command::new(self.program())
            .args(self.args(elf))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Drain both pipes on background threads so a chatty tool cannot
        // deadlock against a full pipe buffer while we poll for exit.
        let stdout = child.stdout.take().map(drain_pipe);
        let stderr = child.stderr.take().map(drain_pipe);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    kill_and_reap(&mut child);
                    return Err(ToolError::Spawn { program, source });
                }
            }
            if cancel.is_cancelled() {
                kill_and_reap(&mut child);
                return Err(ToolError::Cancelled { program });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout.map(join_pipe).unwrap_or_default();
        let stderr = stderr.map(join_pipe).unwrap_or_default();

        if !status.success() {
            return Err(ToolError::Exit {
                program,
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

fn drain_pipe<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_pipe(handle: thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
