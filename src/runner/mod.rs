//! Runner module - process supervision for the slave
//!
//! Compiles and runs a submitted program inside its scratch directory:
//! - `compile`: one blocking invocation, wall-clock timed, no timeout
//! - `run`: stdin fed, stdout/stderr captured, peak resident memory sampled
//!   every 10ms, killed when the timeout expires
//!
//! The runner does NOT compare outputs or decide verdicts.

pub mod memory;
pub mod process;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Create from an argv (first element is the program). `None` if empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).with_args(args.iter().cloned()))
    }
}

/// Execution status (raw, no verdict interpretation)
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed after the timeout expired
    TimedOut,
    /// Killed by signal
    Signaled(i32),
    /// Could not be started or waited on
    SystemError(String),
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }
}

/// Outcome of running a program against one input
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Wall-clock duration in milliseconds
    pub duration_ms: f64,
    /// Highest resident set size observed, in bytes
    pub peak_memory_bytes: u64,
    pub stdout: String,
    pub stderr: String,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn system_error(message: impl Into<String>) -> Self {
        Self {
            duration_ms: 0.0,
            peak_memory_bytes: 0,
            stdout: String::new(),
            stderr: String::new(),
            status: RunStatus::SystemError(message.into()),
        }
    }
}

/// Outcome of the compile step
#[derive(Debug, Clone, Default)]
pub struct CompileOutcome {
    pub duration_ms: f64,
    pub stdout: String,
    pub stderr: String,
    /// Set when the compiler could not be started or exited non-zero
    pub error: Option<String>,
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runner trait for compiling and executing submitted programs
#[async_trait]
pub trait Runner: Send + Sync {
    async fn compile(&self, cmd: &CommandSpec) -> Result<CompileOutcome>;

    /// Run with `stdin` piped in, killing the program after `timeout`
    async fn run(&self, cmd: &CommandSpec, stdin: &str, timeout: Duration) -> Result<RunOutcome>;
}

// Re-exports
pub use process::ProcessRunner;
