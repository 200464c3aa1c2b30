//! External program execution with dry-run awareness.
use std::process::{Command, Output};
use std::sync::Arc;

use crate::error::ExecError;
use crate::logging::Log;

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the program exited with status zero.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl ExecResult {
    /// Convert a non-zero exit into [`ExecError::ExecutionFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the program did not exit successfully.
    pub fn check(self, tool: &str) -> Result<Self, ExecError> {
        if self.success {
            Ok(self)
        } else {
            Err(ExecError::ExecutionFailed {
                tool: tool.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Abstraction over process spawning so the installer can be tested without
/// touching real block devices.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command and return its output. Fails if the command exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
        self.run_unchecked(program, args)?.check(program)
    }

    /// Run a command, allowing failure (returns the result without bailing).
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be started.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult, ExecError>;

    /// Check if a program is available (on `PATH` or as an executable path).
    fn which(&self, program: &str) -> bool;
}

/// Production [`Executor`] that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ExecError::Spawn {
                tool: program.to_string(),
                source,
            })?;
        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Process runner shared by every installer component.
///
/// Mutating invocations go through [`Runner::apply`] and are only logged in
/// dry-run mode; read-only probes go through [`Runner::query_unchecked`] and always run.
#[derive(Clone)]
pub struct Runner {
    executor: Arc<dyn Executor>,
    log: Arc<dyn Log>,
    dry_run: bool,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("executor", &self.executor)
            .field("log", &"<dyn Log>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Runner {
    /// Create a runner around `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, log: Arc<dyn Log>, dry_run: bool) -> Self {
        Self {
            executor,
            log,
            dry_run,
        }
    }

    /// Whether mutating invocations are suppressed.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Logger shared with the runner.
    #[must_use]
    pub fn log(&self) -> &Arc<dyn Log> {
        &self.log
    }

    /// Run a mutating command, or log it when in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or exits non-zero.
    pub fn apply(&self, program: &str, args: &[&str]) -> Result<(), ExecError> {
        let line = render(program, args);
        if self.dry_run {
            self.log.dry_run(&format!("would run: {line}"));
            return Ok(());
        }
        self.log.debug(&format!("running: {line}"));
        self.executor.run(program, args).map(|_| ())
    }

    /// Run a mutating command even in dry-run mode.
    ///
    /// Only used to undo work that dry-run itself performed, such as the
    /// read-only image mount used for flavour identification.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or exits non-zero.
    pub fn apply_always(&self, program: &str, args: &[&str]) -> Result<(), ExecError> {
        self.log.debug(&format!("running: {}", render(program, args)));
        self.executor.run(program, args).map(|_| ())
    }

    /// Run a read-only command regardless of dry-run mode. Non-zero exits
    /// are handed back to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be started.
    pub fn query_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult, ExecError> {
        self.log.debug(&format!("querying: {}", render(program, args)));
        self.executor.run_unchecked(program, args)
    }

    /// Check whether `program` is available.
    #[must_use]
    pub fn which(&self, program: &str) -> bool {
        self.executor.which(program)
    }

    /// Flush pending filesystem writes.
    pub fn sync(&self) {
        if self.dry_run {
            return;
        }
        if let Err(e) = self.executor.run("sync", &[]) {
            self.log.warn(&format!("sync: {e}"));
        }
    }
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
