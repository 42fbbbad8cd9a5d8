//! Sandboxed execution of a candidate solution against its test suite.
//!
//! The candidate never runs in this process. It is materialized into a
//! [`Workspace`], linked to the tests through an explicit import of its
//! statically discovered names, and executed by a fresh interpreter process
//! under a hard wall-clock timeout.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::entry::render_test_entry;
use crate::core::symbols::discover_symbols;
use crate::core::types::{ExecutionResult, FailureKind, NO_SYMBOLS_MESSAGE};
use crate::io::process::run_command_captured;
use crate::io::workspace::Workspace;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;

/// Settings for one harness instance. Read-only once constructed.
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    /// Interpreter used to run the test entry (e.g. `python3`).
    pub interpreter: String,
    /// Shared directory holding per-invocation workspaces.
    pub scratch_dir: PathBuf,
    /// Hard wall-clock budget for the test process.
    pub timeout: Duration,
    /// Keep at most this many bytes of combined output.
    pub output_limit_bytes: usize,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            scratch_dir: std::env::temp_dir().join("tddloop"),
            timeout: DEFAULT_TIMEOUT,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

/// Abstraction over test execution backends.
///
/// Implementations never return an error: every failure, including their own
/// malfunction, is reported through [`ExecutionResult`].
pub trait TestHarness {
    fn run(&self, solution: &str, tests: &str) -> ExecutionResult;
}

/// Harness that runs the test entry with a Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonHarness {
    settings: HarnessSettings,
}

impl PythonHarness {
    pub fn new(settings: HarnessSettings) -> Self {
        Self { settings }
    }

    fn try_run(&self, solution: &str, tests: &str) -> Result<ExecutionResult> {
        let workspace = Workspace::create(&self.settings.scratch_dir)?;
        workspace.write_solution(solution)?;

        let discovery = discover_symbols(solution);
        if discovery.symbols.is_empty() {
            return Ok(match discovery.syntax_error {
                Some(diagnostic) => ExecutionResult::fail(
                    FailureKind::SyntaxError,
                    format!("{NO_SYMBOLS_MESSAGE}: {diagnostic}"),
                ),
                None => ExecutionResult::fail(FailureKind::NoSymbols, NO_SYMBOLS_MESSAGE),
            });
        }
        debug!(symbols = ?discovery.symbols.as_slice(), "linking tests against symbols");

        let entry = render_test_entry(workspace.module_name(), &discovery.symbols, tests);
        workspace.write_entry(&entry)?;
        let capture = workspace.create_capture()?;

        let cmd = self.interpreter_command(&workspace)?;
        let output = run_command_captured(
            cmd,
            capture,
            self.settings.timeout,
            self.settings.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.settings.interpreter))?;

        if output.timed_out {
            warn!(id = workspace.id(), "test run timed out");
            let mut message = format!(
                "test run timed out after {:?} and was terminated",
                self.settings.timeout
            );
            let partial = output.text();
            if !partial.trim().is_empty() {
                message.push_str("\n\npartial output:\n");
                message.push_str(&partial);
            }
            return Ok(ExecutionResult::fail(FailureKind::Timeout, message));
        }

        if output.status.success() {
            Ok(ExecutionResult::pass(output.text()))
        } else {
            debug!(exit_code = ?output.status.code(), "test run failed");
            Ok(ExecutionResult::fail(FailureKind::TestFailure, output.text()))
        }
    }

    fn interpreter_command(&self, workspace: &Workspace) -> Result<Command> {
        let mut cmd = Command::new(&self.settings.interpreter);
        cmd.arg("-B")
            .arg(workspace.entry_path())
            .current_dir(workspace.dir())
            .env("PYTHONPATH", python_path(workspace.dir())?)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONUNBUFFERED", "1");
        Ok(cmd)
    }
}

impl TestHarness for PythonHarness {
    #[instrument(skip_all, fields(timeout_secs = self.settings.timeout.as_secs()))]
    fn run(&self, solution: &str, tests: &str) -> ExecutionResult {
        // The workspace is dropped inside `try_run`, so its files are gone on every path.
        let result = match self.try_run(solution, tests) {
            Ok(result) => result,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "harness malfunction");
                ExecutionResult::internal(format!("{err:#}"))
            }
        };
        info!(passed = result.passed, failure = ?result.failure, "execution finished");
        result
    }
}

/// `PYTHONPATH` with `dir` prepended to any inherited entries.
fn python_path(dir: &Path) -> Result<OsString> {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PYTHONPATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).context("build PYTHONPATH")
}
