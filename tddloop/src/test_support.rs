//! Test doubles and fixtures for the attempt loop.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! integration tests under `tests/`.

use std::collections::VecDeque;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::response::MarkerSet;
use crate::core::types::ExecutionResult;
use crate::io::harness::{HarnessSettings, PythonHarness, TestHarness};
use crate::io::oracle::Oracle;

/// Oracle that replays scripted replies in order and records every prompt.
///
/// `Err` entries simulate a broken channel. Running past the script is an error.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Oracle that always answers, one reply per call.
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|reply| Ok(reply.into())).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }
}

impl Oracle for ScriptedOracle {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        match self.replies.lock().expect("replies lock").pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted oracle has no reply left")),
        }
    }
}

/// Harness that replays scripted results and records the sources it was given.
#[derive(Debug, Default)]
pub struct ScriptedHarness {
    results: Mutex<VecDeque<ExecutionResult>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedHarness {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(solution, tests)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl TestHarness for ScriptedHarness {
    fn run(&self, solution: &str, tests: &str) -> ExecutionResult {
        self.calls
            .lock()
            .expect("calls lock")
            .push((solution.to_string(), tests.to_string()));
        self.results
            .lock()
            .expect("results lock")
            .pop_front()
            .unwrap_or_else(|| ExecutionResult::internal("scripted harness has no result left"))
    }
}

/// Oracle reply honoring the default marker contract.
pub fn well_formed_response(solution: &str, tests: &str) -> String {
    let markers = MarkerSet::default();
    format!(
        "Here is the code.\n{}\n{}\n{}\n\nAnd the tests.\n{}\n{}\n{}\n",
        markers.solution_begin,
        solution,
        markers.solution_end,
        markers.tests_begin,
        tests,
        markers.tests_end
    )
}

/// Interpreter for tests that need a real Python, if one is installed.
///
/// Honors `TDDLOOP_TEST_PYTHON`, falling back to `python3`.
pub fn python_interpreter() -> Option<String> {
    let interpreter =
        std::env::var("TDDLOOP_TEST_PYTHON").unwrap_or_else(|_| "python3".to_string());
    let status = Command::new(&interpreter)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .ok()?;
    status.success().then_some(interpreter)
}

/// Real harness rooted in `scratch_dir`.
pub fn python_harness(interpreter: &str, scratch_dir: &Path, timeout: Duration) -> PythonHarness {
    PythonHarness::new(HarnessSettings {
        interpreter: interpreter.to_string(),
        scratch_dir: scratch_dir.to_path_buf(),
        timeout,
        ..HarnessSettings::default()
    })
}
