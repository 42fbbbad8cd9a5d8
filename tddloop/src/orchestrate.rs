//! The generate → execute → revise attempt loop.
//!
//! Each attempt asks the oracle for a candidate, parses it, and runs its tests
//! through the harness. The loop stops on the first passing attempt, on an
//! oracle failure, or once `max_attempts` attempts have been made. Every
//! attempt is recorded, including ones whose response could not be parsed.

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::response::{MarkerSet, ParsedResponse, ResponseParser};
use crate::core::types::{Attempt, AttemptOutcome, ExecutionResult, Phase};
use crate::io::harness::TestHarness;
use crate::io::oracle::Oracle;
use crate::io::prompt::{PromptBuilder, RevisionInputs};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Natural-language description of what to build. Never modified by the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Task(String);

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Task {
    fn from(description: &str) -> Self {
        Self::new(description)
    }
}

impl From<String> for Task {
    fn from(description: String) -> Self {
        Self::new(description)
    }
}

/// Reason why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum LoopStop {
    /// The last attempt's tests passed.
    Passed,
    /// Every attempt was used without a pass.
    Exhausted { max_attempts: u32 },
    /// The oracle could not be reached; remaining attempts were not used.
    OracleError { message: String },
}

impl LoopStop {
    /// Terminal state label used in progress output.
    pub fn label(&self) -> &'static str {
        match self {
            LoopStop::Passed => "pass",
            LoopStop::Exhausted { .. } => "fail-exhausted",
            LoopStop::OracleError { .. } => "fail-error",
        }
    }
}

/// Terminal result of one loop run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopOutcome {
    /// Last successfully parsed solution, empty if no response ever parsed.
    pub solution: String,
    /// Tests paired with `solution`.
    pub tests: String,
    pub passed: bool,
    /// Output of the last attempt.
    pub output: String,
    pub stop: LoopStop,
    pub attempts: Vec<Attempt>,
    /// Attempts whose execution failed because of the harness itself.
    pub harness_errors: u32,
}

/// Drives an [`Oracle`] and a [`TestHarness`] through the attempt loop.
pub struct Orchestrator<O, H> {
    oracle: O,
    harness: H,
    prompts: PromptBuilder,
    parser: ResponseParser,
}

impl<O: Oracle, H: TestHarness> Orchestrator<O, H> {
    pub fn new(
        oracle: O,
        harness: H,
        markers: MarkerSet,
        diagnostics_budget_bytes: usize,
    ) -> Result<Self> {
        let parser = ResponseParser::new(markers.clone())?;
        let prompts = PromptBuilder::new(markers, diagnostics_budget_bytes)?;
        Ok(Self {
            oracle,
            harness,
            prompts,
            parser,
        })
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn harness(&self) -> &H {
        &self.harness
    }

    pub fn run(&self, task: &Task, max_attempts: u32) -> Result<LoopOutcome> {
        self.run_with(task, max_attempts, |_| {})
    }

    /// Run the loop, calling `on_attempt` after each attempt is recorded.
    ///
    /// Returns `Err` only for caller errors (`max_attempts == 0`) and prompt
    /// rendering failures. Oracle and harness failures end up in the outcome.
    #[instrument(skip_all, fields(max_attempts = max_attempts))]
    pub fn run_with<F: FnMut(&Attempt)>(
        &self,
        task: &Task,
        max_attempts: u32,
        mut on_attempt: F,
    ) -> Result<LoopOutcome> {
        if max_attempts == 0 {
            bail!("max_attempts must be >= 1");
        }

        let mut run = LoopRun::default();
        for index in 1..=max_attempts {
            let (phase, prompt) = match &run.candidate {
                None => (Phase::Generate, self.prompts.generation(task.as_str())?),
                Some(candidate) => (
                    Phase::Revise,
                    self.prompts.revision(&RevisionInputs {
                        task: task.as_str(),
                        solution: &candidate.solution,
                        tests: &candidate.tests,
                        diagnostics: &run.diagnostics,
                    })?,
                ),
            };
            info!(index, phase = ?phase, "attempt started");

            let response = match self.oracle.generate(&prompt) {
                Ok(response) => response,
                Err(err) => {
                    let message = format!("oracle error: {err:#}");
                    warn!(index, err = %message, "oracle call failed");
                    run.record(
                        Attempt {
                            index,
                            phase,
                            solution: String::new(),
                            tests: String::new(),
                            outcome: AttemptOutcome::OracleError,
                            output: message.clone(),
                        },
                        &mut on_attempt,
                    );
                    return Ok(run.finish(LoopStop::OracleError { message }));
                }
            };

            let parsed = match self.parser.parse(&response) {
                Ok(parsed) => parsed,
                Err(err) => {
                    // The attempt is spent; a revision keeps the last parsed pair.
                    let message = err.to_string();
                    warn!(index, err = %message, "unusable oracle response");
                    run.diagnostics = message.clone();
                    run.record(
                        Attempt {
                            index,
                            phase,
                            solution: String::new(),
                            tests: String::new(),
                            outcome: AttemptOutcome::FormatError,
                            output: message,
                        },
                        &mut on_attempt,
                    );
                    continue;
                }
            };

            let result = self.harness.run(&parsed.solution, &parsed.tests);
            if result.is_internal() {
                run.harness_errors += 1;
                warn!(index, "harness malfunction counted against the attempt budget");
            }
            let passed = result.passed;
            run.record_execution(index, phase, &parsed, result, &mut on_attempt);
            run.candidate = Some(parsed);

            if passed {
                info!(index, "tests passed");
                return Ok(run.finish(LoopStop::Passed));
            }
        }

        info!(max_attempts, "attempts exhausted");
        Ok(run.finish(LoopStop::Exhausted { max_attempts }))
    }
}

/// Mutable state of one loop run.
#[derive(Default)]
struct LoopRun {
    attempts: Vec<Attempt>,
    candidate: Option<ParsedResponse>,
    diagnostics: String,
    harness_errors: u32,
}

impl LoopRun {
    fn record<F: FnMut(&Attempt)>(&mut self, attempt: Attempt, on_attempt: &mut F) {
        on_attempt(&attempt);
        self.attempts.push(attempt);
    }

    fn record_execution<F: FnMut(&Attempt)>(
        &mut self,
        index: u32,
        phase: Phase,
        parsed: &ParsedResponse,
        result: ExecutionResult,
        on_attempt: &mut F,
    ) {
        let outcome = AttemptOutcome::from_execution(&result);
        self.diagnostics = result.output.clone();
        self.record(
            Attempt {
                index,
                phase,
                solution: parsed.solution.clone(),
                tests: parsed.tests.clone(),
                outcome,
                output: result.output,
            },
            on_attempt,
        );
    }

    fn finish(self, stop: LoopStop) -> LoopOutcome {
        let output = self
            .attempts
            .last()
            .map(|attempt| attempt.output.clone())
            .unwrap_or_default();
        let (solution, tests) = match self.candidate {
            Some(candidate) => (candidate.solution, candidate.tests),
            None => (String::new(), String::new()),
        };
        LoopOutcome {
            solution,
            tests,
            passed: stop == LoopStop::Passed,
            output,
            stop,
            attempts: self.attempts,
            harness_errors: self.harness_errors,
        }
    }
}
