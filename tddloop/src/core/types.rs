//! Shared deterministic types for the generate/execute/revise loop.
//!
//! These types define stable contracts between the harness, the loop and the
//! CLI. They carry no I/O and serialize to stable JSON for `--json` reports.

use serde::{Deserialize, Serialize};

/// Diagnostic returned when a solution exposes nothing the tests could import.
pub const NO_SYMBOLS_MESSAGE: &str = "no importable symbols found";

/// Why an execution did not pass.
///
/// Every kind maps to `passed = false`. Only [`FailureKind::Internal`] means the
/// harness itself malfunctioned rather than the candidate being wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The solution parsed but declares no top-level names.
    NoSymbols,
    /// The solution is not valid source, so no names could be discovered.
    SyntaxError,
    /// The test process ran to completion with a non-zero exit.
    TestFailure,
    /// The test process exceeded its wall-clock budget and was killed.
    Timeout,
    /// Filesystem or spawn failure unrelated to the candidate.
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NoSymbols => "no_symbols",
            FailureKind::SyntaxError => "syntax_error",
            FailureKind::TestFailure => "test_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::Internal => "internal",
        }
    }
}

/// Outcome of one harness invocation. Produced once, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub passed: bool,
    /// Combined stdout/stderr of the test process, or a harness diagnostic.
    pub output: String,
    /// Classification when `passed` is false.
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    pub fn pass(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            output: output.into(),
            failure: None,
        }
    }

    pub fn fail(kind: FailureKind, output: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: output.into(),
            failure: Some(kind),
        }
    }

    /// Wrap a harness malfunction so it is distinguishable from a bad candidate.
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::fail(
            FailureKind::Internal,
            format!("internal harness error: {message}"),
        )
    }

    pub fn is_internal(&self) -> bool {
        self.failure == Some(FailureKind::Internal)
    }
}

/// Which prompt variant produced an attempt's candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Generate,
    Revise,
}

/// Outcome recorded for a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "failure")]
pub enum AttemptOutcome {
    /// The tests ran and passed.
    Passed,
    /// The tests were executed (or short-circuited by the harness) and failed.
    Failed(FailureKind),
    /// The oracle response did not honor the marker contract.
    FormatError,
    /// The oracle call itself failed.
    OracleError,
}

impl AttemptOutcome {
    pub fn from_execution(result: &ExecutionResult) -> Self {
        if result.passed {
            return AttemptOutcome::Passed;
        }
        AttemptOutcome::Failed(result.failure.unwrap_or(FailureKind::TestFailure))
    }
}

/// One iteration of the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// Attempt number (1-indexed).
    pub index: u32,
    pub phase: Phase,
    /// Candidate solution, empty when the response could not be parsed.
    pub solution: String,
    /// Candidate tests, empty when the response could not be parsed.
    pub tests: String,
    pub outcome: AttemptOutcome,
    /// Captured test output or the parser/oracle diagnostic.
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_results_are_prefixed_and_flagged() {
        let result = ExecutionResult::internal("spawn python3: not found");
        assert!(!result.passed);
        assert!(result.is_internal());
        assert_eq!(
            result.output,
            "internal harness error: spawn python3: not found"
        );
    }

    #[test]
    fn attempt_outcome_follows_execution_result() {
        let passed = ExecutionResult::pass("ok");
        assert_eq!(
            AttemptOutcome::from_execution(&passed),
            AttemptOutcome::Passed
        );

        let timed_out = ExecutionResult::fail(FailureKind::Timeout, "timed out");
        assert_eq!(
            AttemptOutcome::from_execution(&timed_out),
            AttemptOutcome::Failed(FailureKind::Timeout)
        );
    }

    #[test]
    fn attempt_outcome_serializes_with_kind_tag() {
        let json = serde_json::to_string(&AttemptOutcome::Failed(FailureKind::NoSymbols))
            .expect("serialize");
        assert_eq!(json, r#"{"kind":"failed","failure":"no_symbols"}"#);

        let json = serde_json::to_string(&AttemptOutcome::FormatError).expect("serialize");
        assert_eq!(json, r#"{"kind":"format_error"}"#);
    }
}
