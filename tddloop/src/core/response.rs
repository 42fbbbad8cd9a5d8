//! Marker-delimited oracle response parsing.
//!
//! An oracle response carries two sections, each bracketed by a begin/end
//! marker pair:
//!
//! ```text
//! [FUNCTION]
//! def add(a, b): ...
//! [/FUNCTION]
//! [TESTS]
//! class AddTests(unittest.TestCase): ...
//! [/TESTS]
//! ```
//!
//! The four literal markers form a small versioned protocol ([`MarkerSet`]) so
//! oracles can be swapped without touching the parser as long as they honor it.

use anyhow::{Result, anyhow, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current version of the marker contract.
pub const MARKER_SCHEMA_VERSION: u32 = 1;

/// The four literal markers delimiting the solution and test sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerSet {
    pub version: u32,
    pub solution_begin: String,
    pub solution_end: String,
    pub tests_begin: String,
    pub tests_end: String,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self {
            version: MARKER_SCHEMA_VERSION,
            solution_begin: "[FUNCTION]".to_string(),
            solution_end: "[/FUNCTION]".to_string(),
            tests_begin: "[TESTS]".to_string(),
            tests_end: "[/TESTS]".to_string(),
        }
    }
}

impl MarkerSet {
    /// Markers in the order they are checked for presence.
    pub fn all(&self) -> [&str; 4] {
        [
            &self.solution_begin,
            &self.solution_end,
            &self.tests_begin,
            &self.tests_end,
        ]
    }

    /// Reject marker sets that would make extraction ambiguous.
    pub fn validate(&self) -> Result<()> {
        if self.version != MARKER_SCHEMA_VERSION {
            bail!(
                "unsupported marker schema version {} (expected {MARKER_SCHEMA_VERSION})",
                self.version
            );
        }
        let markers = self.all();
        for marker in markers {
            if marker.trim().is_empty() {
                bail!("markers must be non-empty");
            }
        }
        for (i, a) in markers.iter().enumerate() {
            for b in markers.iter().skip(i + 1) {
                if a == b {
                    bail!("markers must be distinct: {a:?} is used twice");
                }
                if a.contains(b) || b.contains(a) {
                    bail!("markers must not nest: {a:?} and {b:?} overlap");
                }
            }
        }
        Ok(())
    }
}

/// Section of a response, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Solution,
    Tests,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Solution => f.write_str("solution"),
            Section::Tests => f.write_str("tests"),
        }
    }
}

/// The oracle response did not honor the marker contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("response format invalid: missing marker {marker}")]
    MissingMarker { marker: String },
    #[error("response format invalid: could not extract {section} between its markers")]
    Unextractable { section: Section },
    #[error("response format invalid: solution and tests sections overlap")]
    Overlapping,
    #[error("response format invalid: {section} section is empty")]
    EmptySection { section: Section },
}

/// Solution and test source extracted from one oracle response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub solution: String,
    pub tests: String,
}

/// Compiled extractor for a validated [`MarkerSet`].
#[derive(Debug, Clone)]
pub struct ResponseParser {
    markers: MarkerSet,
    solution_re: Regex,
    tests_re: Regex,
}

impl ResponseParser {
    pub fn new(markers: MarkerSet) -> Result<Self> {
        markers.validate()?;
        let solution_re = section_regex(&markers.solution_begin, &markers.solution_end)?;
        let tests_re = section_regex(&markers.tests_begin, &markers.tests_end)?;
        Ok(Self {
            markers,
            solution_re,
            tests_re,
        })
    }

    /// Extract both sections, trimmed. Pure: depends only on `response`.
    pub fn parse(&self, response: &str) -> Result<ParsedResponse, FormatError> {
        for marker in self.markers.all() {
            if !response.contains(marker) {
                return Err(FormatError::MissingMarker {
                    marker: marker.to_string(),
                });
            }
        }

        let solution = self
            .solution_re
            .captures(response)
            .ok_or(FormatError::Unextractable {
                section: Section::Solution,
            })?;
        let tests = self
            .tests_re
            .captures(response)
            .ok_or(FormatError::Unextractable {
                section: Section::Tests,
            })?;

        // Capture group 0 always exists for a successful match.
        let (Some(solution_span), Some(tests_span)) = (solution.get(0), tests.get(0)) else {
            return Err(FormatError::Overlapping);
        };
        if solution_span.start() < tests_span.end() && tests_span.start() < solution_span.end() {
            return Err(FormatError::Overlapping);
        }

        let solution = solution.get(1).map_or("", |m| m.as_str()).trim();
        let tests = tests.get(1).map_or("", |m| m.as_str()).trim();
        if solution.is_empty() {
            return Err(FormatError::EmptySection {
                section: Section::Solution,
            });
        }
        if tests.is_empty() {
            return Err(FormatError::EmptySection {
                section: Section::Tests,
            });
        }

        Ok(ParsedResponse {
            solution: solution.to_string(),
            tests: tests.to_string(),
        })
    }
}

fn section_regex(begin: &str, end: &str) -> Result<Regex> {
    let pattern = format!("(?s){}(.*?){}", regex::escape(begin), regex::escape(end));
    Regex::new(&pattern).map_err(|err| anyhow!("compile section pattern {pattern:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ResponseParser {
        ResponseParser::new(MarkerSet::default()).expect("default markers")
    }

    const WELL_FORMED: &str = "Here you go.\n[FUNCTION]\n  def add(a, b):\n      return a + b\n[/FUNCTION]\nand the tests:\n[TESTS]\nclass T(unittest.TestCase):\n    pass\n\n[/TESTS]\n";

    #[test]
    fn extracts_trimmed_sections() {
        let parsed = parser().parse(WELL_FORMED).expect("parse");
        assert_eq!(parsed.solution, "def add(a, b):\n      return a + b");
        assert_eq!(parsed.tests, "class T(unittest.TestCase):\n    pass");
    }

    #[test]
    fn sections_may_appear_in_any_order() {
        let response = "[TESTS]t[/TESTS] noise [FUNCTION]s[/FUNCTION]";
        let parsed = parser().parse(response).expect("parse");
        assert_eq!(parsed.solution, "s");
        assert_eq!(parsed.tests, "t");
    }

    #[test]
    fn each_missing_marker_is_named() {
        let markers = MarkerSet::default();
        for marker in markers.all() {
            let response = WELL_FORMED.replace(marker, "");
            let err = parser().parse(&response).expect_err("missing marker");
            assert_eq!(
                err,
                FormatError::MissingMarker {
                    marker: marker.to_string()
                }
            );
            assert!(err.to_string().contains(marker));
        }
    }

    #[test]
    fn end_before_begin_is_unextractable() {
        let response = "[/FUNCTION] x [FUNCTION] [TESTS]t[/TESTS]";
        let err = parser().parse(response).expect_err("unextractable");
        assert_eq!(
            err,
            FormatError::Unextractable {
                section: Section::Solution
            }
        );
    }

    #[test]
    fn overlapping_sections_are_rejected() {
        let response = "[FUNCTION] a [TESTS] b [/FUNCTION] c [/TESTS]";
        let err = parser().parse(response).expect_err("overlap");
        assert_eq!(err, FormatError::Overlapping);
    }

    #[test]
    fn blank_section_is_rejected() {
        let response = "[FUNCTION]  \n [/FUNCTION][TESTS]t[/TESTS]";
        let err = parser().parse(response).expect_err("empty");
        assert_eq!(
            err,
            FormatError::EmptySection {
                section: Section::Solution
            }
        );
    }

    #[test]
    fn extraction_is_non_greedy() {
        let response = "[FUNCTION]one[/FUNCTION][TESTS]t[/TESTS] trailing [/FUNCTION]";
        let parsed = parser().parse(response).expect("parse");
        assert_eq!(parsed.solution, "one");
    }

    #[test]
    fn custom_markers_with_regex_metacharacters_work() {
        let markers = MarkerSet {
            solution_begin: "<<code>>".to_string(),
            solution_end: "<</code>>".to_string(),
            tests_begin: "(*tests*)".to_string(),
            tests_end: "(*/tests*)".to_string(),
            ..MarkerSet::default()
        };
        let parsed = ResponseParser::new(markers)
            .expect("parser")
            .parse("<<code>>x = 1<</code>>(*tests*)assert x(*/tests*)")
            .expect("parse");
        assert_eq!(parsed.solution, "x = 1");
        assert_eq!(parsed.tests, "assert x");
    }

    #[test]
    fn validate_rejects_nested_or_duplicate_markers() {
        let nested = MarkerSet {
            solution_begin: "BEGIN".to_string(),
            solution_end: "BEGIN-END".to_string(),
            ..MarkerSet::default()
        };
        assert!(nested.validate().is_err());

        let duplicate = MarkerSet {
            tests_begin: "[FUNCTION]".to_string(),
            ..MarkerSet::default()
        };
        assert!(duplicate.validate().is_err());

        let future = MarkerSet {
            version: 2,
            ..MarkerSet::default()
        };
        assert!(future.validate().is_err());
    }
}
