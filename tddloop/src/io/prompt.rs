//! Prompt rendering for the two oracle request variants.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::response::MarkerSet;

const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const REVISE_TEMPLATE: &str = include_str!("prompts/revise.md");

pub const DEFAULT_DIAGNOSTICS_BUDGET_BYTES: usize = 20_000;

/// Inputs for a revision request.
#[derive(Debug, Clone, Copy)]
pub struct RevisionInputs<'a> {
    pub task: &'a str,
    pub solution: &'a str,
    pub tests: &'a str,
    pub diagnostics: &'a str,
}

/// Renders generation and revision prompts that instruct the marker contract.
pub struct PromptBuilder {
    env: Environment<'static>,
    markers: MarkerSet,
    diagnostics_budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(markers: MarkerSet, diagnostics_budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("generate", GENERATE_TEMPLATE)
            .context("load generate template")?;
        env.add_template("revise", REVISE_TEMPLATE)
            .context("load revise template")?;
        Ok(Self {
            env,
            markers,
            diagnostics_budget_bytes,
        })
    }

    /// Initial request: task description only.
    pub fn generation(&self, task: &str) -> Result<String> {
        let template = self.env.get_template("generate")?;
        let rendered = template
            .render(context! {
                task => task.trim(),
                markers => &self.markers,
            })
            .context("render generate prompt")?;
        Ok(rendered)
    }

    /// Revision request carrying the previous candidate and its diagnostics.
    pub fn revision(&self, input: &RevisionInputs<'_>) -> Result<String> {
        let diagnostics = truncate_head(input.diagnostics.trim(), self.diagnostics_budget_bytes);
        let template = self.env.get_template("revise")?;
        let rendered = template
            .render(context! {
                task => input.task.trim(),
                solution => input.solution.trim(),
                tests => input.tests.trim(),
                diagnostics => diagnostics,
                markers => &self.markers,
            })
            .context("render revise prompt")?;
        Ok(rendered)
    }
}

/// Keep the last `budget` bytes of `text`, marking how much was dropped.
///
/// Tracebacks and unittest summaries end with the most useful lines, so the
/// head is what goes.
fn truncate_head(text: &str, budget: usize) -> String {
    if text.len() <= budget {
        return text.to_string();
    }
    let mut start = text.len() - budget;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    debug!(
        before_len = text.len(),
        dropped = start,
        "truncated diagnostics for budget"
    );
    format!("[truncated {start} bytes]\n{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(budget: usize) -> PromptBuilder {
        PromptBuilder::new(MarkerSet::default(), budget).expect("builder")
    }

    #[test]
    fn generation_prompt_carries_task_and_markers() {
        let prompt = builder(1000).generation("  add two numbers \n").expect("render");
        assert!(prompt.contains("<task>\nadd two numbers\n</task>"));
        for marker in MarkerSet::default().all() {
            assert!(prompt.contains(marker), "missing {marker}");
        }
        let begin = prompt.find("[FUNCTION]").expect("solution begin");
        let tests = prompt.find("[TESTS]").expect("tests begin");
        assert!(begin < tests);
    }

    #[test]
    fn revision_prompt_orders_sections() {
        let prompt = builder(1000)
            .revision(&RevisionInputs {
                task: "add two numbers",
                solution: "def add(a, b):\n    return a - b",
                tests: "assert add(2, 2) == 4",
                diagnostics: "AssertionError: 0 != 4",
            })
            .expect("render");

        let task = prompt.find("add two numbers").expect("task");
        let code = prompt.find("return a - b").expect("code");
        let tests = prompt.find("assert add(2, 2) == 4").expect("tests");
        let output = prompt.find("AssertionError: 0 != 4").expect("diagnostics");
        assert!(task < code && code < tests && tests < output);
        assert!(prompt.contains("[/TESTS]"));
    }

    #[test]
    fn custom_markers_are_rendered_verbatim() {
        let markers = MarkerSet {
            solution_begin: "<<<code>>>".to_string(),
            ..MarkerSet::default()
        };
        let prompt = PromptBuilder::new(markers, 1000)
            .expect("builder")
            .generation("task")
            .expect("render");
        assert!(prompt.contains("<<<code>>>"));
    }

    #[test]
    fn long_diagnostics_keep_their_tail() {
        let diagnostics = format!("{}\nAssertionError: 4 != 5", "noise line\n".repeat(500));
        let prompt = builder(100)
            .revision(&RevisionInputs {
                task: "t",
                solution: "s = 1",
                tests: "assert s",
                diagnostics: &diagnostics,
            })
            .expect("render");
        assert!(prompt.contains("AssertionError: 4 != 5"));
        assert!(prompt.contains("[truncated "));
        assert!(prompt.len() < diagnostics.len());
    }

    #[test]
    fn truncate_head_respects_char_boundaries() {
        let text = "ééééé";
        let truncated = truncate_head(text, 3);
        assert!(truncated.ends_with("é"));
        assert_eq!(truncate_head("short", 10), "short");
    }
}
