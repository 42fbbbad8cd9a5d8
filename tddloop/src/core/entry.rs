//! Synthesis of the runnable test entry module.

use crate::core::symbols::SymbolSet;

/// Trailer appended after the test source so the entry module runs its suite.
pub const RUNNER_TRAILER: &str = "if __name__ == \"__main__\":\n    unittest.main(verbosity=2)\n";

/// Render the test entry: explicit import of `symbols` from `module`, the raw
/// test source, then the unittest trailer.
///
/// Only the discovered names are imported (no wildcard), so the test module
/// sees exactly what discovery reported. Top-level `from __future__` imports in
/// the tests are hoisted above everything else, where Python requires them.
pub fn render_test_entry(module: &str, symbols: &SymbolSet, tests: &str) -> String {
    let (future_imports, body): (Vec<&str>, Vec<&str>) = tests
        .trim_end()
        .lines()
        .partition(|line| line.starts_with("from __future__ import"));

    let mut buf = String::new();
    for line in &future_imports {
        buf.push_str(line);
        buf.push('\n');
    }
    buf.push_str(&format!("from {module} import (\n"));
    for name in symbols.iter() {
        buf.push_str(&format!("    {name},\n"));
    }
    buf.push_str(")\n");
    buf.push_str("import unittest\n\n");
    buf.push_str(body.join("\n").trim_start_matches('\n'));
    buf.push_str("\n\n\n");
    buf.push_str(RUNNER_TRAILER);
    buf
}
