//! Generate, execute and revise candidate solutions until their tests pass.
//!
//! An oracle is asked for a Python solution plus a `unittest` suite, the suite
//! runs against the solution in a fresh interpreter process, and failures are
//! fed back to the oracle for a bounded number of revisions.
//!
//! - **[`core`]**: pure logic (response parsing, symbol discovery, test entry
//!   rendering, shared types).
//! - **[`io`]**: side effects (workspaces, child processes, the oracle, config).
//!
//! [`orchestrate`] ties the two together into the attempt loop.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrate;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
