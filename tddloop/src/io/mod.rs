//! Side-effecting collaborators of the loop: filesystem, child processes,
//! the oracle and configuration.

pub mod config;
pub mod harness;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod workspace;
