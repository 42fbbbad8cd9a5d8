//! Deterministic, pure logic shared by the loop and the harness.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and return deterministic outputs suitable for tests.

pub mod entry;
pub mod response;
pub mod symbols;
pub mod types;
