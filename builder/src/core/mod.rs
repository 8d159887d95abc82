//! Deterministic, pure logic shared by the builder.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! snapshots (codebases, change-sets, plans) and return deterministic outputs
//! suitable for tests.

pub mod change;
pub mod codebase;
pub mod parse;
pub mod patch;
pub mod project;
pub mod summary;
pub mod types;
