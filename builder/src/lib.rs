//! Cached, self-repairing code generation agent.
//!
//! A language model turns a user goal into a plan and code skeletons, then
//! implements each requirement as line-numbered edits. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (edit model, patch engine,
//!   structured-output parsing). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (model and formatter processes,
//!   response cache, run registry, artifacts). Isolated behind traits so
//!   tests can script them.
//!
//! Orchestration modules ([`inference`], [`repair`], [`build`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod build;
pub mod core;
pub mod exit_codes;
pub mod inference;
pub mod io;
pub mod logging;
pub mod repair;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
