//! I/O helpers: model and formatter processes, persistence and artifacts.

pub mod cache;
pub mod config;
pub mod model;
pub mod output;
pub mod process;
pub mod prompt;
pub mod run_registry;
pub mod stage_log;
pub mod validators;
