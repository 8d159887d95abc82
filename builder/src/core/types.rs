//! Shared deterministic types for prompting and inference.
//!
//! These types define stable contracts between the prompt library, the
//! response cache and the reasoning protocol. Their serialized form is part
//! of the cache key, so field names and variant spellings must stay stable.

use serde::{Deserialize, Serialize};

/// Author of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Development phase a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Understand,
    Architecture,
    StructureCode,
    StructureTests,
    WriteCode,
}

impl Phase {
    /// Template name of the phase task.
    pub fn template_name(self) -> &'static str {
        match self {
            Phase::Understand => "understand",
            Phase::Architecture => "architecture",
            Phase::StructureCode => "structure_code",
            Phase::StructureTests => "structure_tests",
            Phase::WriteCode => "write_code",
        }
    }

    /// Short, ordered name used for stage log files.
    pub fn log_slug(self) -> &'static str {
        match self {
            Phase::Understand => "1_understand",
            Phase::Architecture => "2_architecture",
            Phase::StructureCode => "3_skeleton_code",
            Phase::StructureTests => "4_skeleton_test",
            Phase::WriteCode => "5_write_code",
        }
    }
}

/// Step within a reasoning request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStep {
    Ideate,
    Critique,
    Resolve,
}

impl InferenceStep {
    pub fn template_name(self) -> &'static str {
        match self {
            InferenceStep::Ideate => "ideate",
            InferenceStep::Critique => "critique",
            InferenceStep::Resolve => "resolve",
        }
    }

    pub fn log_slug(self) -> &'static str {
        match self {
            InferenceStep::Ideate => "__a_ideation",
            InferenceStep::Critique => "__b_critique",
            InferenceStep::Resolve => "__c_resolution",
        }
    }
}

/// How many model calls a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One call straight to the final answer.
    Simple,
    /// Ideate, critique, then resolve.
    ThreeStage,
}
