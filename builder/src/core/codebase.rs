//! In-memory codebase snapshots.
//!
//! A [`CodeBase`] is a plain value: every accepted patch produces a new
//! snapshot (see [`crate::core::patch::apply_change`]) and the previous one is
//! left untouched. Line storage is owned per snapshot, never shared.

use std::collections::HashSet;
use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::project::CodeSkeleton;

/// One physical line of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeLine(String);

impl CodeLine {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named file held as an ordered sequence of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFile {
    pub name: String,
    pub lines: Vec<CodeLine>,
}

impl CodeFile {
    pub fn new(name: impl Into<String>, lines: Vec<CodeLine>) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }

    /// Build a file from text; lines are split on `\n` so `content()` round-trips.
    pub fn from_content(name: impl Into<String>, content: &str) -> Self {
        Self::new(name, split_lines(content))
    }

    /// The file text: lines joined with `\n`.
    pub fn content(&self) -> String {
        self.lines
            .iter()
            .map(CodeLine::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn overwrite(&mut self, content: &str) {
        self.lines = split_lines(content);
    }

    pub fn extension(&self) -> Option<&str> {
        file_extension(&self.name)
    }
}

/// Extension of a file name without the dot; directories are ignored.
pub fn file_extension(name: &str) -> Option<&str> {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.rsplit_once('.').map(|(_, ext)| ext)
}

fn split_lines(content: &str) -> Vec<CodeLine> {
    content.split('\n').map(CodeLine::new).collect()
}

/// A snapshot of every file the agent is working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CodeBaseRepr")]
pub struct CodeBase {
    files: Vec<CodeFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    directory: Option<String>,
}

#[derive(Deserialize)]
struct CodeBaseRepr {
    files: Vec<CodeFile>,
    #[serde(default)]
    directory: Option<String>,
}

impl TryFrom<CodeBaseRepr> for CodeBase {
    type Error = String;

    fn try_from(repr: CodeBaseRepr) -> std::result::Result<Self, Self::Error> {
        CodeBase::new(repr.files, repr.directory).map_err(|err| err.to_string())
    }
}

impl CodeBase {
    /// Create a codebase, rejecting duplicate file names.
    pub fn new(files: Vec<CodeFile>, directory: Option<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for file in &files {
            if !seen.insert(file.name.as_str()) {
                return Err(anyhow!("duplicate file name '{}' in codebase", file.name));
            }
        }
        Ok(Self { files, directory })
    }

    /// Initial codebase from a function-signature skeleton.
    pub fn from_skeleton(skeleton: &CodeSkeleton, directory: Option<String>) -> Result<Self> {
        let files = skeleton
            .files
            .iter()
            .map(|file| CodeFile::new(file.name.clone(), file.initial_lines()))
            .collect();
        Self::new(files, directory)
    }

    pub fn files(&self) -> &[CodeFile] {
        &self.files
    }

    pub fn directory(&self) -> Option<&str> {
        self.directory.as_deref()
    }

    pub fn file(&self, name: &str) -> Option<&CodeFile> {
        self.files.iter().find(|file| file.name == name)
    }

    pub(crate) fn file_mut(&mut self, name: &str) -> Option<&mut CodeFile> {
        self.files.iter_mut().find(|file| file.name == name)
    }
}
