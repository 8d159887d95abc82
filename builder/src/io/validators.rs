//! Syntax validation and canonical formatting of generated files.
//!
//! Validators are looked up by file extension. Extensions on the ignore list
//! are never checked; any other unregistered extension is a configuration
//! error ([`UnknownFileTypeError`]).

use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::codebase::file_extension;
use crate::io::config::ValidationConfig;
use crate::io::process::run_command_with_timeout;

/// Result of checking one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Syntax is valid; `formatted` is the canonical form of the text.
    Valid { formatted: String },
    Invalid { detail: String },
}

/// Checks and formats source text of one language.
pub trait SyntaxValidator {
    fn language(&self) -> &str;

    /// Validate `code`, returning its canonical formatting when it is valid.
    ///
    /// `Err` is reserved for failures of the validator itself (for example a
    /// formatter that cannot be started); bad input is `Validation::Invalid`.
    fn check_and_format(&self, code: &str) -> Result<Validation>;
}

/// Accepts everything and leaves the text untouched.
#[derive(Debug, Clone)]
pub struct PassthroughValidator {
    pub language: String,
}

impl SyntaxValidator for PassthroughValidator {
    fn language(&self) -> &str {
        &self.language
    }

    fn check_and_format(&self, code: &str) -> Result<Validation> {
        Ok(Validation::Valid {
            formatted: code.to_string(),
        })
    }
}

/// Formatter command: text on stdin, formatted text on stdout, non-zero exit on bad syntax.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    pub language: String,
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl SyntaxValidator for CommandValidator {
    fn language(&self) -> &str {
        &self.language
    }

    #[instrument(skip_all, fields(language = %self.language))]
    fn check_and_format(&self, code: &str) -> Result<Validation> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("{} validator command is empty", self.language))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = run_command_with_timeout(
            cmd,
            Some(code.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run {} validator {program}", self.language))?;

        if output.timed_out {
            return Err(anyhow!(
                "{} validator timed out after {:?}",
                self.language,
                self.timeout
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "{} validator output exceeded {} bytes",
                self.language,
                self.output_limit_bytes
            ));
        }
        if !output.status.success() {
            debug!(exit_code = ?output.status.code(), "syntax check failed");
            return Ok(Validation::Invalid {
                detail: output.failure_detail(),
            });
        }
        Ok(Validation::Valid {
            formatted: output.stdout_text(),
        })
    }
}

/// No validator is registered for the file's extension and it is not ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no syntax validator registered for '{file}'")]
pub struct UnknownFileTypeError {
    pub file: String,
}

/// Extension → validator lookup plus the ignore list.
pub struct ValidatorRegistry {
    ignore: Vec<String>,
    validators: BTreeMap<String, Box<dyn SyntaxValidator>>,
}

impl ValidatorRegistry {
    pub fn new(ignore: Vec<String>) -> Self {
        Self {
            ignore,
            validators: BTreeMap::new(),
        }
    }

    /// Build the registry described by the validation config.
    pub fn from_config(cfg: &ValidationConfig) -> Self {
        let mut registry = Self::new(cfg.ignore.clone());
        for (ext, lang) in &cfg.languages {
            let validator: Box<dyn SyntaxValidator> = match &lang.command {
                Some(command) => Box::new(CommandValidator {
                    language: lang.language.clone(),
                    command: command.clone(),
                    timeout: Duration::from_secs(cfg.timeout_secs),
                    output_limit_bytes: cfg.output_limit_bytes,
                }),
                None => Box::new(PassthroughValidator {
                    language: lang.language.clone(),
                }),
            };
            registry.register(ext, validator);
        }
        registry
    }

    pub fn register(&mut self, ext: &str, validator: Box<dyn SyntaxValidator>) {
        if self.validators.insert(ext.to_string(), validator).is_some() {
            warn!(ext, "replacing syntax validator");
        }
    }

    /// Validator for `file_name`, or `None` when its extension is ignored.
    pub fn for_file(&self, file_name: &str) -> Result<Option<&dyn SyntaxValidator>> {
        let ext = file_extension(file_name).unwrap_or("");
        if self.ignore.iter().any(|ignored| ignored == ext) {
            return Ok(None);
        }
        match self.validators.get(ext) {
            Some(validator) => Ok(Some(validator.as_ref())),
            None => Err(UnknownFileTypeError {
                file: file_name.to_string(),
            }
            .into()),
        }
    }
}
