//! Per-requirement repair loop: propose → apply → validate, retrying on errors.
//!
//! The first proposal uses the three-stage protocol; retries ask once, with
//! every earlier rejected change and its errors in the prompt. Unparseable responses and
//! out-of-range edits count as failed attempts just like files that do not
//! pass the syntax check. A rejected candidate is never returned.

use anyhow::Result;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::change::CodeChange;
use crate::core::codebase::CodeBase;
use crate::core::parse::{OutputKind, parse_code_change};
use crate::core::patch::apply_change;
use crate::core::project::Requirement;
use crate::core::summary::summarize_codebase;
use crate::core::types::{Mode, Phase};
use crate::inference::{Inferer, Request};
use crate::io::model::Model;
use crate::io::prompt::PromptVars;
use crate::io::validators::{Validation, ValidatorRegistry};

/// File name used for errors that concern the whole response.
pub const RESPONSE_ERROR_FILE: &str = "<response>";

/// A problem found with one attempt, fed back into the next prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    pub file: String,
    pub detail: String,
}

/// One rejected proposal, kept so later retries see the whole history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedAttempt {
    /// 0-based attempt number.
    pub attempt: u32,
    /// Rendered change, when the response could be parsed.
    pub change: Option<String>,
    pub errors: Vec<FileError>,
}

/// Progress notification for one attempt.
#[derive(Debug)]
pub struct AttemptReport<'a> {
    /// 0-based attempt number.
    pub attempt: u32,
    /// The parsed change, when the response could be parsed.
    pub change: Option<&'a CodeChange>,
    /// Empty when the attempt was accepted.
    pub errors: &'a [FileError],
}

/// The requirement could not be implemented within the attempt budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("requirement '{requirement}' still failing after {attempts} attempts")]
pub struct BudgetExceededError {
    pub requirement: String,
    pub attempts: u32,
}

/// Inputs of one repair loop.
#[derive(Debug, Clone, Copy)]
pub struct RepairRequest<'a> {
    pub goal: &'a str,
    pub requirement: &'a Requirement,
    /// Last accepted snapshot.
    pub code: &'a CodeBase,
    pub max_attempts: u32,
    pub log_scope: Option<&'a str>,
}

/// Implement one requirement on top of `request.code`, returning the accepted snapshot.
///
/// Fails with [`BudgetExceededError`] after `max_attempts` rejected proposals.
/// Model, I/O and validator failures propagate immediately.
#[instrument(skip_all, fields(requirement = %request.requirement.content, max_attempts = request.max_attempts))]
pub fn implement_requirement<M: Model, F: FnMut(&AttemptReport<'_>)>(
    inferer: &mut Inferer<M>,
    validators: &ValidatorRegistry,
    request: &RepairRequest<'_>,
    mut on_attempt: F,
) -> Result<CodeBase> {
    let summary = summarize_codebase(request.code);
    let mut history: Vec<RejectedAttempt> = Vec::new();
    let mut attempt = 0u32;

    loop {
        let mode = if history.is_empty() {
            Mode::ThreeStage
        } else {
            Mode::Simple
        };
        let mut vars = PromptVars::new();
        vars.insert("goal".to_string(), request.goal.to_string());
        vars.insert(
            "requirement".to_string(),
            request.requirement.content.clone(),
        );
        vars.insert("code_base".to_string(), summary.clone());
        if !history.is_empty() {
            vars.insert("errors".to_string(), format_history(&history));
        }

        let inference = Request {
            phase: Phase::WriteCode,
            mode,
            vars,
            format_instructions: Some(OutputKind::CodeChange.format_instructions()),
            attempt,
            log_scope: request.log_scope.map(str::to_string),
        };
        let response = inferer.respond(&inference)?;

        let (change, outcome) = match parse_code_change(&response) {
            Ok(change) => {
                let outcome = check_candidate(validators, request.code, &change)?;
                (Some(change), outcome)
            }
            Err(err) => (
                None,
                Err(vec![FileError {
                    file: RESPONSE_ERROR_FILE.to_string(),
                    detail: err.to_string(),
                }]),
            ),
        };

        match outcome {
            Ok(candidate) => {
                on_attempt(&AttemptReport {
                    attempt,
                    change: change.as_ref(),
                    errors: &[],
                });
                info!(attempt, "requirement accepted");
                return Ok(candidate);
            }
            Err(errors) => {
                on_attempt(&AttemptReport {
                    attempt,
                    change: change.as_ref(),
                    errors: &errors,
                });
                warn!(attempt, errors = errors.len(), "attempt rejected");
                history.push(RejectedAttempt {
                    attempt,
                    change: change.as_ref().map(ToString::to_string),
                    errors,
                });
            }
        }

        attempt += 1;
        if attempt >= request.max_attempts {
            return Err(BudgetExceededError {
                requirement: request.requirement.content.clone(),
                attempts: attempt,
            }
            .into());
        }
    }
}

/// Apply `change` and validate every non-ignored file of the candidate.
///
/// Files that pass take the validator's formatting. The outer `Result`
/// carries validator failures; the inner one is the accepted candidate or
/// the problems to feed back.
fn check_candidate(
    validators: &ValidatorRegistry,
    code: &CodeBase,
    change: &CodeChange,
) -> Result<std::result::Result<CodeBase, Vec<FileError>>> {
    let mut candidate = match apply_change(code, change) {
        Ok(candidate) => candidate,
        Err(err) => {
            return Ok(Err(vec![FileError {
                file: err.file.clone(),
                detail: err.to_string(),
            }]));
        }
    };

    let names: Vec<String> = candidate.files().iter().map(|f| f.name.clone()).collect();
    let mut errors = Vec::new();
    for name in &names {
        let Some(validator) = validators.for_file(name)? else {
            continue;
        };
        let Some(file) = candidate.file_mut(name) else {
            continue;
        };
        match validator.check_and_format(&file.content())? {
            Validation::Valid { formatted } => file.overwrite(&formatted),
            Validation::Invalid { detail } => errors.push(FileError {
                file: name.clone(),
                detail,
            }),
        }
    }

    if errors.is_empty() {
        Ok(Ok(candidate))
    } else {
        Ok(Err(errors))
    }
}

/// Render errors for the retry prompt.
pub fn format_errors(errors: &[FileError]) -> String {
    errors
        .iter()
        .map(|err| format!("> {}:\n{}", err.file, err.detail))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render every rejected attempt, oldest first, for the retry prompt.
pub fn format_history(history: &[RejectedAttempt]) -> String {
    history
        .iter()
        .map(|rejected| {
            let mut section = format!("Attempt {}:\n", rejected.attempt + 1);
            if let Some(change) = &rejected.change {
                section.push_str(&format!("Proposed change:\n{change}\n\n"));
            }
            section.push_str(&format_errors(&rejected.errors));
            section
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
