//! End-to-end build pipeline for `builder build`.
//!
//! understand → architecture → code skeleton → test skeleton → one repair
//! loop per requirement. Skeletons and every accepted project snapshot are
//! written under the run's output directory as soon as they exist.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::codebase::CodeBase;
use crate::core::parse::{OutputKind, parse_code_skeleton, parse_project_description};
use crate::core::project::{CodeSkeleton, ProjectDescription, Requirement};
use crate::core::types::{Mode, Phase};
use crate::inference::{Inferer, Request};
use crate::io::cache::ResponseCache;
use crate::io::config::BuilderConfig;
use crate::io::model::Model;
use crate::io::output::{run_output_dir, write_codebase};
use crate::io::prompt::{PromptLibrary, PromptVars};
use crate::io::run_registry::RunRegistry;
use crate::io::stage_log::StageLog;
use crate::io::validators::ValidatorRegistry;
use crate::repair::{AttemptReport, BudgetExceededError, RepairRequest, implement_requirement};

pub const PROJECT_DIR: &str = "project";
pub const TEST_DIR: &str = "test";

/// Progress notifications emitted while a build runs.
#[derive(Debug)]
pub enum BuildEvent<'a> {
    RunStarted {
        run_no: u32,
    },
    PhaseFinished {
        phase: Phase,
        output: &'a str,
    },
    CodebaseWritten {
        directory: &'a str,
        path: &'a Path,
    },
    RequirementStarted {
        index: usize,
        total: usize,
        requirement: &'a Requirement,
    },
    Attempt {
        index: usize,
        report: &'a AttemptReport<'a>,
    },
}

/// Reason why `run_build` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStop {
    /// Every requirement was implemented.
    Complete,
    /// A requirement ran out of attempts; later requirements were not tried.
    BudgetExceeded { requirement: String, attempts: u32 },
}

/// Summary of a build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub run_no: u32,
    pub output_dir: PathBuf,
    pub description: ProjectDescription,
    pub project: CodeBase,
    pub tests: CodeBase,
    pub requirements_done: usize,
    pub stop: BuildStop,
}

/// Resolve a configured path against the working root.
fn resolve(root: &Path, path: &Path) -> PathBuf {
    root.join(path)
}

/// Run the whole pipeline for `goal`.
///
/// Configured paths are resolved against `root`. A parse failure in a
/// planning phase aborts the build; a requirement that exhausts its budget
/// ends it with [`BuildStop::BudgetExceeded`].
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_build<M: Model, F: FnMut(&BuildEvent<'_>)>(
    cfg: &BuilderConfig,
    root: &Path,
    model: M,
    validators: &ValidatorRegistry,
    goal: &str,
    mut on_event: F,
) -> Result<BuildOutcome> {
    let mut registry = RunRegistry::load(&resolve(root, &cfg.paths.runs_file))?;
    let run = registry.start_run()?;
    on_event(&BuildEvent::RunStarted { run_no: run.run_no });

    let cache = ResponseCache::open(&resolve(root, &cfg.paths.cache_file))?;
    let stage_log = StageLog::new(&resolve(root, &cfg.paths.log_dir), run.run_no);
    let mut inferer = Inferer::new(model, cache, PromptLibrary::new()?).with_stage_log(stage_log);
    let run_dir = run_output_dir(&resolve(root, &cfg.paths.output_dir), run.run_no);

    let mut vars = PromptVars::new();
    vars.insert("goal".to_string(), goal.to_string());

    let raw = ask(
        &mut inferer,
        Phase::Understand,
        &vars,
        Some(OutputKind::ProjectDescription),
        &mut on_event,
    )?;
    let description = parse_project_description(&raw).context("parse project description")?;
    info!(
        requirements = description.requirements.len(),
        "project understood"
    );
    vars.insert(
        "project_description".to_string(),
        description.to_prompt_text(),
    );

    let architecture = ask(
        &mut inferer,
        Phase::Architecture,
        &vars,
        None,
        &mut on_event,
    )?;
    vars.insert("architecture".to_string(), architecture);

    let raw = ask(
        &mut inferer,
        Phase::StructureCode,
        &vars,
        Some(OutputKind::CodeSkeleton),
        &mut on_event,
    )?;
    let code_skeleton = parse_code_skeleton(&raw).context("parse code skeleton")?;
    let mut project = materialize(&code_skeleton, PROJECT_DIR, &run_dir, &mut on_event)?;
    vars.insert("code_skeleton".to_string(), code_skeleton.to_prompt_text());

    let raw = ask(
        &mut inferer,
        Phase::StructureTests,
        &vars,
        Some(OutputKind::CodeSkeleton),
        &mut on_event,
    )?;
    let test_skeleton = parse_code_skeleton(&raw).context("parse test skeleton")?;
    let tests = materialize(&test_skeleton, TEST_DIR, &run_dir, &mut on_event)?;

    let total = description.requirements.len();
    let mut requirements_done = 0usize;
    let mut stop = BuildStop::Complete;
    for (index, requirement) in description.requirements.iter().enumerate() {
        on_event(&BuildEvent::RequirementStarted {
            index,
            total,
            requirement,
        });
        let scope = format!("requirement_{}", index + 1);
        let request = RepairRequest {
            goal,
            requirement,
            code: &project,
            max_attempts: cfg.max_attempts,
            log_scope: Some(scope.as_str()),
        };
        let result = implement_requirement(&mut inferer, validators, &request, |report| {
            on_event(&BuildEvent::Attempt { index, report })
        });
        match result {
            Ok(accepted) => {
                project = accepted;
                let path = write_codebase(&run_dir, &project)?;
                on_event(&BuildEvent::CodebaseWritten {
                    directory: PROJECT_DIR,
                    path: &path,
                });
                requirements_done += 1;
            }
            Err(err) => {
                if let Some(budget) = err.downcast_ref::<BudgetExceededError>() {
                    warn!(
                        requirement = %budget.requirement,
                        attempts = budget.attempts,
                        "stopping build"
                    );
                    stop = BuildStop::BudgetExceeded {
                        requirement: budget.requirement.clone(),
                        attempts: budget.attempts,
                    };
                    break;
                }
                return Err(err);
            }
        }
    }

    info!(run_no = run.run_no, requirements_done, "build finished");
    Ok(BuildOutcome {
        run_no: run.run_no,
        output_dir: run_dir,
        description,
        project,
        tests,
        requirements_done,
        stop,
    })
}

fn ask<M: Model, F: FnMut(&BuildEvent<'_>)>(
    inferer: &mut Inferer<M>,
    phase: Phase,
    vars: &PromptVars,
    output: Option<OutputKind>,
    on_event: &mut F,
) -> Result<String> {
    let mut request = Request::new(phase, Mode::ThreeStage, vars.clone());
    if let Some(kind) = output {
        request = request.with_format_instructions(kind.format_instructions());
    }
    let response = inferer.respond(&request)?;
    on_event(&BuildEvent::PhaseFinished {
        phase,
        output: &response,
    });
    Ok(response)
}

fn materialize<F: FnMut(&BuildEvent<'_>)>(
    skeleton: &CodeSkeleton,
    directory: &str,
    run_dir: &Path,
    on_event: &mut F,
) -> Result<CodeBase> {
    let code = CodeBase::from_skeleton(skeleton, Some(directory.to_string()))
        .with_context(|| format!("build {directory} codebase from skeleton"))?;
    let path = write_codebase(run_dir, &code)?;
    on_event(&BuildEvent::CodebaseWritten {
        directory,
        path: &path,
    });
    Ok(code)
}
