//! Self-repairing code generation agent.
//!
//! Turns a one-line goal into a small project: the model plans the work,
//! lays out code and test skeletons, then implements each requirement as
//! line-numbered edits that must pass syntax validation before they are kept.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use builder::build::{BuildEvent, BuildStop, run_build};
use builder::core::change::CodeChange;
use builder::core::codebase::CodeBase;
use builder::core::patch::apply_change;
use builder::exit_codes;
use builder::io::cache::ResponseCache;
use builder::io::config::{init_config, load_config};
use builder::io::validators::ValidatorRegistry;
use builder::logging;

#[derive(Parser)]
#[command(
    name = "builder",
    version,
    about = "Cached, self-repairing code generation agent"
)]
struct Cli {
    /// Configuration file (defaults apply when it does not exist).
    #[arg(long, global = true, default_value = "builder.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default configuration file if it is missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Build a project for GOAL.
    Build {
        /// What the user wants built.
        goal: String,
    },
    /// Apply a code change (JSON) to a codebase (JSON) and print the result.
    Apply {
        #[arg(long)]
        base: PathBuf,
        #[arg(long)]
        change: PathBuf,
    },
    /// Remove every cached model response.
    CacheClear,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Build { goal } => cmd_build(&cli.config, &goal),
        Command::Apply { base, change } => cmd_apply(&base, &change),
        Command::CacheClear => cmd_cache_clear(&cli.config),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if init_config(config_path, force)? {
        println!("wrote {}", config_path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", config_path.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_build(config_path: &Path, goal: &str) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let validators = ValidatorRegistry::from_config(&cfg.validation);
    let outcome = run_build(
        &cfg,
        Path::new("."),
        cfg.model(),
        &validators,
        goal,
        print_event,
    )?;

    println!(
        "run {}: {} of {} requirements implemented, output in {}",
        outcome.run_no,
        outcome.requirements_done,
        outcome.description.requirements.len(),
        outcome.output_dir.display()
    );
    match outcome.stop {
        BuildStop::Complete => Ok(exit_codes::OK),
        BuildStop::BudgetExceeded {
            requirement,
            attempts,
        } => {
            eprintln!("gave up on '{requirement}' after {attempts} attempts");
            Ok(exit_codes::BUDGET_EXCEEDED)
        }
    }
}

fn print_event(event: &BuildEvent<'_>) {
    match event {
        BuildEvent::RunStarted { run_no } => println!(">>> run {run_no}"),
        BuildEvent::PhaseFinished { phase, output } => {
            println!(">>> {}\n{}\n", phase.template_name(), output.trim_end());
        }
        BuildEvent::CodebaseWritten { directory, path } => {
            println!("> wrote {directory} to {}", path.display());
        }
        BuildEvent::RequirementStarted {
            index,
            total,
            requirement,
        } => println!(">>> requirement {}/{}: {}", index + 1, total, requirement.content),
        BuildEvent::Attempt { report, .. } => {
            if let Some(change) = report.change {
                println!("> attempt {}: proposed change\n{}", report.attempt + 1, change);
            }
            if report.errors.is_empty() {
                println!("> accepted");
            }
            for err in report.errors {
                println!("> error in {}:\n{}", err.file, err.detail);
            }
        }
    }
}

fn cmd_apply(base_path: &Path, change_path: &Path) -> Result<i32> {
    let base: CodeBase = read_json(base_path)?;
    let change: CodeChange = read_json(change_path)?;
    let next = apply_change(&base, &change)?;
    let mut payload = serde_json::to_string_pretty(&next).context("serialize codebase")?;
    payload.push('\n');
    print!("{payload}");
    Ok(exit_codes::OK)
}

fn cmd_cache_clear(config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let mut cache = ResponseCache::open(&cfg.paths.cache_file)?;
    let removed = cache.len();
    cache.clear()?;
    println!("removed {removed} cached responses");
    Ok(exit_codes::OK)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}
