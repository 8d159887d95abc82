//! Append-only registry of build runs (`runs.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    pub run_no: u32,
    /// Local start time, `%Y-%m-%dT%H-%M`.
    pub started_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct RunsFile {
    runs: Vec<RunRecord>,
}

/// Persisted list of runs. Run numbers start at 1 and only grow.
#[derive(Debug)]
pub struct RunRegistry {
    path: PathBuf,
    runs: Vec<RunRecord>,
}

impl RunRegistry {
    /// Load the registry at `path`; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let runs = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("read run registry {}", path.display()))?;
            let file: RunsFile = serde_json::from_str(&contents)
                .with_context(|| format!("parse run registry {}", path.display()))?;
            file.runs
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), runs = runs.len(), "run registry loaded");
        Ok(Self {
            path: path.to_path_buf(),
            runs,
        })
    }

    /// Highest run number so far; `0` before the first run.
    pub fn current_run_no(&self) -> u32 {
        self.runs.iter().map(|run| run.run_no).max().unwrap_or(0)
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    /// Record a new run starting now and persist the registry.
    pub fn start_run(&mut self) -> Result<RunRecord> {
        self.start_run_at(Local::now().naive_local())
    }

    pub fn start_run_at(&mut self, now: NaiveDateTime) -> Result<RunRecord> {
        let record = RunRecord {
            run_no: self.current_run_no() + 1,
            started_at: now.format(TIMESTAMP_FORMAT).to_string(),
        };
        self.runs.push(record.clone());
        self.persist()?;
        info!(run_no = record.run_no, started_at = %record.started_at, "run started");
        Ok(record)
    }

    fn persist(&self) -> Result<()> {
        let file = RunsFile {
            runs: self.runs.clone(),
        };
        let mut buf = serde_json::to_string_pretty(&file).context("serialize run registry")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }
}

/// Directory name used for a run's logs and outputs.
pub fn run_dir_name(run_no: u32) -> String {
    format!("run_{run_no}")
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run registry {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace run registry {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .expect("valid time")
    }

    #[test]
    fn first_run_is_number_one() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut registry = RunRegistry::load(&temp.path().join("runs.json")).expect("load");
        assert_eq!(registry.current_run_no(), 0);

        let record = registry.start_run_at(at(14, 5)).expect("start");
        assert_eq!(record.run_no, 1);
        assert_eq!(record.started_at, "2024-03-09T14-05");
        assert_eq!(registry.current_run_no(), 1);
    }

    #[test]
    fn runs_append_and_persist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("runs.json");
        {
            let mut registry = RunRegistry::load(&path).expect("load");
            registry.start_run_at(at(9, 0)).expect("first");
            registry.start_run_at(at(9, 30)).expect("second");
        }

        let mut reloaded = RunRegistry::load(&path).expect("reload");
        assert_eq!(reloaded.runs().len(), 2);
        assert_eq!(reloaded.current_run_no(), 2);
        assert_eq!(reloaded.start_run_at(at(10, 0)).expect("third").run_no, 3);
    }

    #[test]
    fn registry_file_format_is_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("runs.json");
        let mut registry = RunRegistry::load(&path).expect("load");
        registry.start_run_at(at(8, 7)).expect("start");

        let contents = fs::read_to_string(&path).expect("read");
        let expected = "{\n  \"runs\": [\n    {\n      \"run_no\": 1,\n      \"started_at\": \"2024-03-09T08-07\"\n    }\n  ]\n}\n";
        assert_eq!(contents, expected);
    }

    #[test]
    fn run_dir_name_is_prefixed() {
        assert_eq!(run_dir_name(4), "run_4");
    }
}
