//! Raw model outputs per reasoning stage, under `<log_dir>/run_<n>/`.
//!
//! These files are product artifacts: always written when a stage log is
//! configured, unaffected by `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::{InferenceStep, Phase};
use crate::io::run_registry::run_dir_name;

#[derive(Debug, Clone)]
pub struct StageLog {
    dir: PathBuf,
}

impl StageLog {
    pub fn new(log_dir: &Path, run_no: u32) -> Self {
        Self {
            dir: log_dir.join(run_dir_name(run_no)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `[<scope>/]<phase><step>__attempt_<k>.txt` below the run directory.
    pub fn path_for(
        &self,
        scope: Option<&str>,
        phase: Phase,
        step: InferenceStep,
        attempt: u32,
    ) -> PathBuf {
        let dir = match scope {
            Some(scope) => self.dir.join(scope),
            None => self.dir.clone(),
        };
        dir.join(format!(
            "{}{}__attempt_{attempt}.txt",
            phase.log_slug(),
            step.log_slug()
        ))
    }

    pub fn write(
        &self,
        scope: Option<&str>,
        phase: Phase,
        step: InferenceStep,
        attempt: u32,
        content: &str,
    ) -> Result<PathBuf> {
        let path = self.path_for(scope, phase, step, attempt);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create stage log dir {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), bytes = content.len(), "stage output logged");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = StageLog::new(temp.path(), 3);

        assert!(
            log.path_for(None, Phase::Understand, InferenceStep::Ideate, 0)
                .ends_with("run_3/1_understand__a_ideation__attempt_0.txt")
        );
        assert!(
            log.path_for(
                Some("requirement_2"),
                Phase::WriteCode,
                InferenceStep::Resolve,
                1
            )
            .ends_with("run_3/requirement_2/5_write_code__c_resolution__attempt_1.txt")
        );
    }

    #[test]
    fn write_creates_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = StageLog::new(&temp.path().join("cache"), 1);

        let path = log
            .write(
                Some("requirement_1"),
                Phase::WriteCode,
                InferenceStep::Critique,
                2,
                "looks wrong",
            )
            .expect("write");
        assert_eq!(fs::read_to_string(path).expect("read"), "looks wrong");
    }
}
