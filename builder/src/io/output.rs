//! Materializes accepted codebases under `<output_dir>/run_<n>/<directory>/`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::codebase::CodeBase;
use crate::io::run_registry::run_dir_name;

/// Directory holding one run's generated code.
pub fn run_output_dir(output_dir: &Path, run_no: u32) -> PathBuf {
    output_dir.join(run_dir_name(run_no))
}

/// Write every file of `code`, overwriting previous contents.
///
/// Files land in `run_dir/<code.directory()>/<file.name>`. Names that would
/// escape that directory are rejected.
pub fn write_codebase(run_dir: &Path, code: &CodeBase) -> Result<PathBuf> {
    let root = match code.directory() {
        Some(directory) => run_dir.join(checked_relative(directory)?),
        None => run_dir.to_path_buf(),
    };
    for file in code.files() {
        let path = root.join(checked_relative(&file.name)?);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        fs::write(&path, file.content()).with_context(|| format!("write {}", path.display()))?;
    }
    debug!(root = %root.display(), files = code.files().len(), "codebase written");
    Ok(root)
}

fn checked_relative(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let normal = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if name.is_empty() || !normal {
        return Err(anyhow!("refusing to write outside the output directory: '{name}'"));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codebase::CodeFile;

    #[test]
    fn writes_files_below_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run_dir = run_output_dir(temp.path(), 2);
        let code = CodeBase::new(
            vec![
                CodeFile::from_content("app.py", "# app\n\ndef main():"),
                CodeFile::from_content("static/index.html", "<html></html>"),
            ],
            Some("project".to_string()),
        )
        .expect("base");

        let root = write_codebase(&run_dir, &code).expect("write");
        assert!(root.ends_with("run_2/project"));
        assert_eq!(
            fs::read_to_string(root.join("app.py")).expect("read"),
            "# app\n\ndef main():"
        );
        assert!(root.join("static").join("index.html").is_file());
    }

    #[test]
    fn rewrite_overwrites_previous_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = CodeBase::new(vec![CodeFile::from_content("a.py", "x = 1\ny = 2")], None)
            .expect("first");
        let second =
            CodeBase::new(vec![CodeFile::from_content("a.py", "x = 3")], None).expect("second");

        write_codebase(temp.path(), &first).expect("first write");
        write_codebase(temp.path(), &second).expect("second write");
        assert_eq!(
            fs::read_to_string(temp.path().join("a.py")).expect("read"),
            "x = 3"
        );
    }

    #[test]
    fn escaping_names_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        for name in ["../evil.py", "/etc/passwd"] {
            let code =
                CodeBase::new(vec![CodeFile::from_content(name, "x")], None).expect("base");
            assert!(write_codebase(temp.path(), &code).is_err(), "{name}");
        }
    }
}
