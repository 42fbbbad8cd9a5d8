//! Per-invocation scratch files for the execution harness.
//!
//! A [`Workspace`] owns a uniquely named file set inside a shared scratch
//! directory: the solution module, the synthesized test entry and the merged
//! output capture. Names embed a UUID v4 and files are created exclusively, so
//! concurrent invocations never share or overwrite each other's files. All
//! files are removed when the workspace is dropped, which covers early returns,
//! errors and unwinding alike.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct Workspace {
    id: String,
    dir: PathBuf,
    module_name: String,
    solution_path: PathBuf,
    entry_path: PathBuf,
    capture_path: PathBuf,
}

impl Workspace {
    /// Reserve a new workspace under `scratch_dir` (created if missing).
    ///
    /// Nothing is written until one of the `write_*` methods is called.
    pub fn create(scratch_dir: &Path) -> Result<Self> {
        fs::create_dir_all(scratch_dir)
            .with_context(|| format!("create scratch dir {}", scratch_dir.display()))?;

        // Python module names must not start with a digit.
        let id = format!("m_{}", Uuid::new_v4().simple());
        let module_name = format!("{id}_solution");
        let workspace = Self {
            dir: scratch_dir.to_path_buf(),
            solution_path: scratch_dir.join(format!("{module_name}.py")),
            entry_path: scratch_dir.join(format!("{id}_test.py")),
            capture_path: scratch_dir.join(format!("{id}_output.log")),
            module_name,
            id,
        };
        debug!(id = %workspace.id, dir = %workspace.dir.display(), "workspace reserved");
        Ok(workspace)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Importable module name of the materialized solution.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn entry_path(&self) -> &Path {
        &self.entry_path
    }

    pub fn write_solution(&self, source: &str) -> Result<()> {
        let mut contents = source.to_string();
        contents.push('\n');
        write_new(&self.solution_path, &contents)
    }

    pub fn write_entry(&self, contents: &str) -> Result<()> {
        write_new(&self.entry_path, contents)
    }

    /// Create the capture file the child process writes its merged output to.
    pub fn create_capture(&self) -> Result<File> {
        File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.capture_path)
            .with_context(|| format!("create capture file {}", self.capture_path.display()))
    }

    fn owned_files(&self) -> [&Path; 3] {
        [&self.solution_path, &self.entry_path, &self.capture_path]
    }

    fn remove_all(&self) {
        for path in self.owned_files() {
            remove_if_present(path);
        }
        // Bytecode is disabled for the child, but an interpreter that ignores the flag
        // would leave `__pycache__/<module>.*.pyc` behind.
        let cache_dir = self.dir.join("__pycache__");
        let Ok(entries) = fs::read_dir(&cache_dir) else {
            return;
        };
        let prefix = format!("{}.", self.module_name);
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                remove_if_present(&entry.path());
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove_all();
        debug!(id = %self.id, "workspace removed");
    }
}

fn write_new(path: &Path, contents: &str) -> Result<()> {
    let mut file = File::options()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("create {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), err = %e, "failed to remove workspace file"),
    }
}
