//! Per-run working directory tree.
//!
//! ```text
//! {root}/
//!   step1_input/    formatter output, stage-1 input
//!   step1_output/   stage-1 artifact
//!   step2_input/    candidate pairs, stage-2 input
//!   step2_output/   stage-2 artifact
//! ```
//!
//! The tree is deleted and recreated at the start of every run; nothing
//! from a previous run is ever read. With `namespace_runs` each run gets
//! `{work_dir}/{run_id}` so concurrent runs do not collide, and setup
//! prunes older run subtrees down to a retention count. Without it,
//! callers must serialize runs.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use uuid::Uuid;

use super::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWorkspace {
    pub root: PathBuf,
    pub step1_input: PathBuf,
    pub step1_output: PathBuf,
    pub step2_input: PathBuf,
    pub step2_output: PathBuf,
}

impl RunWorkspace {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            step1_input: root.join("step1_input"),
            step1_output: root.join("step1_output"),
            step2_input: root.join("step2_input"),
            step2_output: root.join("step2_output"),
            root,
        }
    }

    /// Layout for a run: `work_dir/run_id` when namespaced, else `work_dir`.
    pub fn for_run(work_dir: &Path, run_id: &Uuid, namespaced: bool) -> Self {
        if namespaced {
            Self::at(work_dir.join(run_id.to_string()))
        } else {
            Self::at(work_dir)
        }
    }

    fn dirs(&self) -> [&Path; 4] {
        [
            &self.step1_input,
            &self.step1_output,
            &self.step2_input,
            &self.step2_output,
        ]
    }

    /// Delete any existing tree at `root` and create a fresh one.
    pub fn reset(&self) -> Result<(), PipelineError> {
        tracing::info!(path = %self.root.display(), "Setting up working directory");

        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).map_err(|source| PipelineError::Workspace {
                path: self.root.clone(),
                source,
            })?;
        }
        for dir in self.dirs() {
            std::fs::create_dir_all(dir).map_err(|source| PipelineError::Workspace {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Delete run subtrees in `work_dir` other than this one, keeping the
    /// `keep` most recently modified. Only directories named by a run id
    /// are considered. Returns how many were removed.
    pub fn prune_previous(&self, work_dir: &Path, keep: usize) -> Result<usize, PipelineError> {
        let workspace_err = |source| PipelineError::Workspace {
            path: work_dir.to_path_buf(),
            source,
        };

        let mut runs: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(work_dir).map_err(workspace_err)? {
            let entry = entry.map_err(workspace_err)?;
            let path = entry.path();
            if path == self.root || !path.is_dir() {
                continue;
            }
            let is_run = entry
                .file_name()
                .to_str()
                .is_some_and(|name| Uuid::parse_str(name).is_ok());
            if !is_run {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            runs.push((modified, path));
        }

        // Newest first
        runs.sort_by(|a, b| b.0.cmp(&a.0));

        let mut removed = 0;
        for (_, path) in runs.into_iter().skip(keep) {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove old run directory"
                ),
            }
        }

        if removed > 0 {
            tracing::info!(removed, kept = keep, "Pruned old run directories");
        }
        Ok(removed)
    }
}
