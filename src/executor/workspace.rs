//! Instance workspace management
//!
//! Each instance owns one directory under the workspace root:
//!
//! - `<root>/<job>` for unparameterized jobs
//! - `<root>/<job>/<value>` for parameterized jobs
//!
//! Segments are percent-encoded, so `a/b` and `a_b` never share a
//! directory.
//!
//! Directories are reused across runs unless the job sets `clean_repo`.

use crate::job::{ExecutionError, JobInstance};
use std::fs;
use std::path::{Path, PathBuf};

/// Creates and cleans instance workspaces
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Creates a manager rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an instance's workspace lives at
    #[must_use]
    pub fn path_for(&self, instance: &JobInstance) -> PathBuf {
        self.root.join(instance.workspace_dir())
    }

    /// Creates the workspace, wiping it first when `clean_repo` is set
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Workspace`] if the directory cannot be
    /// removed or created.
    pub fn prepare(&self, instance: &JobInstance) -> Result<PathBuf, ExecutionError> {
        let path = self.path_for(instance);

        if instance.clean_repo && path.exists() {
            tracing::debug!(instance = %instance.id, path = %path.display(), "Cleaning workspace");
            fs::remove_dir_all(&path).map_err(|e| {
                ExecutionError::Workspace(format!("cannot clean {}: {e}", path.display()))
            })?;
        }

        fs::create_dir_all(&path).map_err(|e| {
            ExecutionError::Workspace(format!("cannot create {}: {e}", path.display()))
        })?;

        Ok(path)
    }
}
