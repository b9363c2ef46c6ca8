//! Per-run working directory for file-based databases.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use uuid::Uuid;

use super::error::ProvisionError;

const FALLBACK_FILE_NAME: &str = "database.db";

/// A directory unique to one orchestrator run. Fixtures are copied here so
/// repeated or parallel runs never write to the shared original.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunWorkspace {
    root: Utf8PathBuf,
}

impl RunWorkspace {
    /// Chooses `<base>/run-<uuid>` without touching the file system.
    #[must_use]
    pub fn new(base: &Utf8Path) -> Self {
        Self {
            root: base.join(format!("run-{}", Uuid::new_v4())),
        }
    }

    /// Root of this run's directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Copies `fixture` into the workspace and returns the copy's path.
    ///
    /// A missing fixture is not an error: the returned path does not exist
    /// yet and the engine creates an empty database there.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Workspace`] when the directory cannot be
    /// created or the copy fails.
    pub fn working_copy(&self, fixture: &Utf8Path) -> Result<Utf8PathBuf, ProvisionError> {
        let file_name = fixture.file_name().unwrap_or(FALLBACK_FILE_NAME);
        let destination = self.root.join(file_name);
        let workspace_error = |path: &Utf8Path, err: std::io::Error| ProvisionError::Workspace {
            path: path.to_path_buf(),
            message: err.to_string(),
        };

        Dir::create_ambient_dir_all(&self.root, ambient_authority())
            .map_err(|err| workspace_error(self.root.as_path(), err))?;

        if !fixture.is_file() {
            tracing::debug!(%fixture, "fixture missing; engine will create the database");
            return Ok(destination);
        }

        let source_parent = match fixture.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        let source_dir = Dir::open_ambient_dir(source_parent, ambient_authority())
            .map_err(|err| workspace_error(source_parent, err))?;
        let target_dir = Dir::open_ambient_dir(&self.root, ambient_authority())
            .map_err(|err| workspace_error(self.root.as_path(), err))?;
        source_dir
            .copy(file_name, &target_dir, file_name)
            .map_err(|err| workspace_error(destination.as_path(), err))?;

        Ok(destination)
    }
}
