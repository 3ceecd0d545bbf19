use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use vhl_core::errors::{ErrorInfo, LabError};
use vhl_core::serde::{from_json_slice, to_pretty_json_string};

use crate::manifest::{Manifest, MANIFEST_FILE};

/// Per-run directories holding artifacts and the manifest.
///
/// Every path handed out is built from a validated run id and artifact name,
/// so nothing outside `root/<run_id>/` is ever read or written.
#[derive(Debug, Clone)]
pub struct ProvenanceStore {
    root: PathBuf,
}

impl ProvenanceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for `run_id`, whether or not it exists yet.
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf, LabError> {
        ensure_component("run_id", run_id)?;
        Ok(self.root.join(run_id))
    }

    /// Claims a fresh directory for `run_id`.
    ///
    /// Returns `Ok(false)` when the directory already exists; at most one
    /// caller ever receives `Ok(true)` for a given id.
    pub fn reserve_run_dir(&self, run_id: &str) -> Result<bool, LabError> {
        let dir = self.run_dir(run_id)?;
        fs::create_dir_all(&self.root)
            .map_err(|err| LabError::io("store.create_dir", &self.root, err))?;
        match fs::create_dir(&dir) {
            Ok(()) => {
                debug!(run_id, path = %dir.display(), "run directory reserved");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(LabError::io("store.create_dir", &dir, err)),
        }
    }

    /// Drops a reserved directory that never received any artifact.
    pub fn release_run_dir(&self, run_id: &str) {
        let Ok(dir) = self.run_dir(run_id) else {
            return;
        };
        if let Err(err) = fs::remove_dir(&dir) {
            warn!(run_id, error = %err, "failed to release run directory");
        }
    }

    /// Creates the run directory; an existing one is reused as is.
    pub fn create_run_dir(&self, run_id: &str) -> Result<PathBuf, LabError> {
        let dir = self.run_dir(run_id)?;
        fs::create_dir_all(&dir).map_err(|err| LabError::io("store.create_dir", &dir, err))?;
        debug!(run_id, path = %dir.display(), "run directory ready");
        Ok(dir)
    }

    /// Writes `bytes` to `<run_dir>/<filename>`, replacing any previous file.
    pub fn write_artifact(
        &self,
        run_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, LabError> {
        let path = self.artifact_path(run_id, filename)?;
        fs::write(&path, bytes).map_err(|err| LabError::io("store.write_artifact", &path, err))?;
        Ok(path)
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf, LabError> {
        let json = to_pretty_json_string(manifest)?;
        self.write_artifact(&manifest.sim_id, MANIFEST_FILE, json.as_bytes())
    }

    /// Loads the manifest of `run_id`; `None` when the run is unknown.
    pub fn read(&self, run_id: &str) -> Result<Option<Manifest>, LabError> {
        let path = self.artifact_path(run_id, MANIFEST_FILE)?;
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|err| LabError::io("store.read_manifest", &path, err))?;
        from_json_slice(&bytes).map(Some)
    }

    /// Resolves `filename` inside the run directory of `run_id`.
    ///
    /// Both parts must be single plain path components.
    pub fn artifact_path(&self, run_id: &str, filename: &str) -> Result<PathBuf, LabError> {
        ensure_component("filename", filename)?;
        Ok(self.run_dir(run_id)?.join(filename))
    }

    /// Raw bytes of an artifact; `None` when the run or file is missing.
    pub fn read_artifact(&self, run_id: &str, filename: &str) -> Result<Option<Vec<u8>>, LabError> {
        let path = self.artifact_path(run_id, filename)?;
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|err| LabError::io("store.read_artifact", &path, err))
    }

    /// Ids of all runs that have a manifest, sorted.
    pub fn list_runs(&self) -> Result<Vec<String>, LabError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&self.root).map_err(|err| LabError::io("store.list", &self.root, err))?;
        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| LabError::io("store.list", &self.root, err))?;
            let path = entry.path();
            if !path.join(MANIFEST_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                runs.push(name.to_string());
            }
        }
        runs.sort();
        Ok(runs)
    }
}

/// Accepts only a single normal path component.
pub fn ensure_component(field: &str, value: &str) -> Result<(), LabError> {
    let mut components = Path::new(value).components();
    let valid = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !value.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(LabError::Validation(
            ErrorInfo::new(
                "store.path_traversal",
                format!("`{value}` is not a plain file name"),
            )
            .with_context("field", field)
            .with_hint("use a name without path separators or `..`"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_reject_traversal() {
        for bad in ["", ".", "..", "../x", "a/b", "/etc/passwd", "a\\b"] {
            let err = ensure_component("run_id", bad).expect_err(bad);
            assert_eq!(err.info().code, "store.path_traversal");
        }
        ensure_component("run_id", "20240101_abcdef12").expect("plain id");
        ensure_component("filename", "merged.cir").expect("plain file");
    }

    #[test]
    fn reservation_is_granted_once() {
        let dir = tempfile::tempdir().expect("tmp");
        let store = ProvenanceStore::new(dir.path().join("runs"));
        assert!(store.reserve_run_dir("r1").expect("first"));
        assert!(!store.reserve_run_dir("r1").expect("second"));
        store.release_run_dir("r1");
        assert!(!dir.path().join("runs/r1").exists());
    }
}
