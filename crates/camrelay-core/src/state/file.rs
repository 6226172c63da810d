use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use camrelay_model::RunState;

use crate::{error::StoreError, state::StateBackend};

/// JSON file backend.
///
/// Writes go to a sibling temp file that is renamed over the target. A bare
/// `true` or `false` body is accepted on read for hand-edited files.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "run-state".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn load(&self) -> Result<Option<RunState>, StoreError> {
        let body = match fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match body.trim() {
            "" => Ok(None),
            "true" => Ok(Some(RunState::new(true))),
            "false" => Ok(Some(RunState::new(false))),
            json => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| StoreError::Malformed {
                    backend: "file",
                    reason: e.to_string(),
                }),
        }
    }

    fn save(&self, state: &RunState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(state).map_err(|e| StoreError::Malformed {
            backend: "file",
            reason: e.to_string(),
        })?;

        let tmp = self.tmp_path();
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
