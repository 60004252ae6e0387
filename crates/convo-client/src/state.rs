//! Persisted session identity.
//!
//! The server hands out a session id in its `session_init` event. It is kept
//! alongside the teammate it belongs to and resent with the next request.
//! Switching teammate drops it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use convo_settings::{ClientSettings, convo_home};

/// Errors reading or writing the state file.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Filesystem error.
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed state file.
    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session identity carried between invocations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    /// Teammate the session belongs to.
    pub teammate: Option<String>,
    /// Server-assigned session id.
    pub session_id: Option<String>,
}

impl SessionState {
    /// Select `teammate`. Returns `true` if this is a switch, in which case
    /// the stored session id is dropped.
    pub fn for_teammate(&mut self, teammate: &str) -> bool {
        if self.teammate.as_deref() == Some(teammate) {
            return false;
        }
        let switched = self.teammate.is_some();
        self.teammate = Some(teammate.to_owned());
        self.session_id = None;
        switched
    }
}

/// JSON file holding a [`SessionState`].
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `state_path`, or `~/.convo/state.json` when unset.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        match &settings.state_path {
            Some(path) => Self::new(path),
            None => Self::new(convo_home().join("state.json")),
        }
    }

    /// File location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state. A missing file yields the default.
    pub fn load(&self) -> Result<SessionState, StateError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state file");
            return Ok(SessionState::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the state, creating the parent directory if needed.
    pub fn save(&self, state: &SessionState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }

    /// Delete the state file. Missing files are fine.
    pub fn clear(&self) -> Result<(), StateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
