// crates/session/src/persist.rs
//! Session persistence: a small JSON file in the user config dir,
//! holding exactly what survives a restart (token + identity). The
//! provider authorization slots are re-fetched, never persisted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub token: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    /// Default location under the user config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mailshift").join("session.json"))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session. A missing file is simply no
    /// session; a corrupt file is logged and treated the same.
    pub fn load(&self) -> Option<PersistedSession> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read session file");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt session file, ignoring");
                None
            }
        }
    }

    pub fn save(&self, session: &PersistedSession) -> Result<(), SessionError> {
        let persist_err = |source| SessionError::Persist {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }
        let json = serde_json::to_string_pretty(session).expect("session serializes");
        fs::write(&self.path, json).map_err(persist_err)
    }

    /// Erase the persisted copy. Already gone is fine.
    pub fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Persist {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
