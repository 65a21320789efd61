//! Persistent storage for the auth token and cached user name.
//!
//! Only `save` reports failures. Reads and removal degrade to `None` / no-op
//! so that every authenticated request can consult the store without
//! having to handle storage problems.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    user_data: Option<UserData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserData {
    name: String,
}

#[derive(Debug)]
enum Backing {
    File(PathBuf),
    Memory(Mutex<StoredSession>),
}

/// Auth token store
#[derive(Debug)]
pub struct TokenStore {
    backing: Backing,
}

impl TokenStore {
    /// Store backed by a JSON file (usually `~/.ragdesk/session.json`)
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    /// Store kept in memory only
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(StoredSession::default())),
        }
    }

    /// Persist a token together with the user's display name
    pub fn save(&self, token: &str, name: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(Error::Validation("No valid token was provided".to_string()));
        }

        let session = StoredSession {
            auth_token: Some(token.to_string()),
            user_data: Some(UserData {
                name: name.to_string(),
            }),
        };

        match &self.backing {
            Backing::File(path) => {
                write_session(path, &session)?;
                info!("Saved session to {:?}", path);
            }
            Backing::Memory(cell) => {
                if let Ok(mut guard) = cell.lock() {
                    *guard = session;
                }
            }
        }
        Ok(())
    }

    /// The stored token, if any
    pub fn get(&self) -> Option<String> {
        self.load()
            .and_then(|s| s.auth_token)
            .filter(|t| !t.is_empty())
    }

    /// The cached user name, if any
    pub fn username(&self) -> Option<String> {
        self.load().and_then(|s| s.user_data).map(|u| u.name)
    }

    /// Forget the token and user name
    pub fn remove(&self) {
        match &self.backing {
            Backing::File(path) => {
                if let Err(e) = std::fs::remove_file(path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        debug!("Could not remove session file {:?}: {}", path, e);
                    }
                }
            }
            Backing::Memory(cell) => {
                if let Ok(mut guard) = cell.lock() {
                    *guard = StoredSession::default();
                }
            }
        }
    }

    fn load(&self) -> Option<StoredSession> {
        match &self.backing {
            Backing::File(path) => read_session(path),
            Backing::Memory(cell) => cell.lock().ok().map(|guard| guard.clone()),
        }
    }
}

fn read_session(path: &Path) -> Option<StoredSession> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not read session file {:?}: {}", path, e);
            }
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(session) => Some(session),
        Err(e) => {
            debug!("Ignoring malformed session file {:?}: {}", path, e);
            None
        }
    }
}

fn write_session(path: &Path, session: &StoredSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(session)?;
    std::fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::file(tmp.path().join("session.json"));

        store.save("jwt-token", "Ana").unwrap();
        assert_eq!(store.get().as_deref(), Some("jwt-token"));
        assert_eq!(store.username().as_deref(), Some("Ana"));
    }

    #[test]
    fn test_empty_token_is_rejected() {
        let store = TokenStore::in_memory();
        let err = store.save("  ", "Ana").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_remove_clears_everything() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::file(tmp.path().join("session.json"));
        store.save("jwt-token", "Ana").unwrap();

        store.remove();
        assert_eq!(store.get(), None);
        assert_eq!(store.username(), None);

        // removing twice is harmless
        store.remove();
    }

    #[test]
    fn test_malformed_file_reads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = TokenStore::file(&path);
        assert_eq!(store.get(), None);
        assert_eq!(store.username(), None);
    }

    #[test]
    fn test_in_memory_store() {
        let store = TokenStore::in_memory();
        assert_eq!(store.get(), None);
        store.save("abc", "Luis").unwrap();
        assert_eq!(store.get().as_deref(), Some("abc"));
        store.remove();
        assert_eq!(store.get(), None);
    }
}
