use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub room_code: String,
    pub reconnect_token: String,
    pub player_name: String,
}

/// Remembers the last room so a restarted client can reconnect to it.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file {}", self.path.display()))?;
        let session =
            serde_json::from_str(&content).context("Failed to parse session file JSON")?;

        Ok(Some(session))
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, json)?;
        log::debug!("Saved session for room {} to {}", session.room_code, self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static FILE_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_store() -> SessionStore {
        let n = FILE_COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "gridclaim-session-{}-{}.json",
            std::process::id(),
            n
        ));
        let _ = fs::remove_file(&path);
        SessionStore::new(path)
    }

    fn session() -> StoredSession {
        StoredSession {
            room_code: "WXYZ".to_string(),
            reconnect_token: "secret".to_string(),
            player_name: "alice".to_string(),
        }
    }

    #[test]
    fn missing_file_loads_nothing() {
        let store = temp_store();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load() {
        let store = temp_store();

        store.save(&session()).unwrap();
        assert_eq!(store.load().unwrap(), Some(session()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let store = temp_store();
        fs::write(store.path(), "not json").unwrap();

        assert!(store.load().is_err());

        store.clear().unwrap();
    }
}
