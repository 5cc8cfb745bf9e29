/*
[INPUT]:  Transport markers handed over by the state machine
[OUTPUT]: Durable marker mirror readable at start-up
[POS]:    Auth layer - persistent storage for the session marker
[UPDATE]: When the storage format or file location conventions change
*/

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::wallet::lock;
use crate::http::{AuthError, Result};
use crate::types::TransportMarker;

const STORE_FORMAT_VERSION: u32 = 1;

/// Durable key-value mirror of the session marker.
///
/// Written only by the state machine. `load` never fails: unreadable or
/// corrupt data is reported as absent.
pub trait SessionStore: Send + Sync + fmt::Debug {
    fn load(&self) -> Option<TransportMarker>;
    fn save(&self, marker: &TransportMarker) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    version: u32,
    marker: TransportMarker,
    saved_at: DateTime<Utc>,
}

/// JSON file store, written atomically with owner-only permissions
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, contents: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        restrict_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<TransportMarker> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "unreadable session file, ignoring");
                return None;
            }
        };

        let stored: StoredSession = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt session file, ignoring");
                return None;
            }
        };

        if stored.version != STORE_FORMAT_VERSION || stored.marker.is_empty() {
            warn!(
                path = %self.path.display(),
                version = stored.version,
                "unusable session file, ignoring"
            );
            return None;
        }
        Some(stored.marker)
    }

    fn save(&self, marker: &TransportMarker) -> Result<()> {
        let stored = StoredSession {
            version: STORE_FORMAT_VERSION,
            marker: marker.clone(),
            saved_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&stored)
            .map_err(|e| AuthError::Storage(format!("encode session: {e}")))?;

        self.write_file(&contents).map_err(|e| {
            AuthError::Storage(format!("write {}: {e}", self.path.display()))
        })
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Storage(format!(
                "remove {}: {err}",
                self.path.display()
            ))),
        }
    }
}

/// Process-local store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<TransportMarker>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marker(marker: TransportMarker) -> Self {
        Self {
            slot: Mutex::new(Some(marker)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<TransportMarker> {
        lock(&self.slot).clone().filter(|marker| !marker.is_empty())
    }

    fn save(&self, marker: &TransportMarker) -> Result<()> {
        *lock(&self.slot) = Some(marker.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *lock(&self.slot) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let mut path = env::temp_dir();
        path.push(format!("radar-auth-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&path).unwrap();
        path
    }

    #[test]
    fn test_file_store_lifecycle() {
        let dir = temp_dir();
        let store = FileSessionStore::new(dir.join("nested").join("session.json"));

        assert!(store.load().is_none());

        let marker = TransportMarker::new("jwt-token");
        store.save(&marker).unwrap();
        assert_eq!(store.load(), Some(marker));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(store.path()).unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }

        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_file_store_tolerates_corruption() {
        let dir = temp_dir();
        let path = dir.join("session.json");
        let store = FileSessionStore::new(&path);

        fs::write(&path, "{not json").unwrap();
        assert!(store.load().is_none());

        fs::write(&path, r#"{"version":1,"marker":"","saved_at":"2025-01-01T00:00:00Z"}"#).unwrap();
        assert!(store.load().is_none());

        fs::write(&path, r#"{"version":99,"marker":"x","saved_at":"2025-01-01T00:00:00Z"}"#).unwrap();
        assert!(store.load().is_none());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::new();
        assert!(store.load().is_none());
        store.save(&TransportMarker::new("t")).unwrap();
        assert_eq!(store.load(), Some(TransportMarker::new("t")));
        store.clear().unwrap();
        assert!(store.load().is_none());
    }
}
