// store.rs — HandleStore: persistence for PolicyHandles between calls.
//
// The reconciler is stateless; the orchestrator keeps handles. Each handle is
// a JSON file at `<store_dir>/<environment>/<name>.json`, so a policy's
// handle is found by the same identity the descriptor carries.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::handle::PolicyHandle;

pub struct HandleStore {
    store_dir: PathBuf,
}

impl HandleStore {
    /// Create a store backed by `store_dir`, creating the directory if needed.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| StoreError::IoError {
            path: store_dir.display().to_string(),
            source,
        })?;
        Ok(Self { store_dir })
    }

    /// Save a handle (creates or overwrites).
    pub fn save(&self, handle: &PolicyHandle) -> Result<(), StoreError> {
        let path = self.handle_file(&handle.environment, &handle.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(handle)?;
        fs::write(&path, json).map_err(|source| StoreError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    pub fn get(&self, environment: &str, name: &str) -> Result<Option<PolicyHandle>, StoreError> {
        let path = self.handle_file(environment, name);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| StoreError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// All stored handles, sorted by identity. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<PolicyHandle>, StoreError> {
        let mut handles = Vec::new();

        for env_dir in read_dir(&self.store_dir)? {
            if !env_dir.is_dir() {
                continue;
            }
            for path in read_dir(&env_dir)? {
                if !path.extension().is_some_and(|ext| ext == "json") {
                    continue;
                }
                let json = fs::read_to_string(&path).map_err(|source| StoreError::IoError {
                    path: path.display().to_string(),
                    source,
                })?;
                match serde_json::from_str::<PolicyHandle>(&json) {
                    Ok(handle) => handles.push(handle),
                    Err(e) => tracing::warn!("skipping unreadable handle {}: {}", path.display(), e),
                }
            }
        }

        handles.sort_by_key(|h| h.identity());
        Ok(handles)
    }

    /// Remove a handle. Returns `false` if there was none.
    pub fn remove(&self, environment: &str, name: &str) -> Result<bool, StoreError> {
        let path = self.handle_file(environment, name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| StoreError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(true)
    }

    fn handle_file(&self, environment: &str, name: &str) -> PathBuf {
        self.store_dir
            .join(environment)
            .join(format!("{}.json", name))
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = fs::read_dir(dir).map_err(|source| StoreError::IoError {
        path: dir.display().to_string(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::IoError {
            path: dir.display().to_string(),
            source,
        })?;
        paths.push(entry.path());
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleStatus;
    use gr_policy::PolicyDescriptor;
    use tempfile::tempdir;

    fn handle(name: &str, environment: &str) -> PolicyHandle {
        let d = PolicyDescriptor::new(name, environment).with_blocked_term("hack");
        PolicyHandle::created(format!("id-{}", name), &d)
    }

    #[test]
    fn save_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path().join("handles")).unwrap();

        let h = handle("safety", "dev");
        store.save(&h).unwrap();

        let found = store.get("dev", "safety").unwrap().unwrap();
        assert_eq!(found, h);
        assert!(dir.path().join("handles/dev/safety.json").exists());
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();
        assert!(store.get("dev", "nothing").unwrap().is_none());
    }

    #[test]
    fn save_overwrites_previous_handle() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();

        let mut h = handle("safety", "dev");
        store.save(&h).unwrap();
        h.transition(HandleStatus::Updating).unwrap();
        store.save(&h).unwrap();

        let found = store.get("dev", "safety").unwrap().unwrap();
        assert_eq!(found.status, HandleStatus::Updating);
    }

    #[test]
    fn list_spans_environments_sorted_by_identity() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();
        store.save(&handle("safety", "prod")).unwrap();
        store.save(&handle("pii", "dev")).unwrap();
        store.save(&handle("safety", "dev")).unwrap();
        fs::write(dir.path().join("dev/notes.txt"), "ignored").unwrap();

        let identities: Vec<String> = store.list().unwrap().iter().map(|h| h.identity()).collect();
        assert_eq!(identities, vec!["dev/pii", "dev/safety", "prod/safety"]);
    }

    #[test]
    fn remove_reports_whether_anything_was_deleted() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();
        store.save(&handle("safety", "dev")).unwrap();

        assert!(store.remove("dev", "safety").unwrap());
        assert!(!store.remove("dev", "safety").unwrap());
        assert!(store.get("dev", "safety").unwrap().is_none());
    }
}
