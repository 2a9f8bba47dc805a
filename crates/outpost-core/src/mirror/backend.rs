use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use tracing::warn;

/// Synchronous key-value persistence under the mirror.
///
/// A `put` either replaces the whole value or leaves the old one in place;
/// readers never observe a half-written entry.
pub trait MirrorBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;

    /// Write every entry, or none of them.
    ///
    /// The default writes one key at a time and, if a write fails, puts back
    /// what the already written keys held before.
    fn put_many(&self, entries: &[(String, String)]) -> Result<()> {
        let mut previous = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            previous.push((key.as_str(), self.get(key)?));
        }

        for (written, (key, value)) in entries.iter().enumerate() {
            if let Err(e) = self.put(key, value) {
                restore(self, &previous[..written]);
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Best-effort rollback of keys to the values they held before a batch.
fn restore<B: MirrorBackend + ?Sized>(backend: &B, previous: &[(&str, Option<String>)]) {
    for (key, old) in previous.iter().rev() {
        let result = match old {
            Some(value) => backend.put(key, value),
            None => backend.remove(key),
        };
        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to roll back mirror entry");
        }
    }
}

/// Keys double as file names, so they are restricted to a safe alphabet.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        bail!("Invalid mirror key: {:?}", key);
    }
    Ok(())
}

/// One JSON file per key in a directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create mirror directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn staging_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", key))
    }

    fn discard_staged(&self, keys: &[&str]) {
        for key in keys {
            let _ = std::fs::remove_file(self.staging_path(key));
        }
    }
}

impl MirrorBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read mirror entry: {}", key))?;
        Ok(Some(contents))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let staging = self.staging_path(key);
        std::fs::write(&staging, value)
            .with_context(|| format!("Failed to stage mirror entry: {}", key))?;
        std::fs::rename(&staging, self.entry_path(key))
            .with_context(|| format!("Failed to commit mirror entry: {}", key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match std::fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove mirror entry: {}", key)),
        }
    }

    /// Stages every entry before committing any, then renames them in turn.
    /// A failed rename puts the already committed keys back.
    fn put_many(&self, entries: &[(String, String)]) -> Result<()> {
        for (key, _) in entries {
            validate_key(key)?;
        }

        let mut staged = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let staging = self.staging_path(key);
            if let Err(e) = std::fs::write(&staging, value) {
                self.discard_staged(&staged);
                let _ = std::fs::remove_file(&staging);
                return Err(e).with_context(|| format!("Failed to stage mirror entry: {}", key));
            }
            staged.push(key.as_str());
        }

        let mut previous = Vec::with_capacity(entries.len());
        for key in &staged {
            match self.get(key) {
                Ok(old) => previous.push((*key, old)),
                Err(e) => {
                    self.discard_staged(&staged);
                    return Err(e);
                }
            }
        }

        for (committed, key) in staged.iter().enumerate() {
            if let Err(e) = std::fs::rename(self.staging_path(key), self.entry_path(key)) {
                restore(self, &previous[..committed]);
                self.discard_staged(&staged[committed..]);
                return Err(e).with_context(|| format!("Failed to commit mirror entry: {}", key));
            }
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list mirror directory: {}", self.dir.display()))?;
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(key) = name.strip_suffix(".json") {
                if validate_key(key).is_ok() {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-process backend for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MirrorBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.entries().remove(key);
        Ok(())
    }

    fn put_many(&self, entries: &[(String, String)]) -> Result<()> {
        for (key, _) in entries {
            validate_key(key)?;
        }
        let mut map = self.entries();
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("current_user").is_ok());
        assert!(validate_key("roster_ck9x-12").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("roster_a b").is_err());
    }

    #[test]
    fn test_file_backend_put_get_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("mirror")).unwrap();

        assert_eq!(backend.get("outings").unwrap(), None);
        backend.put("outings", "[1]").unwrap();
        backend.put("outings", "[2]").unwrap();
        assert_eq!(backend.get("outings").unwrap().as_deref(), Some("[2]"));
    }

    #[test]
    fn test_file_backend_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf()).unwrap();
        backend.put("roster_1", "[]").unwrap();
        backend.put("current_user", "{}").unwrap();

        assert_eq!(backend.keys().unwrap(), vec!["current_user", "roster_1"]);
        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(files.iter().all(|f| !f.ends_with(".tmp")));
    }

    #[test]
    fn test_file_backend_rejects_unsafe_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf()).unwrap();
        assert!(backend.put("../escape", "x").is_err());
        assert!(!dir.path().parent().unwrap().join("escape.json").exists());
    }

    fn batch(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_file_backend_put_many_commits_all() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf()).unwrap();
        backend.put("outings", "[1]").unwrap();

        backend
            .put_many(&batch(&[("roster_1", "[]"), ("outings", "[2]"), ("current_user", "{}")]))
            .unwrap();

        assert_eq!(backend.get("outings").unwrap().as_deref(), Some("[2]"));
        assert_eq!(backend.keys().unwrap(), vec!["current_user", "outings", "roster_1"]);
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_file_backend_put_many_rejects_batch_with_bad_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf()).unwrap();

        let result = backend.put_many(&batch(&[("outings", "[1]"), ("../x", "{}")]));
        assert!(result.is_err());
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_backend_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf()).unwrap();
        backend.put("outings", "[]").unwrap();
        backend.remove("outings").unwrap();
        backend.remove("outings").unwrap();
        assert_eq!(backend.get("outings").unwrap(), None);
    }

    /// Memory backend whose `put` fails for one key.
    struct FailingKey {
        inner: MemoryBackend,
        fail_on: &'static str,
    }

    impl MirrorBackend for FailingKey {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: &str) -> Result<()> {
            if key == self.fail_on {
                bail!("disk full");
            }
            self.inner.put(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }

        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_default_put_many_rolls_back_on_failure() {
        let backend = FailingKey {
            inner: MemoryBackend::new(),
            fail_on: "roster_2",
        };
        backend.put("outings", "old").unwrap();

        let result = backend.put_many(&batch(&[
            ("outings", "new"),
            ("roster_1", "[]"),
            ("roster_2", "[]"),
        ]));
        assert!(result.is_err());

        assert_eq!(backend.get("outings").unwrap().as_deref(), Some("old"));
        assert_eq!(backend.get("roster_1").unwrap(), None);
        assert_eq!(backend.keys().unwrap(), vec!["outings"]);
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        backend.put("b", "2").unwrap();
        backend.put("a", "1").unwrap();
        assert_eq!(backend.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(backend.keys().unwrap(), vec!["a", "b"]);
    }
}
