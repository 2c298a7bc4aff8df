use std::collections::HashMap;
use std::path::{Path, PathBuf};

use famshield_common::KeyValueStore;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Key-value store persisted as a flat JSON object on disk.
///
/// Every write goes straight to the file. A missing or unreadable file is
/// treated as an empty store; write failures are logged and otherwise ignored.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = Self::load(&path);
        debug!("Opened key-value store at {} with {} entries", path.display(), values.len());
        Self { path, values: Mutex::new(values) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> HashMap<String, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!("Failed to read key-value store {}: {}", path.display(), e);
                return HashMap::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Discarding corrupt key-value store {}: {}", path.display(), e);
            HashMap::new()
        })
    }

    fn persist(&self, values: &HashMap<String, String>) {
        if let Err(e) = self.write_file(values) {
            warn!("Failed to persist key-value store {}: {}", self.path.display(), e);
        }
    }

    fn write_file(&self, values: &HashMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) {
        let mut values = self.values.lock();
        if values.get(key).map(String::as_str) == Some(value) {
            return;
        }
        values.insert(key.to_string(), value.to_string());
        self.persist(&values);
    }

    fn remove(&self, key: &str) {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.persist(&values);
        }
    }
}
