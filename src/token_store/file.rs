//! Key-value file in the app's data directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use uuid::Uuid;

use super::KeyValueStore;

const STANDARD_SUITE: &str = "standard";

/// JSON file of base64 values, one file per suite.
///
/// Every write goes to its own temp file that is renamed over the original,
/// so a reader never sees a partial write, even from another handle or
/// process on the same suite. Reads and writes through one handle are also
/// serialised by a lock.
pub struct FileKeyValueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(data_dir: &Path, suite_name: Option<&str>) -> Self {
        let suite = suite_name
            .map(sanitize_suite_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| STANDARD_SUITE.to_string());
        Self {
            path: data_dir.join(format!("{}.json", suite)),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, String> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!("[token-store] Failed to read {:?}: {}", self.path, e);
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("[token-store] Ignoring unreadable {:?}: {}", self.path, e);
                BTreeMap::new()
            }
        }
    }

    fn save(&self, values: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(values)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Atomic write: write to a temp file unique to this write, then rename
        let temp_path = self
            .path
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        let written = std::fs::write(&temp_path, json)
            .and_then(|()| std::fs::rename(&temp_path, &self.path));
        if written.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        written?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn data(&self, key: &str) -> Option<Vec<u8>> {
        let _guard = self.lock.lock();
        let encoded = self.load().remove(key)?;
        match STANDARD.decode(encoded.as_bytes()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("[token-store] Value for '{}' is not base64: {}", key, e);
                None
            }
        }
    }

    fn set_data(&self, key: &str, value: Option<Vec<u8>>) {
        let _guard = self.lock.lock();
        let mut values = self.load();
        match value {
            Some(bytes) => {
                values.insert(key.to_string(), STANDARD.encode(bytes));
            }
            None => {
                values.remove(key);
            }
        }
        if let Err(e) = self.save(&values) {
            tracing::warn!("[token-store] Dropped write to {:?}: {}", self.path, e);
        }
    }
}

fn sanitize_suite_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
