use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

/// Minimal string key-value store, the shape of browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Flat JSON object on disk.
///
/// Every read reloads the file and every write merges into what is on disk,
/// so keys owned by someone else survive. A missing or unparsable file reads
/// as an empty object.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>) -> bool) -> anyhow::Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if !apply(&mut on_disk) {
            return Ok(());
        }
        write_json_object(&self.path, &on_disk)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let payload = read_json_object(&self.path).unwrap_or_default();
        Ok(payload.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(|payload| {
            let snapshot = Value::String(value.to_string());
            if payload.get(key) == Some(&snapshot) {
                return false;
            }
            payload.insert(key.to_string(), snapshot);
            true
        })
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.update(|payload| payload.remove(key).is_some())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.values
            .lock()
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}
