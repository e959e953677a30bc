/// Key-value settings persistence
///
/// Block lists, mute lists and notification toggles are read once at engine
/// start and rewritten synchronously on every mutation. Read failures degrade
/// to defaults so a corrupt settings store never prevents startup.
use crate::error::{EngineError, Result};
use std::path::Path;
use std::sync::Arc;

pub trait SettingsStore: Send + Sync {
    fn get_bool(&self, key: &str, default: bool) -> bool;
    fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: &str) -> Result<()>;

    fn get_string_list(&self, key: &str) -> Vec<String>;
    fn set_string_list(&self, key: &str, values: &[String]) -> Result<()>;
}

/// Settings store backed by a sled embedded database
#[derive(Clone)]
pub struct SledSettings {
    db: Arc<sled::Db>,
}

impl SledSettings {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("settings.db"))
            .map_err(|e| EngineError::Storage(format!("settings DB: {}", e)))?;
        Ok(Self { db: Arc::new(db) })
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.db.get(key.as_bytes()).ok().flatten().map(|v| v.to_vec())
    }

    fn write(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| EngineError::Storage(format!("settings write {}: {}", key, e)))?;
        self.db
            .flush()
            .map_err(|e| EngineError::Storage(format!("settings flush: {}", e)))?;
        Ok(())
    }
}

impl SettingsStore for SledSettings {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.read(key).as_deref() {
            Some(b"1") => true,
            Some(b"0") => false,
            _ => default,
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.write(key, if value { b"1".to_vec() } else { b"0".to_vec() })
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.read(key).and_then(|v| String::from_utf8(v).ok())
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, value.as_bytes().to_vec())
    }

    fn get_string_list(&self, key: &str) -> Vec<String> {
        self.read(key)
            .and_then(|v| serde_json::from_slice::<Vec<String>>(&v).ok())
            .unwrap_or_default()
    }

    fn set_string_list(&self, key: &str, values: &[String]) -> Result<()> {
        let json = serde_json::to_vec(values).map_err(EngineError::Serialization)?;
        self.write(key, json)
    }
}
