// Note store - per-sensor study notes kept as key-value pairs
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::application::error::LabError;

pub const MAX_KEY_LEN: usize = 128;

#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, LabError>;

    async fn put(&self, key: &str, value: String) -> Result<(), LabError>;

    /// Returns whether a note was removed.
    async fn delete(&self, key: &str) -> Result<bool, LabError>;

    /// Keys in ascending order.
    async fn keys(&self) -> Result<Vec<String>, LabError>;
}

pub fn validate_key(key: &str) -> Result<(), LabError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(LabError::InvalidNoteKey(key.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryNoteStore {
    notes: RwLock<BTreeMap<String, String>>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: BTreeMap<String, String>) -> Self {
        Self {
            notes: RwLock::new(notes),
        }
    }

    pub async fn to_map(&self) -> BTreeMap<String, String> {
        self.notes.read().await.clone()
    }
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LabError> {
        validate_key(key)?;
        Ok(self.notes.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), LabError> {
        validate_key(key)?;
        self.notes.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, LabError> {
        validate_key(key)?;
        Ok(self.notes.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, LabError> {
        Ok(self.notes.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryNoteStore::new();
        store.put("notes-gas", "MQ-2 needs 24h burn-in".to_string()).await.unwrap();
        store.put("notes-dht22", "slow response".to_string()).await.unwrap();

        assert_eq!(
            store.get("notes-gas").await.unwrap().as_deref(),
            Some("MQ-2 needs 24h burn-in")
        );
        assert_eq!(store.keys().await.unwrap(), vec!["notes-dht22", "notes-gas"]);
        assert!(store.delete("notes-gas").await.unwrap());
        assert!(!store.delete("notes-gas").await.unwrap());
        assert_eq!(store.get("notes-gas").await.unwrap(), None);
    }

    #[test]
    fn test_key_validation() {
        assert!(validate_key("notes-ultrasonic_v2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }
}
