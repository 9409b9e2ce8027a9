use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One user preference memo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Mutable user preference store (`memos.json`).
///
/// This file is deliberately outside the event log: preferences are
/// current state, not reasoning history, and may be edited or removed
/// freely.
#[derive(Debug)]
pub struct MemoStore {
    path: PathBuf,
    memos: BTreeMap<String, Memo>,
}

impl MemoStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let memos = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, memos })
    }

    /// Insert or update a memo; returns its id.
    pub fn set(&mut self, id: impl Into<String>, text: impl Into<String>) -> Result<String> {
        let id = id.into();
        let text = text.into();
        let now = Utc::now().to_rfc3339();

        match self.memos.get_mut(&id) {
            Some(memo) => {
                memo.text = text;
                memo.updated_at = now;
            }
            None => {
                self.memos.insert(
                    id.clone(),
                    Memo {
                        id: id.clone(),
                        text,
                        topic: None,
                        created_at: now.clone(),
                        updated_at: now,
                    },
                );
            }
        }

        self.save()?;
        Ok(id)
    }

    pub fn set_topic(&mut self, id: &str, topic: impl Into<String>) -> Result<bool> {
        let Some(memo) = self.memos.get_mut(id) else {
            return Ok(false);
        };
        memo.topic = Some(topic.into());
        memo.updated_at = Utc::now().to_rfc3339();
        self.save()?;
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&Memo> {
        self.memos.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let removed = self.memos.remove(id).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn list(&self) -> impl Iterator<Item = &Memo> {
        self.memos.values()
    }

    pub fn len(&self) -> usize {
        self.memos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memos.is_empty()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.memos)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_update_remove() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("memos.json");

        let mut store = MemoStore::open(&path).unwrap();
        store.set("style", "terse summaries").unwrap();
        assert_eq!(store.get("style").unwrap().text, "terse summaries");

        // Mutation in place is allowed here, unlike the event log
        store.set("style", "verbose summaries").unwrap();
        assert_eq!(store.get("style").unwrap().text, "verbose summaries");
        assert_eq!(store.len(), 1);

        assert!(store.remove("style").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("memos.json");

        {
            let mut store = MemoStore::open(&path).unwrap();
            store.set("display", "unicode").unwrap();
            store.set_topic("display", "rendering").unwrap();
        }

        let store = MemoStore::open(&path).unwrap();
        let memo = store.get("display").unwrap();
        assert_eq!(memo.text, "unicode");
        assert_eq!(memo.topic.as_deref(), Some("rendering"));
    }
}
