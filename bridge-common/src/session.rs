use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One persistent session record per queue partition.
///
/// The partition number is the natural key; the store enforces uniqueness
/// and every write is a full replace-or-insert. The `id` is assigned by the
/// store on first insert and never read back by application logic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartitionSession {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub token: String,
    pub partition: i32,
}

impl PartitionSession {
    pub fn new(partition: i32, token: impl Into<String>) -> Self {
        Self {
            id: None,
            token: token.into(),
            partition,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store backend error: {0}")]
    Backend(#[from] mongodb::error::Error),
    #[error("failed to encode session filter: {0}")]
    Filter(#[from] mongodb::bson::ser::Error),
}

/// Durable partition→token registry.
///
/// A missing record is a normal outcome (`Ok(None)`), distinct from a
/// transport failure. Concurrent upserts for different partitions never
/// conflict; same-partition writers race on last-write-wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn upsert(&self, partition: i32, token: &str) -> Result<(), StoreError>;
    async fn find_by_partition(&self, partition: i32)
        -> Result<Option<PartitionSession>, StoreError>;
    async fn find_all(&self) -> Result<Vec<PartitionSession>, StoreError>;
}

/// In-memory registry for tests and local runs without a document store.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<i32, PartitionSession>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn upsert(&self, partition: i32, token: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().expect("poisoned session store lock");
        sessions.insert(partition, PartitionSession::new(partition, token));
        Ok(())
    }

    async fn find_by_partition(
        &self,
        partition: i32,
    ) -> Result<Option<PartitionSession>, StoreError> {
        let sessions = self.sessions.lock().expect("poisoned session store lock");
        Ok(sessions.get(&partition).cloned())
    }

    async fn find_all(&self) -> Result<Vec<PartitionSession>, StoreError> {
        let sessions = self.sessions.lock().expect("poisoned session store lock");
        Ok(sessions.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_lookup_returns_token() {
        let store = MemorySessionStore::default();
        store.upsert(3, "tok-a").await.unwrap();

        let found = store.find_by_partition(3).await.unwrap().unwrap();
        assert_eq!(found.token, "tok-a");
        assert_eq!(found.partition, 3);
    }

    #[tokio::test]
    async fn second_upsert_replaces_instead_of_duplicating() {
        let store = MemorySessionStore::default();
        store.upsert(3, "tok-a").await.unwrap();
        store.upsert(3, "tok-b").await.unwrap();

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].token, "tok-b");
    }

    #[tokio::test]
    async fn untouched_partition_is_not_found_not_an_error() {
        let store = MemorySessionStore::default();
        store.upsert(0, "tok-a").await.unwrap();

        assert!(store.find_by_partition(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upserts_for_different_partitions_coexist() {
        let store = MemorySessionStore::default();
        store.upsert(0, "tok-0").await.unwrap();
        store.upsert(1, "tok-1").await.unwrap();

        let mut all = store.find_all().await.unwrap();
        all.sort_by_key(|s| s.partition);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].token, "tok-1");
    }
}
