use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde::Serialize;
use tracing::info;

use crate::config::MongoConfig;
use crate::session::{PartitionSession, SessionStore, StoreError};

const SESSION_COLLECTION: &str = "conversation_mapping";

/// Typed filter for session lookups, serialized to a query document so the
/// field names stay tied to the `PartitionSession` shape.
#[derive(Debug, Serialize)]
struct PartitionFilter {
    partition: i32,
}

impl PartitionFilter {
    fn into_document(self) -> Result<Document, StoreError> {
        Ok(bson::to_document(&self)?)
    }
}

/// Document-store backed session registry.
///
/// Uniqueness per partition is enforced by upserting with a replace, keyed
/// on the partition field.
pub struct MongoSessionStore {
    sessions: Collection<PartitionSession>,
}

impl MongoSessionStore {
    /// Connect and ping the deployment. A store that cannot be reached at
    /// startup is a fatal condition for both binaries.
    pub async fn connect(config: &MongoConfig) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(&config.mongo_uri).await?;
        options.connect_timeout = Some(Duration::from_millis(config.mongo_connection_timeout_ms));
        options.max_idle_time = Some(Duration::from_millis(config.mongo_max_connection_idle_ms));
        options.min_pool_size = Some(config.mongo_min_pool_size);
        options.max_pool_size = Some(config.mongo_max_pool_size);

        let client = Client::with_options(options)?;
        let database = client.database(&config.mongo_database_name);
        database.run_command(doc! { "ping": 1 }).await?;
        info!("connected to session store at {}", config.mongo_uri);

        Ok(Self {
            sessions: database.collection(SESSION_COLLECTION),
        })
    }
}

#[async_trait]
impl SessionStore for MongoSessionStore {
    async fn upsert(&self, partition: i32, token: &str) -> Result<(), StoreError> {
        let session = PartitionSession::new(partition, token);
        self.sessions
            .replace_one(PartitionFilter { partition }.into_document()?, &session)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn find_by_partition(
        &self,
        partition: i32,
    ) -> Result<Option<PartitionSession>, StoreError> {
        Ok(self
            .sessions
            .find_one(PartitionFilter { partition }.into_document()?)
            .await?)
    }

    async fn find_all(&self) -> Result<Vec<PartitionSession>, StoreError> {
        let cursor = self.sessions.find(Document::new()).await?;
        Ok(cursor.try_collect().await?)
    }
}
