use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::TokenRequest;
use crate::salesforce::{ApiClientError, ConversationApi};
use crate::session::{SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("token call failed: {0}")]
    Api(#[from] ApiClientError),
    #[error("session write failed: {0}")]
    Store(#[from] StoreError),
}

/// Result of one partition's slot in a bulk acquire or refresh pass.
/// Failures are collected rather than escalated; the next pass is expected
/// to heal them.
#[derive(Debug)]
pub struct PartitionOutcome {
    pub partition: i32,
    pub result: Result<(), LifecycleError>,
}

impl PartitionOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Acquires and renews the per-partition session tokens backing the
/// registry. Carries no retry state: passes are idempotent upserts and are
/// simply re-run.
pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    api: Arc<dyn ConversationApi>,
    partition_count: i32,
}

impl SessionLifecycle {
    pub fn new(
        store: Arc<dyn SessionStore>,
        api: Arc<dyn ConversationApi>,
        partition_count: i32,
    ) -> Self {
        Self {
            store,
            api,
            partition_count,
        }
    }

    /// Request a fresh token for every partition from 0 up to and including
    /// the configured partition count, persisting each under its partition.
    pub async fn acquire_all(&self, request: &TokenRequest) -> Vec<PartitionOutcome> {
        let mut outcomes = Vec::with_capacity(self.partition_count as usize + 1);

        for partition in 0..=self.partition_count {
            let result = self.acquire_one(partition, request).await;
            match &result {
                Ok(()) => {
                    metrics::counter!("bridge_tokens_acquired_total").increment(1);
                }
                Err(error) => {
                    metrics::counter!("bridge_token_acquire_failures_total").increment(1);
                    warn!(partition, %error, "token acquisition failed, continuing pass");
                }
            }
            outcomes.push(PartitionOutcome { partition, result });
        }

        info!(
            acquired = outcomes.iter().filter(|o| o.succeeded()).count(),
            attempted = outcomes.len(),
            "token acquisition pass finished"
        );
        outcomes
    }

    /// Renew every known session with a continuation token, keyed by its
    /// existing credential. The partition of a session never changes here.
    ///
    /// A failing registry scan aborts the pass; per-session failures do not.
    pub async fn refresh_all(&self) -> Result<Vec<PartitionOutcome>, StoreError> {
        let sessions = self.store.find_all().await?;
        let mut outcomes = Vec::with_capacity(sessions.len());

        for session in sessions {
            let partition = session.partition;
            let result = self.refresh_one(partition, &session.token).await;
            match &result {
                Ok(()) => {
                    metrics::counter!("bridge_tokens_refreshed_total").increment(1);
                }
                Err(error) => {
                    metrics::counter!("bridge_token_refresh_failures_total").increment(1);
                    warn!(partition, %error, "token refresh failed, continuing pass");
                }
            }
            outcomes.push(PartitionOutcome { partition, result });
        }

        info!(
            refreshed = outcomes.iter().filter(|o| o.succeeded()).count(),
            attempted = outcomes.len(),
            "continuation-token refresh pass finished"
        );
        Ok(outcomes)
    }

    async fn acquire_one(
        &self,
        partition: i32,
        request: &TokenRequest,
    ) -> Result<(), LifecycleError> {
        let token = self.api.acquire_token(request).await?;
        self.store.upsert(partition, &token.access_token).await?;
        Ok(())
    }

    async fn refresh_one(&self, partition: i32, token: &str) -> Result<(), LifecycleError> {
        let renewed = self.api.continuation_token(token).await?;
        self.store.upsert(partition, &renewed.access_token).await?;
        Ok(())
    }
}
