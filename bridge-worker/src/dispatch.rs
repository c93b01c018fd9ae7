use std::sync::Arc;

use tracing::debug;

use bridge_common::conversation::CreateConversationRequest;
use bridge_common::salesforce::ConversationApi;
use bridge_common::session::SessionStore;

use crate::error::DispatchError;

/// Consume-side half of the pipeline: decode the queued request, resolve
/// the session token for the message's partition, forward to the provider.
pub struct Dispatcher {
    store: Arc<dyn SessionStore>,
    api: Arc<dyn ConversationApi>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn SessionStore>, api: Arc<dyn ConversationApi>) -> Self {
        Self { store, api }
    }

    pub async fn dispatch(&self, partition: i32, payload: &[u8]) -> Result<(), DispatchError> {
        let request: CreateConversationRequest = serde_json::from_slice(payload)
            .map_err(|error| DispatchError::Decode { partition, error })?;

        let session = self
            .store
            .find_by_partition(partition)
            .await
            .map_err(|error| DispatchError::Registry { partition, error })?
            .ok_or(DispatchError::TokenNotFound { partition })?;

        self.api
            .create_conversation(&session.token, &request)
            .await
            .map_err(|error| DispatchError::Forward { partition, error })?;

        metrics::counter!("bridge_messages_forwarded_total").increment(1);
        debug!(
            partition,
            conversation_id = %request.conversation_id,
            "conversation request forwarded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bridge_common::session::MemorySessionStore;
    use bridge_common::test_utils::{sample_conversation_request, RecordingApi};

    use super::*;

    fn dispatcher_with(
        store: Arc<MemorySessionStore>,
        api: Arc<RecordingApi>,
    ) -> Dispatcher {
        Dispatcher::new(store, api)
    }

    #[tokio::test]
    async fn forwards_with_the_partition_token_and_original_request() {
        let store = Arc::new(MemorySessionStore::default());
        store.upsert(4, "tok-x").await.unwrap();
        let api = Arc::new(RecordingApi::default());
        let dispatcher = dispatcher_with(store, api.clone());

        let request = sample_conversation_request("c1");
        let payload = serde_json::to_vec(&request).unwrap();
        dispatcher.dispatch(4, &payload).await.unwrap();

        let created = api.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "tok-x");
        assert_eq!(created[0].1, request);
    }

    #[tokio::test]
    async fn missing_session_blocks_forwarding() {
        let store = Arc::new(MemorySessionStore::default());
        let api = Arc::new(RecordingApi::default());
        let dispatcher = dispatcher_with(store, api.clone());

        let payload = serde_json::to_vec(&sample_conversation_request("c1")).unwrap();
        let error = dispatcher.dispatch(9, &payload).await.unwrap_err();

        assert_eq!(error.to_string(), "token not found for partition 9");
        assert!(api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_reported_with_its_partition() {
        let store = Arc::new(MemorySessionStore::default());
        store.upsert(1, "tok-x").await.unwrap();
        let api = Arc::new(RecordingApi::default());
        let dispatcher = dispatcher_with(store, api.clone());

        let error = dispatcher.dispatch(1, b"{not json").await.unwrap_err();

        assert!(matches!(
            error,
            DispatchError::Decode { partition: 1, .. }
        ));
        assert!(api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_rejection_is_reported_with_its_partition() {
        let store = Arc::new(MemorySessionStore::default());
        store.upsert(2, "tok-stale").await.unwrap();
        let api = Arc::new(RecordingApi::rejecting(&["tok-stale"]));
        let dispatcher = dispatcher_with(store, api);

        let payload = serde_json::to_vec(&sample_conversation_request("c1")).unwrap();
        let error = dispatcher.dispatch(2, &payload).await.unwrap_err();

        assert!(matches!(
            error,
            DispatchError::Forward { partition: 2, .. }
        ));
    }
}
