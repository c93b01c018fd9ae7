use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use tracing::instrument;

use bridge_common::conversation::{CreateConversationRequest, TokenRequest};

use crate::api::{ApiError, QueuedResponse, TokenPassResponse};
use crate::router::AppState;

/// Accept a conversation-create request, validate it and put it on the
/// queue. The caller only learns that the request was queued; delivery to
/// the provider happens asynchronously on the consume side.
#[instrument(skip_all, fields(conversation_id))]
pub async fn create_conversation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<QueuedResponse>, ApiError> {
    let request: CreateConversationRequest = serde_json::from_slice(&body)?;
    request.validate()?;
    tracing::Span::current().record("conversation_id", request.conversation_id.as_str());

    let queued = state.publisher.publish(&request).await?;

    Ok(Json(QueuedResponse {
        status: "queued".to_string(),
        partition: queued.partition,
        offset: queued.offset,
    }))
}

/// Renew the continuation token of every known partition session.
#[instrument(skip_all)]
pub async fn refresh_continuation_tokens(
    State(state): State<AppState>,
) -> Result<Json<TokenPassResponse>, ApiError> {
    let outcomes = state.lifecycle.refresh_all().await?;

    Ok(Json(TokenPassResponse::summarize("refreshed", outcomes)))
}

/// Run a token acquisition pass across all configured partitions.
#[instrument(skip_all)]
pub async fn acquire_tokens(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TokenPassResponse>, ApiError> {
    let request: TokenRequest = serde_json::from_slice(&body)?;
    request.validate()?;

    let outcomes = state.lifecycle.acquire_all(&request).await;

    Ok(Json(TokenPassResponse::summarize("acquired", outcomes)))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use http::{Method, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use bridge_common::lifecycle::SessionLifecycle;
    use bridge_common::session::{MemorySessionStore, SessionStore};
    use bridge_common::test_utils::{sample_conversation_request, RecordingApi};

    use super::*;
    use crate::api::ErrorBody;
    use crate::publish::{PublishError, Queued, RequestPublisher};
    use crate::router;

    /// Publisher double that records payloads or fails on demand.
    #[derive(Default)]
    struct MemoryPublisher {
        fail: bool,
        published: Mutex<Vec<CreateConversationRequest>>,
    }

    #[async_trait]
    impl RequestPublisher for MemoryPublisher {
        async fn publish(
            &self,
            request: &CreateConversationRequest,
        ) -> Result<Queued, PublishError> {
            if self.fail {
                return Err(PublishError::Kafka(
                    rdkafka::error::KafkaError::Canceled,
                ));
            }
            let mut published = self.published.lock().unwrap();
            published.push(request.clone());
            Ok(Queued {
                partition: 4,
                offset: published.len() as i64,
            })
        }
    }

    struct App {
        router: axum::Router,
        publisher: Arc<MemoryPublisher>,
        store: Arc<MemorySessionStore>,
    }

    fn app_with(publisher: MemoryPublisher, api: RecordingApi) -> App {
        let publisher = Arc::new(publisher);
        let store = Arc::new(MemorySessionStore::default());
        let lifecycle = Arc::new(SessionLifecycle::new(store.clone(), Arc::new(api), 2));
        App {
            router: router::router(publisher.clone(), lifecycle),
            publisher,
            store,
        }
    }

    async fn send(router: axum::Router, method: Method, uri: &str, body: Body) -> (StatusCode, Bytes) {
        let response = router
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn valid_create_request_is_queued() {
        let app = app_with(MemoryPublisher::default(), RecordingApi::default());
        let request = sample_conversation_request("c1");

        let (status, body) = send(
            app.router,
            Method::POST,
            "/conversation/create",
            Body::from(serde_json::to_vec(&request).unwrap()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let queued: crate::api::QueuedResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(queued.status, "queued");
        assert_eq!(queued.partition, 4);
        assert_eq!(*app.publisher.published.lock().unwrap(), vec![request]);
    }

    #[tokio::test]
    async fn malformed_body_is_a_client_error() {
        let app = app_with(MemoryPublisher::default(), RecordingApi::default());

        let (status, body) = send(
            app.router,
            Method::POST,
            "/conversation/create",
            Body::from("{not json"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(error.error.contains("failed to decode request body"));
    }

    #[tokio::test]
    async fn missing_field_is_a_client_error() {
        let app = app_with(MemoryPublisher::default(), RecordingApi::default());
        let mut request = sample_conversation_request("c1");
        request.routing_attributes.case_id = String::new();

        let (status, body) = send(
            app.router,
            Method::POST,
            "/conversation/create",
            Body::from(serde_json::to_vec(&request).unwrap()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(error.error.contains("routingAttributes.caseId"));
        assert!(app.publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_a_server_error() {
        let app = app_with(
            MemoryPublisher {
                fail: true,
                ..MemoryPublisher::default()
            },
            RecordingApi::default(),
        );

        let (status, body) = send(
            app.router,
            Method::POST,
            "/conversation/create",
            Body::from(serde_json::to_vec(&sample_conversation_request("c1")).unwrap()),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(error.error.contains("failed to queue conversation request"));
    }

    #[tokio::test]
    async fn continuation_token_refresh_reports_per_partition_outcomes() {
        let app = app_with(
            MemoryPublisher::default(),
            RecordingApi::rejecting(&["tok-stale"]),
        );
        app.store.upsert(0, "tok-live").await.unwrap();
        app.store.upsert(1, "tok-stale").await.unwrap();

        let (status, body) = send(
            app.router,
            Method::PUT,
            "/conversation/continuation-token",
            Body::empty(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let summary: TokenPassResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].partition, 1);
    }

    #[tokio::test]
    async fn token_acquisition_covers_all_partitions() {
        let app = app_with(MemoryPublisher::default(), RecordingApi::default());
        let body = json!({
            "orgId": "00Dtest",
            "esDeveloperName": "Bridge_Deployment",
            "capabilitiesVersion": "1",
            "platform": "Web",
            "context": {"appName": "conversation-bridge", "clientVersion": "1.0"},
        });

        let (status, response) = send(
            app.router,
            Method::POST,
            "/conversation/token",
            Body::from(body.to_string()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let summary: TokenPassResponse = serde_json::from_slice(&response).unwrap();
        // partition_count is 2, bound inclusive
        assert_eq!(summary.succeeded, 3);
        assert_eq!(app.store.find_all().await.unwrap().len(), 3);
    }
}
