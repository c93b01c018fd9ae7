use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::header;
use thiserror::Error;
use tracing::info;

use crate::config::SalesforceConfig;
use crate::conversation::{CreateConversationRequest, TokenRequest, TokenResponse};

const TOKEN_PATH: &str = "/iamessage/api/v2/authorization/unauthenticated/access-token";
const CONTINUATION_TOKEN_PATH: &str = "/iamessage/api/v2/authorization/continuation-access-token";
const CONVERSATION_PATH: &str = "/iamessage/api/v2/conversation";
const EVENT_ROUTER_PATH: &str = "/eventrouter/v1/sse";

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("conversation API call failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("conversation API returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("conversation API event stream failed: {0}")]
    EventStream(String),
}

fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiClientError> {
    if !response.status().is_success() {
        return Err(ApiClientError::Status(response.status()));
    }
    Ok(response)
}

/// One server-push event received over the per-session subscription.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub event: String,
    pub data: String,
}

pub type PushEventStream = Pin<Box<dyn Stream<Item = Result<PushEvent, ApiClientError>> + Send>>;

/// The external conversational API: token acquisition, conversation
/// creation, continuation-token renewal, and the push subscription.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    async fn acquire_token(&self, request: &TokenRequest) -> Result<TokenResponse, ApiClientError>;

    /// Renew a session using the still-valid prior token as credential.
    async fn continuation_token(&self, token: &str) -> Result<TokenResponse, ApiClientError>;

    async fn create_conversation(
        &self,
        token: &str,
        request: &CreateConversationRequest,
    ) -> Result<(), ApiClientError>;

    /// Open the long-lived server-push stream for one session. The returned
    /// stream ends (or yields an error) when the remote closes it.
    async fn subscribe(&self, token: &str) -> Result<PushEventStream, ApiClientError>;
}

pub struct SalesforceClient {
    client: reqwest::Client,
    host: String,
    org_id: String,
    request_timeout: Duration,
}

impl SalesforceClient {
    pub fn new(config: &SalesforceConfig) -> Result<Self, ApiClientError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        // No client-wide timeout: the push subscription holds its response
        // open indefinitely. Unary calls set a per-request timeout instead.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("conversation-bridge")
            .build()?;

        Ok(Self {
            client,
            host: config.host.clone(),
            org_id: config.org_id.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }
}

#[async_trait]
impl ConversationApi for SalesforceClient {
    async fn acquire_token(&self, request: &TokenRequest) -> Result<TokenResponse, ApiClientError> {
        let response = self
            .client
            .post(self.url(TOKEN_PATH))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;

        Ok(ensure_success(response)?.json().await?)
    }

    async fn continuation_token(&self, token: &str) -> Result<TokenResponse, ApiClientError> {
        let response = self
            .client
            .get(self.url(CONTINUATION_TOKEN_PATH))
            .timeout(self.request_timeout)
            .bearer_auth(token)
            .send()
            .await?;

        Ok(ensure_success(response)?.json().await?)
    }

    async fn create_conversation(
        &self,
        token: &str,
        request: &CreateConversationRequest,
    ) -> Result<(), ApiClientError> {
        let response = self
            .client
            .post(self.url(CONVERSATION_PATH))
            .timeout(self.request_timeout)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        ensure_success(response)?;

        info!(
            conversation_id = %request.conversation_id,
            "conversation created on provider"
        );
        Ok(())
    }

    async fn subscribe(&self, token: &str) -> Result<PushEventStream, ApiClientError> {
        let response = self
            .client
            .get(self.url(EVENT_ROUTER_PATH))
            .bearer_auth(token)
            .header("X-Org-Id", &self.org_id)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = ensure_success(response)?;

        let events = response.bytes_stream().eventsource().map(|item| {
            item.map(|event| PushEvent {
                event: event.event,
                data: event.data,
            })
            .map_err(|e| ApiClientError::EventStream(e.to_string()))
        });

        Ok(Box::pin(events))
    }
}
