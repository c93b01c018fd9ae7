use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::conversation::{CreateConversationRequest, TokenRequest, TokenResponse};
use crate::salesforce::{ApiClientError, ConversationApi, PushEventStream};

/// Conversation API double that records every call and can be told to
/// reject specific credentials. Subscriptions stay open until dropped.
#[derive(Default)]
pub struct RecordingApi {
    pub reject_tokens: Vec<String>,
    pub created: Mutex<Vec<(String, CreateConversationRequest)>>,
    pub subscribed: Mutex<Vec<String>>,
}

impl RecordingApi {
    pub fn rejecting(tokens: &[&str]) -> Self {
        Self {
            reject_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    fn check(&self, token: &str) -> Result<(), ApiClientError> {
        if self.reject_tokens.iter().any(|t| t == token) {
            return Err(ApiClientError::Status(reqwest::StatusCode::UNAUTHORIZED));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationApi for RecordingApi {
    async fn acquire_token(&self, _request: &TokenRequest) -> Result<TokenResponse, ApiClientError> {
        Ok(TokenResponse {
            access_token: "tok-acquired".to_string(),
        })
    }

    async fn continuation_token(&self, token: &str) -> Result<TokenResponse, ApiClientError> {
        self.check(token)?;
        Ok(TokenResponse {
            access_token: format!("renewed-{token}"),
        })
    }

    async fn create_conversation(
        &self,
        token: &str,
        request: &CreateConversationRequest,
    ) -> Result<(), ApiClientError> {
        self.check(token)?;
        self.created
            .lock()
            .unwrap()
            .push((token.to_string(), request.clone()));
        Ok(())
    }

    async fn subscribe(&self, token: &str) -> Result<PushEventStream, ApiClientError> {
        self.check(token)?;
        self.subscribed.lock().unwrap().push(token.to_string());
        Ok(Box::pin(stream::pending()))
    }
}

/// A conversation-create request with every required field filled in.
pub fn sample_conversation_request(conversation_id: &str) -> CreateConversationRequest {
    CreateConversationRequest {
        conversation_id: conversation_id.to_string(),
        es_developer_name: "Bridge_Deployment".to_string(),
        language: "en".to_string(),
        routing_attributes: crate::conversation::RoutingAttributes {
            case_id: "500".to_string(),
            account_id: "001".to_string(),
            customer_name: "Ada".to_string(),
            customer_phone: "+15550100".to_string(),
            customer_email: "ada@example.com".to_string(),
            origin: "phone".to_string(),
            source_type: "ivr".to_string(),
        },
    }
}
