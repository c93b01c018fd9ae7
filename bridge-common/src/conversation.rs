use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A required field was missing or empty in an inbound request body.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing required field: {0}")]
pub struct MissingField(pub &'static str);

/// The conversation-create request accepted over HTTP and re-published onto
/// the queue. The envelope is identical on publish and consume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub conversation_id: String,
    pub es_developer_name: String,
    pub language: String,
    pub routing_attributes: RoutingAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingAttributes {
    pub case_id: String,
    pub account_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: String,
    pub origin: String,
    pub source_type: String,
}

impl CreateConversationRequest {
    pub fn validate(&self) -> Result<(), MissingField> {
        require("conversationId", &self.conversation_id)?;
        require("esDeveloperName", &self.es_developer_name)?;
        require("language", &self.language)?;
        self.routing_attributes.validate()
    }
}

impl RoutingAttributes {
    pub fn validate(&self) -> Result<(), MissingField> {
        require("routingAttributes.caseId", &self.case_id)?;
        require("routingAttributes.accountId", &self.account_id)?;
        require("routingAttributes.customerName", &self.customer_name)?;
        require("routingAttributes.customerPhone", &self.customer_phone)?;
        require("routingAttributes.customerEmail", &self.customer_email)?;
        require("routingAttributes.origin", &self.origin)?;
        require("routingAttributes.sourceType", &self.source_type)
    }
}

/// Body of a token acquisition call against the conversation API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub org_id: String,
    pub es_developer_name: String,
    pub capabilities_version: String,
    pub platform: String,
    pub context: TokenRequestContext,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequestContext {
    pub app_name: String,
    pub client_version: String,
}

impl TokenRequest {
    pub fn validate(&self) -> Result<(), MissingField> {
        require("orgId", &self.org_id)?;
        require("esDeveloperName", &self.es_developer_name)?;
        require("capabilitiesVersion", &self.capabilities_version)?;
        require("platform", &self.platform)?;
        require("context.appName", &self.context.app_name)?;
        require("context.clientVersion", &self.context.client_version)
    }
}

/// Response of both the token acquisition and continuation-token calls.
/// The provider returns more fields; only the credential is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
}

fn require(name: &'static str, value: &str) -> Result<(), MissingField> {
    if value.is_empty() {
        return Err(MissingField(name));
    }
    Ok(())
}
