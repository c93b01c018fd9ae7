use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bridge_common::conversation::MissingField;
use bridge_common::lifecycle::PartitionOutcome;
use bridge_common::session::StoreError;

use crate::publish::PublishError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to decode request body: {0}")]
    RequestParsing(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] MissingField),
    #[error("failed to queue conversation request: {0}")]
    Publish(#[from] PublishError),
    #[error("failed to read session registry: {0}")]
    Registry(#[from] StoreError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::RequestParsing(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Publish(_) | ApiError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Confirmation that a conversation-create request was queued, with its
/// placement on the topic for observability.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedResponse {
    pub status: String,
    pub partition: i32,
    pub offset: i64,
}

/// Summary of a bulk token pass, with the partitions that failed.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPassResponse {
    pub status: String,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedPartition>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailedPartition {
    pub partition: i32,
    pub error: String,
}

impl TokenPassResponse {
    pub fn summarize(verb: &str, outcomes: Vec<PartitionOutcome>) -> Self {
        let attempted = outcomes.len();
        let failures: Vec<FailedPartition> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome.result {
                Ok(()) => None,
                Err(error) => Some(FailedPartition {
                    partition: outcome.partition,
                    error: error.to_string(),
                }),
            })
            .collect();
        let succeeded = attempted - failures.len();

        TokenPassResponse {
            status: format!("{verb} {succeeded} of {attempted} sessions"),
            succeeded,
            failed: failures.len(),
            failures,
        }
    }
}
