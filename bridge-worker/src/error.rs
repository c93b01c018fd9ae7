use thiserror::Error;

use bridge_common::salesforce::ApiClientError;
use bridge_common::session::StoreError;

/// Failure of one consumed message, carrying the partition it arrived on.
/// The coordinator logs these and still acknowledges the message.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to decode message on partition {partition}: {error}")]
    Decode {
        partition: i32,
        error: serde_json::Error,
    },
    #[error("failed to read session for partition {partition}: {error}")]
    Registry { partition: i32, error: StoreError },
    #[error("token not found for partition {partition}")]
    TokenNotFound { partition: i32 },
    #[error("failed to create conversation for partition {partition}: {error}")]
    Forward {
        partition: i32,
        error: ApiClientError,
    },
}

/// Errors that end a consumer-group session. The coordinator reacts by
/// rejoining the group; only startup code treats them as fatal.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("kafka consumer error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}
