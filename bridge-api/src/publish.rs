use async_trait::async_trait;
use rdkafka::producer::future_producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use thiserror::Error;
use tracing::{error, info};

use bridge_common::config::KafkaConfig;
use bridge_common::conversation::CreateConversationRequest;
use bridge_common::kafka::{create_kafka_producer, BridgeKafkaContext};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to produce message: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Where the request landed on the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Queued {
    pub partition: i32,
    pub offset: i64,
}

/// Serializes conversation-create requests and puts them on the queue.
/// Publish failures are surfaced to the HTTP caller, not retried.
#[async_trait]
pub trait RequestPublisher: Send + Sync {
    async fn publish(&self, request: &CreateConversationRequest) -> Result<Queued, PublishError>;
}

/// Logs requests instead of producing them, for local runs without a broker.
pub struct PrintPublisher;

#[async_trait]
impl RequestPublisher for PrintPublisher {
    async fn publish(&self, request: &CreateConversationRequest) -> Result<Queued, PublishError> {
        info!("conversation request: {:?}", request);
        metrics::counter!("bridge_requests_queued_total").increment(1);

        Ok(Queued {
            partition: 0,
            offset: 0,
        })
    }
}

pub struct KafkaPublisher {
    producer: FutureProducer<BridgeKafkaContext>,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self, rdkafka::error::KafkaError> {
        Ok(KafkaPublisher {
            producer: create_kafka_producer(config)?,
            topic: config.kafka_topic.clone(),
        })
    }
}

#[async_trait]
impl RequestPublisher for KafkaPublisher {
    async fn publish(&self, request: &CreateConversationRequest) -> Result<Queued, PublishError> {
        let payload = serde_json::to_vec(request)?;

        let record = FutureRecord::<(), Vec<u8>>::to(&self.topic).payload(&payload);
        match self.producer.send(record, Timeout::Never).await {
            Ok((partition, offset)) => {
                metrics::counter!("bridge_requests_queued_total").increment(1);
                info!(
                    conversation_id = %request.conversation_id,
                    topic = %self.topic,
                    partition,
                    offset,
                    "conversation request queued"
                );
                Ok(Queued { partition, offset })
            }
            Err((e, _)) => {
                metrics::counter!("bridge_requests_dropped_total").increment(1);
                error!("failed to produce conversation request: {}", e);
                Err(PublishError::Kafka(e))
            }
        }
    }
}
