use rdkafka::error::KafkaError;
use rdkafka::producer::FutureProducer;
use rdkafka::ClientConfig;
use tracing::debug;

use crate::config::KafkaConfig;

/// Client context shared by the bridge's producers, publishing librdkafka
/// statistics as gauges.
pub struct BridgeKafkaContext;

impl rdkafka::ClientContext for BridgeKafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        metrics::gauge!("bridge_kafka_callback_queue_depth").set(stats.replyq as f64);
        metrics::gauge!("bridge_kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        metrics::gauge!("bridge_kafka_producer_queue_bytes").set(stats.msg_size as f64);

        for (topic, topic_stats) in stats.topics {
            metrics::gauge!("bridge_kafka_produce_avg_batch_size_bytes", "topic" => topic)
                .set(topic_stats.batchsize.avg as f64);
        }
    }
}

pub fn create_kafka_producer(
    config: &KafkaConfig,
) -> Result<FutureProducer<BridgeKafkaContext>, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        );

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    debug!("rdkafka producer configuration: {:?}", client_config);
    client_config.create_with_context(BridgeKafkaContext)
}
