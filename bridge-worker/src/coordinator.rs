use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::{ClientConfig, ClientContext, Message, TopicPartitionList};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{error, info, warn};

use bridge_common::config::KafkaConfig;
use bridge_common::health::HealthHandle;
use bridge_common::session::SessionStore;

use crate::dispatch::Dispatcher;
use crate::error::WorkerError;
use crate::subscriptions::SubscriptionSupervisor;

const LIVENESS_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Resettable one-shot readiness signal owned by the coordinator.
///
/// `start` blocks on it until the first group-join attempt is underway;
/// every reconnect cycle resets it before rejoining.
pub struct ReadyGate {
    ready: watch::Sender<bool>,
}

impl ReadyGate {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self { ready }
    }

    pub fn reset(&self) {
        self.ready.send_replace(false);
    }

    pub fn set_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the gate is (or already was) set.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as &self, so this cannot fail.
        rx.wait_for(|ready| *ready)
            .await
            .expect("ready gate sender dropped");
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Reactions to partition ownership changes.
///
/// On claim, one push subscription is opened per gained partition, keyed by
/// the token found in the session registry. A partition whose token cannot
/// be resolved simply has no subscription until a later pass provides one;
/// the claim itself never fails.
pub struct ClaimHandler {
    store: Arc<dyn SessionStore>,
    supervisor: Arc<SubscriptionSupervisor>,
}

impl ClaimHandler {
    pub fn new(store: Arc<dyn SessionStore>, supervisor: Arc<SubscriptionSupervisor>) -> Self {
        Self { store, supervisor }
    }

    pub async fn on_claim(&self, partitions: &[i32]) {
        for &partition in partitions {
            info!(partition, "partition claimed");
            metrics::counter!("bridge_partitions_claimed_total").increment(1);

            match self.store.find_by_partition(partition).await {
                Ok(Some(session)) => self.supervisor.open(partition, session.token).await,
                Ok(None) => {
                    warn!(
                        partition,
                        "no session token for claimed partition, subscription deferred"
                    );
                }
                Err(error) => {
                    error!(partition, %error, "failed to resolve session for claimed partition");
                }
            }
        }
    }

    pub async fn on_revoke(&self, partitions: &[i32]) {
        for &partition in partitions {
            info!(partition, "partition revoked");
            metrics::counter!("bridge_partitions_revoked_total").increment(1);
            self.supervisor.close(partition).await;
        }
    }
}

/// Bridges librdkafka rebalance callbacks onto the async claim handler.
/// The callbacks run on the consumer's poll thread and must not block, so
/// the reactions are spawned onto the runtime.
struct CoordinatorContext {
    handler: Arc<ClaimHandler>,
    rt_handle: Handle,
}

impl ClientContext for CoordinatorContext {}

impl ConsumerContext for CoordinatorContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        if let Rebalance::Revoke(partitions) = rebalance {
            let lost = partition_numbers(partitions);
            if lost.is_empty() {
                return;
            }
            let handler = self.handler.clone();
            self.rt_handle.spawn(async move {
                handler.on_revoke(&lost).await;
            });
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                let gained = partition_numbers(partitions);
                if gained.is_empty() {
                    return;
                }
                let handler = self.handler.clone();
                self.rt_handle.spawn(async move {
                    handler.on_claim(&gained).await;
                });
            }
            Rebalance::Error(e) => error!("rebalance failed: {:?}", e),
            Rebalance::Revoke(_) => {}
        }
    }
}

fn partition_numbers(partitions: &TopicPartitionList) -> Vec<i32> {
    partitions
        .elements()
        .iter()
        .map(|elem| elem.partition())
        .collect()
}

/// Owns the consumer-group membership of this worker process.
///
/// One session at a time: join the group, react to rebalances through the
/// claim handler, dispatch messages in partition order, store each offset
/// exactly once. When a session dies the coordinator rejoins immediately,
/// checking the shutdown signal only at loop-top.
pub struct Coordinator {
    config: KafkaConfig,
    handler: Arc<ClaimHandler>,
    dispatcher: Arc<Dispatcher>,
    ready: ReadyGate,
    liveness: HealthHandle,
}

impl Coordinator {
    pub fn new(
        config: KafkaConfig,
        handler: Arc<ClaimHandler>,
        dispatcher: Arc<Dispatcher>,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            config,
            handler,
            dispatcher,
            ready: ReadyGate::new(),
            liveness,
        }
    }

    /// Block until the first group-join attempt is underway.
    pub async fn wait_ready(&self) {
        self.ready.wait_ready().await;
    }

    /// Consume until the shutdown signal flips. Session errors (broker
    /// unavailable, group errors) are not fatal: the gate is reset and the
    /// join is re-issued with no backoff.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        loop {
            if *shutdown.borrow() {
                info!("shutdown requested, stopping consumer");
                return Ok(());
            }

            self.ready.reset();
            match self.consume_session(&mut shutdown).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    metrics::counter!("bridge_consumer_rejoins_total").increment(1);
                    error!(%error, "consumer session failed, rejoining group");
                }
            }
        }
    }

    /// One group session: subscribe, then pull and dispatch messages until
    /// the session errors out or shutdown is requested.
    async fn consume_session(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), WorkerError> {
        let consumer = self.create_consumer()?;
        consumer.subscribe(&[self.config.kafka_topic.as_str()])?;
        self.ready.set_ready();
        info!(
            group = %self.config.kafka_group_name,
            topic = %self.config.kafka_topic,
            "joining consumer group"
        );

        let mut liveness_interval = tokio::time::interval(LIVENESS_REPORT_INTERVAL);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown requested, leaving consumer group");
                        return Ok(());
                    }
                }
                _ = liveness_interval.tick() => {
                    self.liveness.report_healthy();
                }
                message = consumer.recv() => {
                    let message = message?;
                    self.handle_message(&consumer, &message).await;
                }
            }
        }
    }

    async fn handle_message(
        &self,
        consumer: &StreamConsumer<CoordinatorContext>,
        message: &BorrowedMessage<'_>,
    ) {
        let partition = message.partition();
        let payload = message.payload().unwrap_or_default();

        metrics::counter!("bridge_messages_consumed_total").increment(1);
        if let Err(error) = self.dispatcher.dispatch(partition, payload).await {
            metrics::counter!("bridge_dispatch_failures_total").increment(1);
            error!(partition, %error, "failed to dispatch message");
        }

        // Stored exactly once, success or failure: delivery to the provider
        // is at-most-once and the queue never redelivers a handled message.
        if let Err(error) = consumer.store_offset(message.topic(), partition, message.offset()) {
            error!(partition, %error, "failed to store offset");
        }
    }

    fn create_consumer(&self) -> Result<StreamConsumer<CoordinatorContext>, WorkerError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.config.kafka_hosts)
            .set("group.id", &self.config.kafka_group_name)
            .set("statistics.interval.ms", "10000")
            .set("enable.auto.offset.store", "false");

        if self.config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let context = CoordinatorContext {
            handler: self.handler.clone(),
            rt_handle: Handle::current(),
        };
        Ok(client_config.create_with_context(context)?)
    }
}

#[cfg(test)]
mod tests {
    use bridge_common::session::MemorySessionStore;
    use bridge_common::test_utils::RecordingApi;

    use super::*;

    #[tokio::test]
    async fn gate_blocks_until_set() {
        let gate = Arc::new(ReadyGate::new());
        assert!(!gate.is_ready());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_ready().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        gate.set_ready();
        waiter.await.unwrap();
        assert!(gate.is_ready());
    }

    #[tokio::test]
    async fn gate_resets_for_the_next_cycle() {
        let gate = ReadyGate::new();
        gate.set_ready();
        gate.reset();
        assert!(!gate.is_ready());

        // A wait started after the reset still completes on the next set.
        gate.set_ready();
        gate.wait_ready().await;
    }

    #[tokio::test]
    async fn claim_opens_one_subscription_per_resolvable_partition() {
        let store = Arc::new(MemorySessionStore::default());
        store.upsert(2, "tok-2").await.unwrap();
        // partition 5 has no session on purpose
        let api = Arc::new(RecordingApi::default());
        let supervisor = Arc::new(SubscriptionSupervisor::new(api.clone()));
        let handler = ClaimHandler::new(store, supervisor.clone());

        handler.on_claim(&[2, 5]).await;
        tokio::task::yield_now().await;

        assert_eq!(supervisor.open_partitions().await, vec![2]);
        assert_eq!(api.subscribed.lock().unwrap().as_slice(), &["tok-2"]);
    }

    #[tokio::test]
    async fn unresolvable_partition_does_not_block_the_rest_of_the_claim() {
        let store = Arc::new(MemorySessionStore::default());
        store.upsert(2, "tok-2").await.unwrap();
        let api = Arc::new(RecordingApi::default());
        let supervisor = Arc::new(SubscriptionSupervisor::new(api.clone()));
        let handler = ClaimHandler::new(store, supervisor.clone());

        // Lookup miss on 5 comes first and must not stop 2 from opening.
        handler.on_claim(&[5, 2]).await;
        tokio::task::yield_now().await;

        assert_eq!(supervisor.open_partitions().await, vec![2]);
    }

    #[tokio::test]
    async fn run_observes_shutdown_at_loop_top_before_joining() {
        let store = Arc::new(MemorySessionStore::default());
        let api = Arc::new(RecordingApi::default());
        let supervisor = Arc::new(SubscriptionSupervisor::new(api.clone()));
        let handler = Arc::new(ClaimHandler::new(store.clone(), supervisor));
        let dispatcher = Arc::new(crate::dispatch::Dispatcher::new(store, api));
        let registry = bridge_common::health::HealthRegistry::new("liveness");

        let coordinator = Coordinator::new(
            KafkaConfig {
                kafka_hosts: "localhost:9092".to_string(),
                kafka_topic: "conversation_create".to_string(),
                kafka_group_name: "conversation_bridge".to_string(),
                kafka_tls: false,
                kafka_producer_linger_ms: 20,
                kafka_message_timeout_ms: 10000,
            },
            handler,
            dispatcher,
            registry.register("consume_loop", time::Duration::seconds(60)),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send_replace(true);

        // Already-requested shutdown short-circuits before any join attempt.
        coordinator.run(shutdown_rx).await.unwrap();
        assert!(!coordinator.ready.is_ready());
    }

    #[tokio::test]
    async fn revoke_stops_only_the_lost_partitions() {
        let store = Arc::new(MemorySessionStore::default());
        store.upsert(2, "tok-2").await.unwrap();
        store.upsert(5, "tok-5").await.unwrap();
        let api = Arc::new(RecordingApi::default());
        let supervisor = Arc::new(SubscriptionSupervisor::new(api));
        let handler = ClaimHandler::new(store, supervisor.clone());

        handler.on_claim(&[2, 5]).await;
        handler.on_revoke(&[5]).await;

        assert_eq!(supervisor.open_partitions().await, vec![2]);
    }
}
