//! Queue-side worker: owns the consumer-group membership, forwards queued
//! conversation requests to the provider, and keeps one push subscription
//! open per owned partition.
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;
use tokio::sync::watch;
use tracing::{error, info};

use bridge_common::health::{HealthHandle, HealthRegistry};
use bridge_common::lifecycle::SessionLifecycle;
use bridge_common::metrics::{serve, setup_metrics_routes};
use bridge_common::salesforce::{ConversationApi, SalesforceClient};
use bridge_common::session::SessionStore;
use bridge_common::store::MongoSessionStore;

use crate::config::Config;
use crate::coordinator::{ClaimHandler, Coordinator};
use crate::dispatch::Dispatcher;
use crate::error::WorkerError;
use crate::subscriptions::SubscriptionSupervisor;

mod config;
mod coordinator;
mod dispatch;
mod error;
mod subscriptions;

async fn index() -> &'static str {
    "conversation-bridge worker"
}

/// Run the continuation-token refresh pass on a fixed interval. Failures
/// are logged and retried on the next tick; the registry heals itself.
async fn refresh_loop(lifecycle: SessionLifecycle, interval_secs: u64, liveness: HealthHandle) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        liveness.report_healthy();

        match lifecycle.refresh_all().await {
            Ok(outcomes) => {
                let failed: Vec<i32> = outcomes
                    .iter()
                    .filter(|o| !o.succeeded())
                    .map(|o| o.partition)
                    .collect();
                if !failed.is_empty() {
                    error!(?failed, "scheduled refresh left partitions unrenewed");
                }
            }
            Err(error) => error!(%error, "scheduled refresh could not scan the registry"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");
    let liveness = HealthRegistry::new("liveness");

    let store: Arc<dyn SessionStore> = Arc::new(
        MongoSessionStore::connect(&config.mongo)
            .await
            .expect("failed to connect to session store"),
    );
    let salesforce: Arc<dyn ConversationApi> = Arc::new(
        SalesforceClient::new(&config.salesforce)
            .expect("failed to build conversation API client"),
    );

    let supervisor = Arc::new(SubscriptionSupervisor::new(salesforce.clone()));
    let handler = Arc::new(ClaimHandler::new(store.clone(), supervisor.clone()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), salesforce.clone()));

    let consume_liveness = liveness.register("consume_loop", time::Duration::seconds(60));
    let coordinator = Arc::new(Coordinator::new(
        config.kafka.clone(),
        handler,
        dispatcher,
        consume_liveness,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for termination signal: {}", e);
        }
        info!("termination signal received");
        shutdown_tx.send_replace(true);
    });

    // Scheduled token renewal, independent of message traffic.
    let lifecycle = SessionLifecycle::new(store, salesforce, config.partition_count);
    let refresh_liveness = liveness.register(
        "refresh_task",
        time::Duration::seconds(2 * config.refresh_interval_secs as i64 + 60),
    );
    tokio::spawn(refresh_loop(
        lifecycle,
        config.refresh_interval_secs,
        refresh_liveness,
    ));

    // Liveness and metrics listener.
    let status_registry = liveness.clone();
    let router = Router::new()
        .route("/", get(index))
        .route(
            "/_liveness",
            get(move || std::future::ready(status_registry.get_status())),
        );
    let router = setup_metrics_routes(router);
    let bind = config.bind();
    tokio::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!("failed to start liveness listener: {}", e);
        }
    });

    let consume = {
        let coordinator = coordinator.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { coordinator.run(shutdown).await })
    };

    coordinator.wait_ready().await;
    info!("consumer group join underway");

    let result = consume.await.expect("consume loop panicked");
    supervisor.close_all().await;
    result
}
