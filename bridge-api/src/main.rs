//! HTTP intake for the conversation bridge: validates create requests,
//! queues them, and exposes the token acquire/refresh passes.
use std::sync::Arc;

use envconfig::Envconfig;

use bridge_common::lifecycle::SessionLifecycle;
use bridge_common::metrics::{serve, setup_metrics_routes};
use bridge_common::salesforce::{ConversationApi, SalesforceClient};
use bridge_common::session::SessionStore;
use bridge_common::store::MongoSessionStore;

use crate::config::Config;
use crate::publish::{KafkaPublisher, PrintPublisher, RequestPublisher};

mod api;
mod config;
mod conversation;
mod publish;
mod router;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let store: Arc<dyn SessionStore> = Arc::new(
        MongoSessionStore::connect(&config.mongo)
            .await
            .expect("failed to connect to session store"),
    );
    let salesforce: Arc<dyn ConversationApi> = Arc::new(
        SalesforceClient::new(&config.salesforce)
            .expect("failed to build conversation API client"),
    );
    let lifecycle = Arc::new(SessionLifecycle::new(
        store,
        salesforce,
        config.partition_count,
    ));

    let publisher: Arc<dyn RequestPublisher> = if config.print_publisher {
        Arc::new(PrintPublisher)
    } else {
        Arc::new(KafkaPublisher::new(&config.kafka).expect("failed to create kafka producer"))
    };

    let app = router::router(publisher, lifecycle);
    let app = setup_metrics_routes(app);

    match serve(app, &config.bind()).await {
        Ok(_) => {}
        Err(e) => tracing::error!("failed to start bridge-api http server, {}", e),
    }
}
