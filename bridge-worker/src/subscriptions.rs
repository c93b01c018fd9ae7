use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use bridge_common::salesforce::ConversationApi;

/// Cancellation handle for one running push-subscription unit.
struct SubscriptionHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Runs one push-subscription unit per currently owned partition.
///
/// Handles are retained so that losing a partition deterministically stops
/// the matching unit. Units are independent: one failing stream never
/// affects another, and a failed unit is only restarted by a later claim.
pub struct SubscriptionSupervisor {
    api: Arc<dyn ConversationApi>,
    units: Mutex<HashMap<i32, SubscriptionHandle>>,
}

impl SubscriptionSupervisor {
    pub fn new(api: Arc<dyn ConversationApi>) -> Self {
        Self {
            api,
            units: Mutex::new(HashMap::new()),
        }
    }

    /// Open a unit for a claimed partition. An existing unit for the same
    /// partition is stopped first, so a rapid revoke→assign of one
    /// partition cannot leak a second stream.
    pub async fn open(&self, partition: i32, token: String) {
        let mut units = self.units.lock().await;
        if let Some(previous) = units.remove(&partition) {
            stop_unit(partition, previous).await;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let api = self.api.clone();
        let task = tokio::spawn(async move {
            run_unit(api, partition, token, shutdown_rx).await;
        });

        units.insert(
            partition,
            SubscriptionHandle {
                shutdown: shutdown_tx,
                task,
            },
        );
        metrics::gauge!("bridge_subscription_units").set(units.len() as f64);
    }

    /// Stop the unit for a revoked partition. A partition without a unit is
    /// a no-op.
    pub async fn close(&self, partition: i32) {
        let handle = {
            let mut units = self.units.lock().await;
            let handle = units.remove(&partition);
            metrics::gauge!("bridge_subscription_units").set(units.len() as f64);
            handle
        };

        match handle {
            Some(handle) => stop_unit(partition, handle).await,
            None => info!(partition, "no push subscription to stop"),
        }
    }

    /// Best-effort teardown of every unit, for process shutdown.
    pub async fn close_all(&self) {
        let handles: Vec<(i32, SubscriptionHandle)> =
            self.units.lock().await.drain().collect();
        for (partition, handle) in handles {
            stop_unit(partition, handle).await;
        }
    }

    /// Partitions that currently have a registered unit.
    pub async fn open_partitions(&self) -> Vec<i32> {
        let mut partitions: Vec<i32> = self.units.lock().await.keys().copied().collect();
        partitions.sort_unstable();
        partitions
    }
}

async fn stop_unit(partition: i32, handle: SubscriptionHandle) {
    // A dead unit has already dropped its receiver; that is fine.
    let _ = handle.shutdown.send(());
    if let Err(error) = handle.task.await {
        error!(partition, %error, "push subscription task panicked");
    }
    info!(partition, "push subscription stopped");
}

/// Body of one subscription unit: open the stream, then read it until the
/// remote closes it or the partition is revoked.
async fn run_unit(
    api: Arc<dyn ConversationApi>,
    partition: i32,
    token: String,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut events = tokio::select! {
        _ = &mut shutdown_rx => return,
        subscribed = api.subscribe(&token) => match subscribed {
            Ok(events) => events,
            Err(error) => {
                metrics::counter!("bridge_subscription_failures_total").increment(1);
                error!(partition, %error, "failed to open push subscription");
                return;
            }
        },
    };

    info!(partition, "push subscription established");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!(partition, "push subscription cancelled");
                return;
            }
            event = events.next() => match event {
                Some(Ok(event)) => {
                    metrics::counter!("bridge_push_events_total").increment(1);
                    info!(
                        partition,
                        event = %event.event,
                        data = %event.data,
                        "push event received"
                    );
                }
                Some(Err(error)) => {
                    metrics::counter!("bridge_subscription_failures_total").increment(1);
                    error!(partition, %error, "push subscription failed");
                    return;
                }
                None => {
                    warn!(partition, "push subscription closed by remote");
                    return;
                }
            }
        }
    }
}
