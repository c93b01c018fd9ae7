use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

/// Liveness reporting for the long-running loops of the bridge.
///
/// Both binaries run several independent loops (consume loop, subscription
/// units, refresh task). Each registers a component here and must re-report
/// healthy before its deadline; a component that stops reporting flips the
/// whole process to unhealthy so the orchestrator restarts it.
#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Registered but has not reported yet.
    Starting,
    /// Healthy until the deadline passes without a new report.
    HealthyUntil(OffsetDateTime),
    /// Reported unhealthy explicitly.
    Unhealthy,
    /// Deadline passed without a report.
    Stalled,
}

/// Handed to one component so it can report its own status.
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
}

#[derive(Default, Debug)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Register a component; the returned handle must report healthy more
    /// often than the given deadline.
    pub fn register(&self, component: &str, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component: component.to_owned(),
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Combined process status; usable directly as an axum handler result.
    /// A registry with no registered component reports unhealthy.
    pub fn get_status(&self) -> HealthStatus {
        let components = self.components.read().expect("poisoned health lock");
        let now = OffsetDateTime::now_utc();

        let mut status = HealthStatus {
            healthy: !components.is_empty(),
            components: HashMap::with_capacity(components.len()),
        };
        for (name, component) in components.iter() {
            let effective = match component {
                ComponentStatus::HealthyUntil(until) if until.gt(&now) => component.clone(),
                ComponentStatus::HealthyUntil(_) => ComponentStatus::Stalled,
                other => other.clone(),
            };
            if !matches!(effective, ComponentStatus::HealthyUntil(_)) {
                status.healthy = false;
            }
            status.components.insert(name.clone(), effective);
        }

        match status.healthy {
            true => info!("{} health check ok", self.name),
            false => warn!("{} health check failed: {:?}", self.name, status.components),
        }
        status
    }
}

impl HealthHandle {
    /// Report healthy until the component's deadline from now.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().add(self.deadline),
        ));
    }

    pub fn report_status(&self, status: ComponentStatus) {
        let mut components = self.components.write().expect("poisoned health lock");
        components.insert(self.component.clone(), status);
    }
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Sub;

    use super::*;

    #[test]
    fn empty_registry_is_unhealthy() {
        let registry = HealthRegistry::new("liveness");
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn component_lifecycle_drives_overall_status() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("consume_loop", Duration::seconds(30));

        // Starting counts as unhealthy until the first report.
        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("consume_loop"),
            Some(&ComponentStatus::Starting)
        );

        handle.report_healthy();
        assert!(registry.get_status().healthy);

        handle.report_status(ComponentStatus::Unhealthy);
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn stale_report_counts_as_stalled() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("refresh_task", Duration::seconds(30));

        handle.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().sub(Duration::seconds(1)),
        ));

        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("refresh_task"),
            Some(&ComponentStatus::Stalled)
        );
    }

    #[test]
    fn any_unhealthy_component_fails_the_process() {
        let registry = HealthRegistry::new("liveness");
        let consume = registry.register("consume_loop", Duration::seconds(30));
        let refresh = registry.register("refresh_task", Duration::seconds(30));

        consume.report_healthy();
        refresh.report_healthy();
        assert!(registry.get_status().healthy);

        refresh.report_status(ComponentStatus::Unhealthy);
        assert!(!registry.get_status().healthy);

        refresh.report_healthy();
        assert!(registry.get_status().healthy);
    }

    #[test]
    fn status_maps_to_http_codes() {
        let unhealthy = HealthStatus::default().into_response();
        assert_eq!(unhealthy.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let healthy = HealthStatus {
            healthy: true,
            components: Default::default(),
        }
        .into_response();
        assert_eq!(healthy.status(), StatusCode::OK);
    }
}
