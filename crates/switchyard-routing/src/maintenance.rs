//! Periodic router maintenance
//!
//! The router asks to be called back every
//! [`RouterConfig::timer_interval`](crate::RouterConfig::timer_interval).
//! Containers with their own timer wheel call
//! [`NodeHandler::on_timer_fire`](switchyard_core::NodeHandler::on_timer_fire)
//! directly; others spawn a [`MaintenanceTask`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, trace};

use switchyard_core::NodeHandler;

use crate::router::RouterNode;

impl RouterNode {
    /// One maintenance tick; returns the delay until the next one
    pub(crate) fn maintenance_tick(&self) -> Duration {
        let stats = {
            let mut state = self.state.lock();
            state.stats.timer_fires += 1;
            state.stats.last_maintenance = Some(Utc::now());
            state.snapshot()
        };
        trace!(
            router = %self.identity(),
            addresses = stats.addresses,
            in_links = stats.in_links,
            out_links = stats.out_links,
            in_flight = stats.in_flight,
            received = stats.received,
            "Router maintenance"
        );
        self.config().timer_interval()
    }
}

/// Background task driving the router's maintenance timer
pub struct MaintenanceTask {
    router: Arc<RouterNode>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl MaintenanceTask {
    pub fn new(router: Arc<RouterNode>, shutdown_rx: broadcast::Receiver<()>) -> Self {
        Self {
            router,
            shutdown_rx,
        }
    }

    /// Spawn the task on the current tokio runtime
    pub fn spawn(router: Arc<RouterNode>, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let task = Self::new(router, shutdown_rx);
        tokio::spawn(async move {
            task.run().await;
        })
    }

    async fn run(mut self) {
        let mut next = self.router.config().timer_interval();
        info!(
            router = %self.router.identity(),
            interval_ms = next.as_millis() as u64,
            "Maintenance task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!(router = %self.router.identity(), "Maintenance task shutting down");
                    break;
                }
                _ = tokio::time::sleep(next) => {
                    next = self.router.on_timer_fire();
                }
            }
        }
    }
}
