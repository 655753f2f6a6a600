//! Heartbeat-driven liveness tracking.
//!
//! # Responsibilities
//! - Periodically probe every registered service on `<name>-info`
//! - Evict services after consecutive probe failures
//! - Sweep entries whose last contact exceeds the expiration age
//!
//! # Design Decisions
//! - Exactly one node runs the loop; it holds the scheduler lock for its
//!   process lifetime and releases it on shutdown
//! - Hysteresis: eviction needs `unhealthy_threshold` consecutive failures,
//!   a success resets the counter
//! - Probe failures are logged and recovered; nothing escapes a tick

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::cluster::LockGuard;
use crate::observability::metrics;
use crate::registry::model::now_millis;
use crate::registry::registry::{failure_counter_key, ServiceRegistry};

pub struct HeartbeatMonitor {
    registry: Arc<ServiceRegistry>,
    /// Scheduler election hold; released when the monitor stops.
    _scheduler_hold: LockGuard,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, scheduler_hold: LockGuard) -> Self {
        Self {
            registry,
            _scheduler_hold: scheduler_hold,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.registry.config().clone();
        let mut ping_ticker = time::interval(Duration::from_millis(config.ping_interval_ms));
        // First tick of a tokio interval fires immediately; skip it so a
        // service registered right after startup is not probed early.
        ping_ticker.tick().await;

        let sweep_every = config.sweep_interval_ms;
        let mut sweep_ticker = time::interval(Duration::from_millis(sweep_every.max(1)));
        sweep_ticker.tick().await;

        tracing::info!(
            ping_interval_ms = config.ping_interval_ms,
            timeout_ms = config.timeout_ms,
            unhealthy_threshold = config.unhealthy_threshold,
            "Heartbeat monitor starting"
        );

        loop {
            tokio::select! {
                _ = ping_ticker.tick() => {
                    self.probe_all().await;
                }
                _ = sweep_ticker.tick(), if sweep_every > 0 => {
                    self.sweep_expired().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Heartbeat monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One probe round over the whole directory.
    async fn probe_all(&self) {
        let holder = match self.registry.current().await {
            Ok(holder) => holder,
            Err(e) => {
                tracing::error!(error = %e, "Heartbeat round skipped: directory read failed");
                return;
            }
        };

        for info in holder.services {
            let name = info.service_name.clone();
            let alive = self
                .registry
                .cluster()
                .bus()
                .request(
                    &info.info_address(),
                    b"ping".to_vec(),
                    self.registry.probe_timeout(),
                )
                .await
                .is_ok();

            metrics::record_probe(&name, alive);

            if alive {
                self.registry.cluster().counters().reset(&failure_counter_key(&name));
                if let Err(e) = self.registry.record_contact(&name).await {
                    tracing::error!(service = %name, error = %e, "Failed to stamp last contact");
                }
            } else {
                let failures = self
                    .registry
                    .cluster()
                    .counters()
                    .increment(&failure_counter_key(&name));
                tracing::warn!(
                    service = %name,
                    consecutive_failures = failures,
                    "Heartbeat probe failed"
                );

                if failures >= self.registry.config().unhealthy_threshold {
                    if let Err(e) = self.registry.unregister(&name).await {
                        tracing::error!(service = %name, error = %e, "Eviction failed");
                    }
                }
            }
        }
    }

    /// Remove entries that have been silent longer than the expiration age.
    /// Catches services whose probes never ran, e.g. while no scheduler
    /// was elected.
    async fn sweep_expired(&self) {
        let holder = match self.registry.current().await {
            Ok(holder) => holder,
            Err(e) => {
                tracing::error!(error = %e, "Expiration sweep skipped: directory read failed");
                return;
            }
        };

        let cutoff = now_millis().saturating_sub(self.registry.config().expiration_age_ms);
        for info in holder.services {
            if info.last_connection < cutoff {
                tracing::warn!(
                    service = %info.service_name,
                    last_connection = info.last_connection,
                    "Sweeping expired service"
                );
                if let Err(e) = self.registry.unregister(&info.service_name).await {
                    tracing::error!(service = %info.service_name, error = %e, "Sweep eviction failed");
                }
            }
        }
    }
}
