// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Coordinator health monitor: a single background task that periodically
//! sweeps the worker registry for missed heartbeats, applying the
//! `online -> degraded -> offline -> evicted` state machine.

use super::registry::{WorkerRegistry, HEALTH_CHECK_INTERVAL};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

/// Minimum backoff applied when the monitor loop itself panics and is
/// restarted by its supervisor.
const SUPERVISOR_MIN_BACKOFF: Duration = Duration::from_secs(1);
/// Maximum backoff applied by the supervisor.
const SUPERVISOR_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Runs the registry health sweep on a fixed interval.
pub struct HealthMonitor {
    registry: WorkerRegistry,
    interval: Duration,
}

impl HealthMonitor {
    /// Create a monitor over `registry`, sweeping every `interval` (default
    /// 15s per the component design).
    #[must_use]
    pub fn new(registry: WorkerRegistry) -> Self {
        Self {
            registry,
            interval: HEALTH_CHECK_INTERVAL,
        }
    }

    /// Override the sweep interval, primarily for tests.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one sweep immediately, logging any evictions.
    pub fn sweep_once(&self) {
        let evicted = self.registry.sweep_health();
        for id in evicted {
            info!(worker_id = %id, "worker evicted after offline grace period");
        }
    }

    /// Run the sweep loop forever. Intended to be spawned as a
    /// `tokio::task` and wrapped by [`supervise`] so a panic inside a sweep
    /// restarts the loop rather than silently killing the task.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            self.sweep_once();
        }
    }
}

/// Spawn `monitor.run()` under a supervisor that restarts it with
/// exponential backoff (min 1s, max 60s) if the task panics, per the
/// "background loops -> supervised tasks" design note. Returns the
/// supervisor's own join handle; the inner loop never returns on its own.
pub fn spawn_supervised(monitor: Arc<HealthMonitor>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = SUPERVISOR_MIN_BACKOFF;
        loop {
            let task_monitor = Arc::clone(&monitor);
            let result = tokio::spawn(async move { task_monitor.run().await }).await;

            if let Err(join_err) = result {
                warn!(error = %join_err, ?backoff, "health monitor task exited unexpectedly, restarting");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(SUPERVISOR_MAX_BACKOFF);
            } else {
                // `run` never returns Ok; reaching here would mean a
                // deliberate exit, which we still restart with reset backoff.
                backoff = SUPERVISOR_MIN_BACKOFF;
            }
        }
    })
}
