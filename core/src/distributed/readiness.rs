// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Readiness orchestrator (C7): polls fleet composition and fires a
//! one-shot side effect on the first false→true transition of a declared
//! quorum predicate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::distributed::registry::WorkerRegistry;
use crate::distributed::types::FabricError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const READY_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const READY_CALLBACK_RETRY_BUDGET: u32 = 1;

/// A side effect fired once the fleet first satisfies readiness.
#[async_trait]
pub trait ReadyCallback: Send + Sync {
    async fn on_ready(&self) -> Result<(), FabricError>;
}

/// Quorum predicate: "at least one online worker for each of these
/// service types."
pub struct ServiceQuorum {
    pub required_services: Vec<String>,
}

impl ServiceQuorum {
    fn is_satisfied(&self, registry: &WorkerRegistry) -> bool {
        self.required_services
            .iter()
            .all(|svc| !registry.find_workers_for_service(svc).is_empty())
    }
}

/// Polls `registry` against a [`ServiceQuorum`] and fires `callback` once,
/// on the first observed false→true transition. Refires on a later
/// false→true only if `allow_refire` is set.
pub struct ReadinessOrchestrator {
    registry: Arc<WorkerRegistry>,
    quorum: ServiceQuorum,
    callback: Arc<dyn ReadyCallback>,
    poll_interval: Duration,
    allow_refire: bool,
    previously_ready: AtomicBool,
    has_fired: AtomicBool,
}

impl ReadinessOrchestrator {
    #[must_use]
    pub fn new(
        registry: Arc<WorkerRegistry>,
        quorum: ServiceQuorum,
        callback: Arc<dyn ReadyCallback>,
    ) -> Self {
        Self {
            registry,
            quorum,
            callback,
            poll_interval: DEFAULT_POLL_INTERVAL,
            allow_refire: false,
            previously_ready: AtomicBool::new(false),
            has_fired: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_allow_refire(mut self, allow_refire: bool) -> Self {
        self.allow_refire = allow_refire;
        self
    }

    /// Evaluate the predicate once, firing the callback if this is a
    /// qualifying false→true transition. Returns whether the fleet is
    /// ready *after* this check.
    pub async fn check_once(&self) -> bool {
        let is_ready = self.quorum.is_satisfied(&self.registry);
        let was_ready = self.previously_ready.swap(is_ready, Ordering::SeqCst);

        if is_ready && !was_ready {
            let should_fire = !self.has_fired.load(Ordering::SeqCst) || self.allow_refire;
            if should_fire {
                self.fire().await;
                self.has_fired.store(true, Ordering::SeqCst);
            }
        }
        is_ready
    }

    async fn fire(&self) {
        let mut attempts_left = 1 + READY_CALLBACK_RETRY_BUDGET;
        loop {
            attempts_left -= 1;
            match tokio::time::timeout(READY_CALLBACK_TIMEOUT, self.callback.on_ready()).await {
                Ok(Ok(())) => {
                    info!("readiness callback fired successfully");
                    return;
                }
                Ok(Err(err)) => warn!(%err, attempts_left, "readiness callback failed"),
                Err(_) => warn!(attempts_left, "readiness callback timed out"),
            }
            if attempts_left == 0 {
                warn!("readiness callback exhausted its retry budget");
                return;
            }
        }
    }

    /// Run the poll loop forever.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            self.check_once().await;
        }
    }
}
