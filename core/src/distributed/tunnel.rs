// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tunnel manager (C2): owns one `cloudflared` child process exposing
//! `http://localhost:<port>` at a public HTTPS URL, or wraps an externally
//! supplied URL in lieu of spawning one.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::distributed::types::FabricError;

/// Matches the hosted ad-hoc tunnel URL `cloudflared` prints to stderr,
/// e.g. `https://some-words-here.trycloudflare.com`.
fn tunnel_url_pattern() -> Regex {
    Regex::new(r"https://[a-z0-9-]+\.trycloudflare\.com").expect("static regex is valid")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TunnelState {
    Pending,
    Healthy,
    Unhealthy,
    Stopped,
}

struct Inner {
    url: Option<String>,
    state: TunnelState,
    port: u16,
}

/// Owns a `cloudflared` subprocess (or an externally provided URL) and
/// reports its public URL and health.
pub struct TunnelManager {
    inner: RwLock<Inner>,
    child: parking_lot::Mutex<Option<Child>>,
    external: bool,
}

impl TunnelManager {
    /// Wrap an externally provided tunnel URL (e.g. from an environment
    /// variable). `is_healthy` is true as long as the URL is non-empty; no
    /// child process is spawned.
    #[must_use]
    pub fn external(url: impl Into<String>) -> Self {
        let url = url.into();
        let state = if url.is_empty() {
            TunnelState::Unhealthy
        } else {
            TunnelState::Healthy
        };
        Self {
            inner: RwLock::new(Inner {
                url: if url.is_empty() { None } else { Some(url) },
                state,
                port: 0,
            }),
            child: parking_lot::Mutex::new(None),
            external: true,
        }
    }

    /// Launch `cloudflared tunnel --url http://localhost:<port> --no-autoupdate`
    /// and wait up to `timeout_s` for the URL to appear on its stderr.
    ///
    /// Fails with [`FabricError::TunnelUnavailable`] if the binary cannot be
    /// spawned, or [`FabricError::TunnelTimeout`] if no URL appears before
    /// the deadline. Retries, if desired, are the caller's responsibility.
    pub async fn create_tunnel(port: u16, timeout_s: u64) -> Result<Arc<Self>, FabricError> {
        let mut child = Command::new("cloudflared")
            .args([
                "tunnel",
                "--url",
                &format!("http://localhost:{port}"),
                "--no-autoupdate",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FabricError::TunnelUnavailable(e.to_string()))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FabricError::TunnelUnavailable("no stderr pipe".to_string()))?;

        let deadline = Duration::from_secs(timeout_s);
        let found_url = timeout(deadline, Self::scan_for_url(stderr))
            .await
            .map_err(|_| FabricError::TunnelTimeout(deadline))?;

        let manager = Self {
            inner: RwLock::new(Inner {
                url: found_url.clone(),
                state: if found_url.is_some() {
                    TunnelState::Healthy
                } else {
                    TunnelState::Unhealthy
                },
                port,
            }),
            child: parking_lot::Mutex::new(Some(child)),
            external: false,
        };

        match found_url {
            Some(_) => Ok(Arc::new(manager)),
            None => Err(FabricError::TunnelTimeout(deadline)),
        }
    }

    async fn scan_for_url(stderr: tokio::process::ChildStderr) -> Option<String> {
        let pattern = tunnel_url_pattern();
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(found) = pattern.find(&line) {
                return Some(found.as_str().to_string());
            }
        }
        None
    }

    /// Current public URL, if one was obtained.
    #[must_use]
    pub fn get_tunnel_url(&self) -> Option<String> {
        self.inner.read().url.clone()
    }

    /// Whether the tunnel is currently usable. For externally provided
    /// URLs this is true as long as the URL is non-empty.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.inner.read().state == TunnelState::Healthy
    }

    /// Mark the tunnel unhealthy without stopping it; used by the worker
    /// agent when it observes the child process has exited.
    pub fn mark_unhealthy(&self) {
        if !self.external {
            self.inner.write().state = TunnelState::Unhealthy;
        }
    }

    /// Stop the child process, if any. Idempotent.
    pub async fn stop(&self) {
        if self.external {
            self.inner.write().state = TunnelState::Stopped;
            return;
        }
        let mut guard = self.child.lock();
        if let Some(mut child) = guard.take() {
            let _ = child.start_kill();
        }
        drop(guard);
        self.inner.write().state = TunnelState::Stopped;
    }

    /// Snapshot of `{url, healthy, port}` for status reporting.
    #[must_use]
    pub fn get_metrics(&self) -> TunnelMetrics {
        let inner = self.inner.read();
        TunnelMetrics {
            url: inner.url.clone(),
            healthy: inner.state == TunnelState::Healthy,
            port: inner.port,
        }
    }
}

/// Point-in-time tunnel status.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TunnelMetrics {
    pub url: Option<String>,
    pub healthy: bool,
    pub port: u16,
}
