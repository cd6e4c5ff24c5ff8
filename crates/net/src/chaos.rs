//! Fault injection around a dialer.
//!
//! [`ChaosDialer`] wraps any [`Dialer`] and injects configurable failures
//! into connection setup: random errors, latency, and partitions that make
//! chosen tablets unreachable.

use crate::transport::Dialer;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tmrpc_common::{DialError, RemoteEndpoint, TabletAlias};
use tokio::sync::RwLock;
use tokio::time::Duration;

/// Configuration for chaos injection.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Probability of failing a dial \[0.0, 1.0\].
    pub failure_rate: f64,
    /// Fixed latency injected before dialing.
    pub latency: Duration,
    /// Random additional latency in \[0, jitter\].
    pub jitter: Duration,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

/// A dialer wrapper that injects chaos (latency, failures, partitions).
///
/// Injected latency counts against the dial timeout: if it would overrun
/// the timeout the dial fails with [`DialError::TimedOut`] once the timeout
/// has elapsed.
pub struct ChaosDialer<D: Dialer> {
    inner: Arc<D>,
    config: Arc<RwLock<ChaosConfig>>,
    /// Tablets that cannot be reached.
    partitions: Arc<RwLock<HashSet<TabletAlias>>>,
}

impl<D: Dialer> std::fmt::Debug for ChaosDialer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosDialer").finish_non_exhaustive()
    }
}

impl<D: Dialer> Clone for ChaosDialer<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: self.config.clone(),
            partitions: self.partitions.clone(),
        }
    }
}

impl<D: Dialer> ChaosDialer<D> {
    pub fn new(inner: D, config: ChaosConfig) -> Self {
        Self {
            inner: Arc::new(inner),
            config: Arc::new(RwLock::new(config)),
            partitions: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Dynamically update the failure rate.
    pub async fn set_failure_rate(&self, rate: f64) {
        self.config.write().await.failure_rate = rate;
    }

    /// Dynamically update the injected latency.
    pub async fn set_latency(&self, latency: Duration) {
        self.config.write().await.latency = latency;
    }

    /// Make `alias` unreachable.
    pub async fn add_partition(&self, alias: TabletAlias) {
        self.partitions.write().await.insert(alias);
    }

    pub async fn remove_partition(&self, alias: &TabletAlias) {
        self.partitions.write().await.remove(alias);
    }

    /// Remove all partitions.
    pub async fn heal_all(&self) {
        self.partitions.write().await.clear();
    }
}

#[async_trait::async_trait]
impl<D: Dialer> Dialer for ChaosDialer<D> {
    type Conn = D::Conn;

    async fn dial(
        &self,
        endpoint: &RemoteEndpoint,
        timeout: Option<Duration>,
    ) -> Result<D::Conn, DialError> {
        if self.partitions.read().await.contains(&endpoint.alias) {
            return Err(DialError::Connect {
                addr: endpoint.addr.clone(),
                reason: "chaos: partitioned".into(),
            });
        }

        let (delay, failure_rate) = {
            let config = self.config.read().await;
            let jitter_ms = if config.jitter.is_zero() {
                0
            } else {
                rand::thread_rng().gen_range(0..=config.jitter.as_millis() as u64)
            };
            (
                config.latency + Duration::from_millis(jitter_ms),
                config.failure_rate,
            )
        };

        if !delay.is_zero() {
            match timeout {
                Some(timeout) if delay >= timeout => {
                    tokio::time::sleep(timeout).await;
                    return Err(DialError::TimedOut {
                        addr: endpoint.addr.clone(),
                        timeout,
                    });
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        if failure_rate > 0.0 && rand::thread_rng().gen_bool(failure_rate.min(1.0)) {
            return Err(DialError::Connect {
                addr: endpoint.addr.clone(),
                reason: "chaos: random failure".into(),
            });
        }

        let remaining = timeout.map(|t| t.saturating_sub(delay));
        self.inner.dial(endpoint, remaining).await
    }
}

// ────────────────────────── Tests ──────────────────────────
