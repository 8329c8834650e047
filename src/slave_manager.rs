//! Slave Manager
//!
//! Keeps the pool of known slaves, health-checks them with ping RPCs and
//! hands out the next live one in round-robin order.
//!
//! Two locks: `refresh_lock` serializes pool reloads, `pool` serializes
//! selection (and guards the cursor). A slave that fails its selection ping
//! is marked dead and stays out of rotation until the next refresh.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::SlaveData;
use crate::error::SlaveError;
use crate::rpc::RpcClient;
use crate::storage::Storage;

/// Upper bound for a ping once connected
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Liveness check for one slave
#[async_trait]
pub trait SlaveProbe: Send + Sync {
    async fn ping(&self, slave: &SlaveData) -> bool;
}

/// Pings slaves over RPC
pub struct RpcProbe;

#[async_trait]
impl SlaveProbe for RpcProbe {
    async fn ping(&self, slave: &SlaveData) -> bool {
        let client = match RpcClient::connect(&slave.address).await {
            Ok(client) => client,
            Err(e) => {
                debug!("Slave {} unreachable: {}", slave.name, e);
                return false;
            }
        };
        let alive = match tokio::time::timeout(PING_TIMEOUT, client.ping()).await {
            Ok(Ok(reply)) => {
                debug!("Slave {} answered ping in {}ns", slave.name, reply.delta);
                true
            }
            Ok(Err(e)) => {
                debug!("Slave {} ping failed: {}", slave.name, e);
                false
            }
            Err(_) => {
                debug!("Slave {} ping timed out", slave.name);
                false
            }
        };
        if let Err(e) = client.close().await {
            debug!("Closing probe connection to slave {}: {}", slave.name, e);
        }
        alive
    }
}

struct SlavePool {
    slaves: Vec<SlaveData>,
    cursor: usize,
}

pub struct SlaveManager {
    storage: Arc<dyn Storage>,
    probe: Arc<dyn SlaveProbe>,
    refresh_lock: Mutex<()>,
    pool: Mutex<SlavePool>,
    active_count: AtomicUsize,
}

impl SlaveManager {
    pub fn new(storage: Arc<dyn Storage>, probe: Arc<dyn SlaveProbe>) -> Self {
        Self {
            storage,
            probe,
            refresh_lock: Mutex::new(()),
            pool: Mutex::new(SlavePool {
                slaves: Vec::new(),
                cursor: 0,
            }),
            active_count: AtomicUsize::new(0),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Reload the pool from storage and ping every enabled slave.
    ///
    /// Returns the number of live slaves. Resets the round-robin cursor.
    pub async fn refresh_slaves(&self) -> Result<usize, SlaveError> {
        let _guard = self.refresh_lock.lock().await;

        let mut slaves = self.storage.slaves().await?;
        let probes = slaves.iter().map(|slave| async move {
            slave.enabled && self.probe.ping(slave).await
        });
        let alive = join_all(probes).await;
        for (slave, alive) in slaves.iter_mut().zip(alive) {
            if slave.active && !alive {
                warn!("Slave {} ({}) is down", slave.name, slave.address);
            }
            slave.active = alive;
        }
        let active = slaves.iter().filter(|s| s.active).count();

        let mut pool = self.pool.lock().await;
        pool.slaves = slaves;
        pool.cursor = 0;
        self.active_count.store(active, Ordering::SeqCst);
        info!(
            "Refreshed slave pool: {}/{} active",
            active,
            pool.slaves.len()
        );
        Ok(active)
    }

    /// Next live slave after the cursor, pinging it first.
    pub async fn get_active_slave(&self) -> Result<SlaveData, SlaveError> {
        if self.active_count() == 0 {
            self.refresh_slaves().await?;
        }

        let mut pool = self.pool.lock().await;
        let len = pool.slaves.len();
        for step in 0..len {
            let idx = (pool.cursor + step) % len;
            if !pool.slaves[idx].active {
                continue;
            }
            let candidate = pool.slaves[idx].clone();
            if self.probe.ping(&candidate).await {
                pool.cursor = (idx + 1) % len;
                debug!("Selected slave {} ({})", candidate.name, candidate.address);
                return Ok(candidate);
            }

            warn!(
                "Slave {} ({}) failed its ping, marking it dead",
                candidate.name, candidate.address
            );
            pool.slaves[idx].active = false;
            self.active_count.fetch_sub(1, Ordering::SeqCst);
        }
        Err(SlaveError::NoAvailableSlave)
    }

    /// Snapshot of the pool as of the last refresh or selection
    pub async fn slaves(&self) -> Vec<SlaveData> {
        self.pool.lock().await.slaves.clone()
    }
}
