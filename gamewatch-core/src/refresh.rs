//! Background refresh of the configured server list.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::aggregator::Aggregator;
use crate::models::{ConfiguredServer, ServerStatus, Snapshot};

/// Shared, always-readable slot holding the latest snapshot.
#[derive(Clone)]
pub struct SnapshotHolder {
    tx: Arc<watch::Sender<Arc<Snapshot>>>,
}

impl SnapshotHolder {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Snapshot::default()));
        Self { tx: Arc::new(tx) }
    }

    /// Last published snapshot. Never blocks on an in-flight refresh.
    pub fn read(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    fn publish(&self, snapshot: Snapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }
}

impl Default for SnapshotHolder {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the running flag on drop, including on cancellation.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Re-resolves a fixed server list on an interval and publishes the result.
#[derive(Clone)]
pub struct RefreshDriver {
    aggregator: Aggregator,
    servers: Arc<[ConfiguredServer]>,
    snapshot: SnapshotHolder,
    running: Arc<AtomicBool>,
    interval: Duration,
}

impl RefreshDriver {
    pub fn new(
        aggregator: Aggregator,
        servers: Vec<ConfiguredServer>,
        snapshot: SnapshotHolder,
        interval: Duration,
    ) -> Self {
        Self {
            aggregator,
            servers: servers.into(),
            snapshot,
            running: Arc::new(AtomicBool::new(false)),
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn snapshot(&self) -> &SnapshotHolder {
        &self.snapshot
    }

    /// Run one refresh. Returns `false` without doing anything if another
    /// refresh is still in flight.
    pub async fn refresh(&self) -> bool {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            debug!("refresh already in flight, skipping");
            return false;
        };

        let started = Instant::now();
        let identities: Vec<_> = self.servers.iter().map(|s| s.identity.clone()).collect();
        let records = self.aggregator.resolve_all(&identities).await;

        let servers: Vec<ServerStatus> = self
            .servers
            .iter()
            .zip(records)
            .map(|(server, status)| ServerStatus {
                id: server.id.clone(),
                name: server.name.clone(),
                status,
            })
            .collect();
        let online = servers.iter().filter(|s| s.status.online).count();

        debug!(
            servers = servers.len(),
            online,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot refreshed"
        );
        self.snapshot.publish(Snapshot {
            servers,
            captured_at: Some(Utc::now()),
        });
        true
    }

    /// Refresh immediately, then every interval until the handle is shut down
    /// or dropped. Ticks missed during a slow refresh are skipped.
    pub fn spawn(self) -> RefreshHandle {
        info!(
            servers = self.servers.len(),
            interval_ms = self.interval.as_millis() as u64,
            "starting background refresh"
        );
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        });
        RefreshHandle { task }
    }
}

/// Owner of the background refresh task.
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn shutdown(self) {
        self.task.abort();
        info!("background refresh stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
