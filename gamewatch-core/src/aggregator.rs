use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::cache::StatusCache;
use crate::error::QueryError;
use crate::models::{ServerIdentity, StatusRecord};
use crate::prober::Prober;

/// Default cap on probes running at the same time.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 64;

/// Resolves a batch of servers concurrently through the cache.
///
/// Cloning is cheap; clones share the cache, prober and concurrency limit.
#[derive(Clone)]
pub struct Aggregator {
    cache: Arc<StatusCache>,
    prober: Arc<Prober>,
    probe_limit: Arc<Semaphore>,
}

impl Aggregator {
    pub fn new(cache: Arc<StatusCache>, prober: Arc<Prober>, max_concurrent_probes: usize) -> Self {
        Self {
            cache,
            prober,
            probe_limit: Arc::new(Semaphore::new(max_concurrent_probes.max(1))),
        }
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    /// One record per identity, in input order, once every lookup has settled.
    pub async fn resolve_all(&self, identities: &[ServerIdentity]) -> Vec<StatusRecord> {
        debug!(count = identities.len(), "resolving servers");

        let tasks = identities.iter().cloned().map(|identity| {
            let cache = self.cache.clone();
            let prober = self.prober.clone();
            let probe_limit = self.probe_limit.clone();
            tokio::spawn(async move {
                let (identity, prober, probe_limit) = (&identity, &prober, &probe_limit);
                let deadline = prober.timeouts().deadline();
                cache
                    .get(identity, move || async move {
                        // Only outbound probes count against the limit, hits never wait.
                        // Queueing for a permit is part of the probe's deadline.
                        let probe = async {
                            let _permit = probe_limit.acquire().await.ok();
                            prober.probe(identity).await
                        };
                        tokio::time::timeout(deadline, probe).await.unwrap_or_else(|_| {
                            warn!(server = %identity, "probe deadline passed while queued");
                            StatusRecord::offline(identity.clone(), QueryError::Timeout.to_string())
                        })
                    })
                    .await
            })
        });

        join_all(tasks)
            .await
            .into_iter()
            .zip(identities)
            .map(|(joined, identity)| {
                joined.unwrap_or_else(|err| {
                    error!(server = %identity, error = %err, "status task failed");
                    StatusRecord::offline(identity.clone(), "internal error")
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::error::QueryError;
    use crate::prober::TimeoutConfig;
    use crate::query::{QueryPlayer, QueryRequest, QueryResponse, StatusQuery};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Per-port behaviour: how long to take and what to answer.
    #[derive(Default)]
    struct ScriptedQuery {
        script: HashMap<u16, (Duration, Result<QueryResponse, QueryError>)>,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedQuery {
        fn on(mut self, port: u16, delay_ms: u64, result: Result<QueryResponse, QueryError>) -> Self {
            self.script
                .insert(port, (Duration::from_millis(delay_ms), result));
            self
        }
    }

    #[async_trait]
    impl StatusQuery for ScriptedQuery {
        async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now_active, Ordering::SeqCst);

            let (delay, result) = self
                .script
                .get(&request.port)
                .cloned()
                .unwrap_or((Duration::ZERO, Err(QueryError::ConnectionRefused)));
            if request.port == 666 {
                panic!("protocol implementation bug");
            }
            tokio::time::sleep(delay).await;

            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn players(n: usize, max: u32) -> QueryResponse {
        QueryResponse {
            players: (0..n)
                .map(|i| QueryPlayer {
                    name: Some(format!("p{i}")),
                    ..QueryPlayer::default()
                })
                .collect(),
            max_players: max,
            map: Some("de_dust2".to_string()),
        }
    }

    fn id(port: i64) -> ServerIdentity {
        ServerIdentity::new("x", "10.0.0.1", port).unwrap()
    }

    fn aggregator(query: Arc<ScriptedQuery>, timeouts: TimeoutConfig, limit: usize) -> Aggregator {
        Aggregator::new(
            Arc::new(StatusCache::new(CacheConfig::default())),
            Arc::new(Prober::new(query, timeouts)),
            limit,
        )
    }

    fn short_timeouts() -> TimeoutConfig {
        TimeoutConfig {
            connect_timeout: Duration::from_millis(500),
            attempt_timeout: Duration::from_millis(1000),
            max_retries: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_matches_input_order_and_length() {
        let query = Arc::new(
            ScriptedQuery::default()
                .on(1, 300, Ok(players(1, 8)))
                .on(2, 10, Err(QueryError::Malformed("bad header".to_string())))
                .on(3, 100, Ok(players(3, 8))),
        );
        let agg = aggregator(query, short_timeouts(), 16);
        let ids = vec![id(1), id(2), id(3), id(4)];

        let records = agg.resolve_all(&ids).await;

        assert_eq!(records.len(), 4);
        for (record, identity) in records.iter().zip(&ids) {
            assert_eq!(&record.identity, identity);
        }
        assert!(records[0].online);
        assert!(!records[1].online);
        assert_eq!(
            records[1].error.as_deref(),
            Some("malformed response: bad header")
        );
        assert_eq!(records[2].players.current, 3);
        assert_eq!(records[3].error.as_deref(), Some("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_server_does_not_hold_up_others() {
        let query = Arc::new(
            ScriptedQuery::default()
                .on(1, 60_000, Ok(players(0, 8)))
                .on(2, 200, Ok(players(4, 10))),
        );
        let agg = aggregator(query, short_timeouts(), 16);

        let started = Instant::now();
        let records = agg.resolve_all(&[id(1), id(2)]).await;
        let elapsed = started.elapsed();

        assert!(!records[0].online);
        assert_eq!(records[0].error.as_deref(), Some("timeout"));
        assert!(records[1].online);
        assert_eq!(records[1].players.current, 4);
        assert_eq!(records[1].players.max, 10);
        // Latency tracks the slowest probe (the 1s deadline), not the sum.
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_probe_only_fails_its_own_record() {
        let query = Arc::new(ScriptedQuery::default().on(2, 10, Ok(players(2, 4))));
        let agg = aggregator(query, short_timeouts(), 16);

        let records = agg.resolve_all(&[id(666), id(2)]).await;

        assert_eq!(records.len(), 2);
        assert!(!records[0].online);
        assert_eq!(records[0].error.as_deref(), Some("internal error"));
        assert!(records[1].online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_batch_is_served_from_cache() {
        let query = Arc::new(ScriptedQuery::default().on(1, 10, Ok(players(1, 2))));
        let agg = aggregator(query.clone(), short_timeouts(), 16);

        agg.resolve_all(&[id(1)]).await;
        tokio::time::advance(Duration::from_millis(1000)).await;
        let records = agg.resolve_all(&[id(1)]).await;

        assert!(records[0].online);
        assert_eq!(query.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_concurrency_is_bounded() {
        let mut script = ScriptedQuery::default();
        for port in 1..=10 {
            script = script.on(port, 100, Ok(players(0, 1)));
        }
        let query = Arc::new(script);
        let agg = aggregator(query.clone(), short_timeouts(), 3);
        let ids: Vec<_> = (1..=10).map(id).collect();

        let records = agg.resolve_all(&ids).await;

        assert!(records.iter().all(|r| r.online));
        assert_eq!(query.calls.load(Ordering::SeqCst), 10);
        assert!(query.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_probes_share_the_deadline() {
        let mut script = ScriptedQuery::default();
        for port in 1..=200 {
            script = script.on(port, 3_600_000, Ok(players(0, 1)));
        }
        let agg = aggregator(
            Arc::new(script),
            short_timeouts(),
            DEFAULT_MAX_CONCURRENT_PROBES,
        );
        let ids: Vec<_> = (1..=200).map(id).collect();

        let started = Instant::now();
        let records = agg.resolve_all(&ids).await;
        let elapsed = started.elapsed();

        assert_eq!(records.len(), 200);
        assert!(
            records
                .iter()
                .all(|r| !r.online && r.error.as_deref() == Some("timeout"))
        );
        // One deadline for the whole batch, not one per wave of permits.
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1200), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let agg = aggregator(Arc::new(ScriptedQuery::default()), short_timeouts(), 1);
        assert!(agg.resolve_all(&[]).await.is_empty());
    }
}
