use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::models::{ServerIdentity, StatusRecord};
use crate::query::{QueryRequest, StatusQuery};

/// Timeout/retry budget handed to the protocol layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutConfig {
    /// Per-socket connect/read timeout
    pub connect_timeout: Duration,
    /// Budget for a single attempt, including all round trips
    pub attempt_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl TimeoutConfig {
    /// Upper bound on one probe: every attempt running to its full budget.
    pub fn deadline(&self) -> Duration {
        self.attempt_timeout
            .saturating_mul(self.max_retries.saturating_add(1))
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(3000),
            attempt_timeout: Duration::from_millis(5000),
            max_retries: 2,
        }
    }
}

/// Runs one status query and folds the outcome into a [`StatusRecord`].
///
/// Never fails: errors become offline records.
#[derive(Clone)]
pub struct Prober {
    query: Arc<dyn StatusQuery>,
    timeouts: TimeoutConfig,
}

impl Prober {
    pub fn new(query: Arc<dyn StatusQuery>, timeouts: TimeoutConfig) -> Self {
        Self { query, timeouts }
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    pub async fn probe(&self, identity: &ServerIdentity) -> StatusRecord {
        let (host, port) = identity.target();
        let request = QueryRequest {
            protocol_type: identity.protocol_type().to_string(),
            host: host.to_string(),
            port,
            timeouts: self.timeouts.clone(),
            given_port_only: true,
        };
        debug!(
            protocol = %request.protocol_type,
            host = %request.host,
            port = request.port,
            "querying server"
        );

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeouts.deadline(), self.query.query(&request))
            .await
            .unwrap_or(Err(QueryError::Timeout));

        match outcome {
            Ok(response) => StatusRecord::online(identity.clone(), response, started.elapsed()),
            Err(err) => {
                warn!(
                    protocol = %request.protocol_type,
                    host = %request.host,
                    port = request.port,
                    error = %err,
                    "server query failed"
                );
                StatusRecord::offline(identity.clone(), err.to_string())
            }
        }
    }
}
