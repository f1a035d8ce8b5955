//! The seam between the status core and game-specific query protocols.
//!
//! Wire protocols live behind [`StatusQuery`]. The core only ever talks to a
//! [`ProtocolRegistry`], which routes each request by its protocol type.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::QueryError;
use crate::prober::TimeoutConfig;

/// One status query against one server.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub protocol_type: String,
    pub host: String,
    pub port: u16,
    pub timeouts: TimeoutConfig,
    /// Only query the given port, never probe alternatives.
    pub given_port_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlayer {
    pub name: Option<String>,
    pub score: Option<i64>,
    pub time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub players: Vec<QueryPlayer>,
    pub max_players: u32,
    pub map: Option<String>,
}

/// A native status protocol. Implementations own their retry loop and must
/// honor `request.timeouts`.
#[async_trait]
pub trait StatusQuery: Send + Sync {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError>;
}

/// Routes queries to the implementation registered for their protocol type.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    protocols: HashMap<String, Arc<dyn StatusQuery>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the protocols that ship with the crate (`tcp`).
    pub fn with_builtin() -> Self {
        Self::new().register("tcp", TcpConnectQuery)
    }

    pub fn register(mut self, protocol_type: impl Into<String>, query: impl StatusQuery + 'static) -> Self {
        self.protocols.insert(protocol_type.into(), Arc::new(query));
        self
    }

    pub fn supports(&self, protocol_type: &str) -> bool {
        self.protocols.contains_key(protocol_type)
    }
}

#[async_trait]
impl StatusQuery for ProtocolRegistry {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        match self.protocols.get(&request.protocol_type) {
            Some(protocol) => protocol.query(request).await,
            None => Err(QueryError::UnsupportedProtocol(request.protocol_type.clone())),
        }
    }
}

/// Reachability-only protocol: a server is online if it accepts a TCP
/// connection. Reports no players and no map.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectQuery;

#[async_trait]
impl StatusQuery for TcpConnectQuery {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let per_attempt = request
            .timeouts
            .connect_timeout
            .min(request.timeouts.attempt_timeout);
        let mut last_error = QueryError::Timeout;

        for attempt in 0..=request.timeouts.max_retries {
            let connect = TcpStream::connect((request.host.as_str(), request.port));
            match tokio::time::timeout(per_attempt, connect).await {
                Ok(Ok(_stream)) => return Ok(QueryResponse::default()),
                Ok(Err(err)) => last_error = err.into(),
                Err(_) => last_error = QueryError::Timeout,
            }
            debug!(
                host = %request.host,
                port = request.port,
                attempt,
                error = %last_error,
                "tcp connect attempt failed"
            );
        }

        Err(last_error)
    }
}
