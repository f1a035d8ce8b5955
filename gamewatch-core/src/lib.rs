//! Status acquisition for remote game servers.
//!
//! A request flows through the layers in this order:
//!
//! - [`Aggregator`] fans a batch of servers out concurrently and settles all of them
//! - [`StatusCache`] answers from a fresh record or asks the prober
//! - [`Prober`] runs one bounded query through a [`StatusQuery`] and normalizes it
//!
//! [`RefreshDriver`] re-runs the aggregator over the configured servers on an
//! interval and publishes the result through a [`SnapshotHolder`].

mod aggregator;
mod cache;
mod error;
mod models;
mod prober;
mod query;
mod refresh;

pub use aggregator::{Aggregator, DEFAULT_MAX_CONCURRENT_PROBES};
pub use cache::{CacheConfig, StatusCache};
pub use error::{IdentityError, QueryError};
pub use models::{
  ConfiguredServer, PlayerCounts, PlayerInfo, ServerIdentity, ServerStatus, Snapshot, StatusRecord,
};
pub use prober::{Prober, TimeoutConfig};
pub use query::{
  ProtocolRegistry, QueryPlayer, QueryRequest, QueryResponse, StatusQuery, TcpConnectQuery,
};
pub use refresh::{RefreshDriver, RefreshHandle, SnapshotHolder};
