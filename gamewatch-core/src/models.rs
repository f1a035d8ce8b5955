use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::IdentityError;
use crate::query::{QueryPlayer, QueryResponse};

/// Identity of one remote game server. Doubles as the cache key.
///
/// Internal overrides redirect the actual network target (e.g. a LAN address
/// for a server published under a public one) and are never serialized back
/// out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawServerIdentity")]
pub struct ServerIdentity {
  #[serde(rename = "type")]
  protocol_type: String,
  #[serde(rename = "ip")]
  host: String,
  port: u16,
  #[serde(skip_serializing)]
  internal_host: Option<String>,
  #[serde(skip_serializing)]
  internal_port: Option<u16>,
}

impl ServerIdentity {
  /// Build a validated identity.
  pub fn new(
    protocol_type: impl Into<String>,
    host: impl Into<String>,
    port: i64,
  ) -> Result<Self, IdentityError> {
    let protocol_type = protocol_type.into();
    let host = host.into();
    if protocol_type.trim().is_empty() {
      return Err(IdentityError::EmptyType);
    }
    if host.trim().is_empty() {
      return Err(IdentityError::EmptyHost);
    }
    Ok(Self {
      protocol_type,
      host,
      port: checked_port(port)?,
      internal_host: None,
      internal_port: None,
    })
  }

  /// Attach an internal network target. Either half may be omitted.
  pub fn with_internal(
    mut self,
    internal_host: Option<String>,
    internal_port: Option<i64>,
  ) -> Result<Self, IdentityError> {
    self.internal_host = internal_host.filter(|h| !h.trim().is_empty());
    self.internal_port = internal_port.map(checked_port).transpose()?;
    Ok(self)
  }

  pub fn protocol_type(&self) -> &str {
    &self.protocol_type
  }

  pub fn host(&self) -> &str {
    &self.host
  }

  pub fn port(&self) -> u16 {
    self.port
  }

  /// The host/port actually dialled: internal override first, public second.
  pub fn target(&self) -> (&str, u16) {
    (
      self.internal_host.as_deref().unwrap_or(&self.host),
      self.internal_port.unwrap_or(self.port),
    )
  }
}

impl fmt::Display for ServerIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.protocol_type, self.host, self.port)
  }
}

fn checked_port(port: i64) -> Result<u16, IdentityError> {
  match u16::try_from(port) {
    Ok(p) if p > 0 => Ok(p),
    _ => Err(IdentityError::PortOutOfRange(port)),
  }
}

/// Wire shape accepted from configuration files before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerIdentity {
  #[serde(rename = "type")]
  protocol_type: String,
  #[serde(alias = "ip")]
  host: String,
  port: i64,
  #[serde(default, alias = "internalIp")]
  internal_host: Option<String>,
  #[serde(default)]
  internal_port: Option<i64>,
}

impl TryFrom<RawServerIdentity> for ServerIdentity {
  type Error = IdentityError;

  fn try_from(raw: RawServerIdentity) -> Result<Self, Self::Error> {
    ServerIdentity::new(raw.protocol_type, raw.host, raw.port)?
      .with_internal(raw.internal_host, raw.internal_port)
  }
}

/// A player reported by a successful probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub score: Option<i64>,
  /// Seconds connected, as reported by the server.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub time_connected: Option<f64>,
}

impl From<QueryPlayer> for PlayerInfo {
  fn from(player: QueryPlayer) -> Self {
    Self {
      name: player
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown".to_string()),
      score: player.score,
      time_connected: player.time,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerCounts {
  pub current: u32,
  pub max: u32,
  /// Present on online records only, possibly empty.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub list: Option<Vec<PlayerInfo>>,
}

/// Normalized status of one server at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
  #[serde(flatten)]
  pub identity: ServerIdentity,
  pub online: bool,
  pub players: PlayerCounts,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub map: Option<String>,
  #[serde(rename = "ping", skip_serializing_if = "Option::is_none")]
  pub ping_millis: Option<u64>,
  #[serde(rename = "lastUpdated")]
  pub captured_at: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl StatusRecord {
  /// Record for a server that answered its status query.
  pub fn online(identity: ServerIdentity, response: QueryResponse, ping: Duration) -> Self {
    let list: Vec<PlayerInfo> = response.players.into_iter().map(PlayerInfo::from).collect();
    Self {
      identity,
      online: true,
      players: PlayerCounts {
        current: u32::try_from(list.len()).unwrap_or(u32::MAX),
        max: response.max_players,
        list: Some(list),
      },
      map: response.map.filter(|m| !m.is_empty()),
      ping_millis: Some(u64::try_from(ping.as_millis()).unwrap_or(u64::MAX)),
      captured_at: Utc::now(),
      error: None,
    }
  }

  /// Record for a server that could not be queried. Player data is always zeroed.
  pub fn offline(identity: ServerIdentity, error: impl Into<String>) -> Self {
    Self {
      identity,
      online: false,
      players: PlayerCounts::default(),
      map: None,
      ping_millis: None,
      captured_at: Utc::now(),
      error: Some(error.into()),
    }
  }
}

/// A server from the configured list, with its display metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfiguredServer {
  pub id: String,
  pub name: String,
  #[serde(flatten)]
  pub identity: ServerIdentity,
}

/// Snapshot entry: a configured server's display metadata plus its status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
  pub id: String,
  pub name: String,
  #[serde(flatten)]
  pub status: StatusRecord,
}

/// Background view of every configured server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
  pub servers: Vec<ServerStatus>,
  /// `None` until the first refresh has completed.
  #[serde(rename = "lastUpdated")]
  pub captured_at: Option<DateTime<Utc>>,
}
