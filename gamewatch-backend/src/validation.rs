//! Parsing and validation of the on-demand address list
use gamewatch_core::{IdentityError, ServerIdentity};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Missing addresses. Format: type:ip:port,type:ip:port,...")]
    AddressesEmpty,

    #[error("Invalid addresses format. Format: type:ip:port,type:ip:port,...")]
    NoValidAddresses,

    #[error("Too many addresses (max {max}, got {actual})")]
    TooManyAddresses { max: usize, actual: usize },
}

/// Parses one `type:host:port` triple.
///
/// The host may itself contain colons (IPv6): the first segment is the type
/// and the last is the port.
pub fn parse_address(raw: &str) -> Result<ServerIdentity, IdentityError> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() < 3 {
        return Err(IdentityError::MalformedAddress(raw.to_string()));
    }

    let protocol_type = parts[0];
    let host = parts[1..parts.len() - 1].join(":");
    let port: i64 = parts[parts.len() - 1]
        .parse()
        .map_err(|_| IdentityError::MalformedAddress(raw.to_string()))?;

    ServerIdentity::new(protocol_type, host, port)
}

/// Parses a comma-separated address list.
///
/// Rules:
/// - The list cannot be empty
/// - Malformed entries are dropped, as long as at least one survives
/// - At most `max` entries are accepted (prevents probe amplification)
pub fn parse_addresses(raw: &str, max: usize) -> Result<Vec<ServerIdentity>, ValidationError> {
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if entries.is_empty() {
        return Err(ValidationError::AddressesEmpty);
    }

    if entries.len() > max {
        return Err(ValidationError::TooManyAddresses {
            max,
            actual: entries.len(),
        });
    }

    let servers: Vec<ServerIdentity> = entries
        .into_iter()
        .filter_map(|entry| match parse_address(entry) {
            Ok(identity) => Some(identity),
            Err(err) => {
                tracing::debug!(address = entry, error = %err, "dropping malformed address");
                None
            }
        })
        .collect();

    if servers.is_empty() {
        return Err(ValidationError::NoValidAddresses);
    }

    Ok(servers)
}
