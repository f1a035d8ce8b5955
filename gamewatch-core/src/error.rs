use thiserror::Error;

/// Failure reported by a protocol capability for a single server.
///
/// The `Display` output is what ends up in a record's `error` field, so the
/// messages stay short.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("timeout")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unsupported protocol type '{0}'")]
    UnsupportedProtocol(String),

    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for QueryError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => QueryError::ConnectionRefused,
            std::io::ErrorKind::TimedOut => QueryError::Timeout,
            _ => QueryError::Io(err.to_string()),
        }
    }
}

/// Reasons a `ServerIdentity` cannot be constructed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentityError {
    #[error("protocol type cannot be empty")]
    EmptyType,

    #[error("host cannot be empty")]
    EmptyHost,

    #[error("port must be between 1 and 65535 (got {0})")]
    PortOutOfRange(i64),

    #[error("malformed address '{0}' (expected type:host:port)")]
    MalformedAddress(String),
}
