//! Connection ping
//!
//! Measures the round trip of the session's lightweight liveness command.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::Connection;

/// Result of a ping operation
pub type PingResult = Result<Duration, PingError>;

/// Error that can occur during a ping operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PingError {
    /// The connection has no open session, e.g. after a failed reconnect
    #[error("Connection has no open session")]
    SessionClosed,
    /// The store rejected or failed the ping
    #[error("Ping failed: {0}")]
    Failed(String),
    /// No reply within the connect timeout
    #[error("Ping timed out after {0:?}")]
    Timeout(Duration),
}

/// Ping a connection and return the round-trip time.
///
/// The probe is bounded by the pool's connect timeout so a hung session
/// cannot stall an acquire indefinitely.
pub async fn ping_connection(conn: &mut Connection) -> PingResult {
    let limit = conn.connect_timeout();
    let session = conn.session_mut().ok_or(PingError::SessionClosed)?;

    let start = Instant::now();
    match tokio::time::timeout(limit, session.ping()).await {
        Ok(Ok(())) => Ok(start.elapsed()),
        Ok(Err(e)) => Err(PingError::Failed(e.to_string())),
        Err(_) => Err(PingError::Timeout(limit)),
    }
}
