//! Health probing for pooled connections
//!
//! Provides the ping probe the pool runs before handing out an idle
//! connection, and latency classification for operator tooling.
//!
//! # Example
//!
//! ```ignore
//! use docpool_connection::health::{ping_connection, HealthStatus};
//!
//! let latency = ping_connection(&mut conn).await?;
//! let status = HealthStatus::from_latency(latency);
//! ```

mod ping;
mod status;


pub use ping::{PingError, PingResult, ping_connection};
pub use status::{HealthStatus, HealthThresholds};
