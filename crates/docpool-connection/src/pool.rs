//! Connection pooling for store connections
//!
//! A pool keeps at most `max_open` connections per configured name. Idle
//! connections are reused most-recently-released first, health-checked
//! before they are handed out, and evicted once they sit idle past
//! `idle_timeout` (keeping `min_idle`) or outlive `max_age`.
//!
//! # Example
//!
//! ```ignore
//! use docpool_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(1, 10)
//!     .with_wait_timeout_ms(3000)
//!     .with_idle_timeout_ms(60_000);
//!
//! let pool = Arc::new(ConnectionPool::new("default", config, factory));
//! let mut conn = pool.acquire().await?;
//! conn.run(&operation).await?;
//! // Connection returned to pool on drop
//! ```

mod pool;
mod stats;


pub use docpool_core::PoolConfig;
pub use pool::{ConnectionPool, PooledConnection};
pub use stats::PoolStats;
