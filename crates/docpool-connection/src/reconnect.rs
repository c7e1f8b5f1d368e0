//! Reconnect-and-retry for transient connectivity failures
//!
//! A transient failure (network drop, server selection timeout, failover)
//! triggers up to `reconnect_attempts` reconnects of the same connection,
//! without backoff. After a successful reconnect the probe or operation that
//! failed is retried. When every attempt fails the connection is marked
//! broken so the pool destroys it on release.
//!
//! Argument, configuration, timeout and auth errors are never retried.
//!
//! # Example
//!
//! ```ignore
//! use docpool_connection::ReconnectPolicy;
//!
//! let policy = ReconnectPolicy::new(5);
//! let output = policy.execute(&mut conn, &operation).await?;
//! ```

mod policy;


pub use policy::ReconnectPolicy;
