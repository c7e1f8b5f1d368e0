//! docpool connection - pooling and task-scoped connection binding
//!
//! This crate shares a bounded set of store connections among concurrently
//! running tasks:
//!
//! - [`ConnectionPool`] hands out health-checked connections, bounded by
//!   `max_open`, and takes them back when the [`PooledConnection`] guard drops
//! - [`PoolRegistry`] builds one pool per configured name, lazily
//! - [`TaskScope`] pins one connection per pool name to a logical task so every
//!   operation of that task reuses it
//! - [`Store`] is the CRUD and aggregation surface on top of a scope
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docpool_connection::PoolRegistry;
//!
//! let registry = Arc::new(PoolRegistry::new(Arc::new(config), Arc::new(driver)));
//! let mut scope = registry.scope();
//! let user = scope
//!     .store("default")
//!     .find_one("users", doc! { "name": "ada" }, FindOptions::default())
//!     .await?;
//! // connections return to their pools when the scope drops
//! ```

mod connection;
pub mod health;
pub mod pool;
pub mod reconnect;
mod registry;
mod scope;
mod store;

#[cfg(test)]
mod testing;

pub use connection::{Connection, ConnectionFactory, ConnectionId};
pub use health::{HealthStatus, HealthThresholds, PingError, PingResult, ping_connection};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use reconnect::ReconnectPolicy;
pub use registry::PoolRegistry;
pub use scope::TaskScope;
pub use store::{DEFAULT_PAGE_SIZE, Store};
