//! MongoDB driver for docpool
//!
//! Each docpool connection owns one `mongodb::Client` limited to a single
//! underlying connection, so the pool in `docpool-connection` stays the only
//! place that decides how many connections are open.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docpool_connection::PoolRegistry;
//! use docpool_core::StoreConfig;
//! use docpool_driver_mongodb::MongoDbDriver;
//!
//! let config = StoreConfig::from_file("docpool.toml")?;
//! let registry = Arc::new(PoolRegistry::new(Arc::new(config), Arc::new(MongoDbDriver::new())));
//! let mut scope = registry.scope();
//! let users = scope.store("default").count("users", bson::doc! {}).await?;
//! ```

mod driver;
#[cfg(test)]
mod driver_tests;
mod error;
#[cfg(test)]
mod error_tests;

pub use driver::*;
pub use error::map_error;
