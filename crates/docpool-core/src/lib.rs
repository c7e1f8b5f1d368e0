//! docpool core - shared abstractions for the document store access layer
//!
//! This crate provides the types every other docpool crate depends on:
//!
//! - `DocPoolError` - the error taxonomy and its retry classification
//! - `StoreSettings`, `PoolConfig`, `StoreConfig` - per-pool configuration
//! - `Operation` / `OperationOutput` - the store operations the pool executes
//! - `Driver` / `Session` - the boundary to the underlying store driver

mod config;
pub mod document;
mod driver;
mod error;
mod operation;

#[cfg(test)]
mod operation_tests;

pub use config::*;
pub use driver::*;
pub use error::*;
pub use operation::*;
