//! Named pool registry

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use docpool_core::{ConfigSource, DocPoolError, Driver, Result};

use crate::{ConnectionPool, TaskScope};

#[cfg(test)]
mod tests;

/// Builds and owns one [`ConnectionPool`] per configured name.
///
/// Pools are built on first use. Construction happens under the map's shard
/// lock for that name only, so concurrent first requests for the same name
/// get the same pool while unrelated names do not wait on each other.
pub struct PoolRegistry {
    config: Arc<dyn ConfigSource>,
    driver: Arc<dyn Driver>,
    pools: DashMap<String, Arc<ConnectionPool>>,
}

impl PoolRegistry {
    pub fn new(config: Arc<dyn ConfigSource>, driver: Arc<dyn Driver>) -> Self {
        Self {
            config,
            driver,
            pools: DashMap::new(),
        }
    }

    /// The pool for `name`, building it on first use.
    ///
    /// Fails with `ConfigMissing` for unknown names and `InvalidConfig` when
    /// the pool's settings are malformed. No connection is opened here.
    pub fn get_pool(&self, name: &str) -> Result<Arc<ConnectionPool>> {
        if let Some(pool) = self.pools.get(name) {
            return Ok(pool.clone());
        }

        let pool = self
            .pools
            .entry(name.to_string())
            .or_try_insert_with(|| self.build_pool(name))?;
        Ok(pool.clone())
    }

    fn build_pool(&self, name: &str) -> Result<Arc<ConnectionPool>> {
        let settings = self
            .config
            .settings(name)
            .ok_or_else(|| DocPoolError::ConfigMissing(name.to_string()))?;

        let pool = ConnectionPool::from_settings(name, self.driver.clone(), &settings)?;
        tracing::info!(
            pool = %name,
            driver = self.driver.name(),
            min_idle = settings.pool.min_idle(),
            max_open = settings.pool.max_open(),
            "created connection pool"
        );
        Ok(Arc::new(pool))
    }

    /// Every configured pool name, built or not
    pub fn pool_names(&self) -> Vec<String> {
        self.config.pool_names()
    }

    /// Pools built so far
    pub fn pools(&self) -> Vec<Arc<ConnectionPool>> {
        let mut pools: Vec<_> = self.pools.iter().map(|entry| entry.value().clone()).collect();
        pools.sort_by(|a, b| a.name().cmp(b.name()));
        pools
    }

    /// Start a task scope bound to this registry
    pub fn scope(self: &Arc<Self>) -> TaskScope {
        TaskScope::new(self.clone())
    }

    /// Close every pool built so far
    pub async fn shutdown(&self) {
        for pool in self.pools() {
            pool.close().await;
        }
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("driver", &self.driver.name())
            .field("configured", &self.config.pool_names())
            .field("built", &self.pools.len())
            .finish()
    }
}
