//! Task-scoped connection binding

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use docpool_core::Result;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{Connection, ConnectionId, PoolRegistry, PooledConnection, Store};


/// Connections pinned to one logical task, one per pool name.
///
/// The first operation against a pool checks a connection out; every later
/// operation of the same scope reuses it. Connections go back to their pools
/// on [`release`](Self::release), [`finish`](Self::finish), or when the scope
/// is dropped, which also covers early returns and task cancellation.
///
/// A scope is owned by exactly one task and is not meant to be shared.
pub struct TaskScope {
    id: Uuid,
    registry: Arc<PoolRegistry>,
    bound: HashMap<String, PooledConnection>,
}

impl TaskScope {
    pub(crate) fn new(registry: Arc<PoolRegistry>) -> Self {
        let id = Uuid::new_v4();
        tracing::trace!(scope = %id, "task scope started");
        Self {
            id,
            registry,
            bound: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// The connection bound for `pool`, checking one out if needed.
    ///
    /// A bound connection that has been marked broken is released first and
    /// replaced.
    pub async fn connection(&mut self, pool: &str) -> Result<&mut PooledConnection> {
        if self.bound.get(pool).is_some_and(|conn| conn.is_broken()) {
            if let Some(stale) = self.bound.remove(pool) {
                tracing::debug!(scope = %self.id, pool, connection = %stale.id(), "replacing broken connection");
            }
        }

        match self.bound.entry(pool.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let conn = self.registry.get_pool(pool)?.acquire().await?;
                tracing::trace!(scope = %self.id, pool, connection = %conn.id(), "bound connection");
                Ok(entry.insert(conn))
            }
        }
    }

    /// Run `f` with this scope's connection for `pool`.
    ///
    /// ```ignore
    /// let count = scope
    ///     .with_connection("default", |conn| async move { conn.run(&op).await }.boxed())
    ///     .await?;
    /// ```
    pub async fn with_connection<T, F>(&mut self, pool: &str, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T>>,
    {
        let conn = self.connection(pool).await?;
        let result = f(&mut **conn).await;

        // A connection the reconnect policy gave up on goes back now so its
        // slot is free for other tasks
        if self.bound.get(pool).is_some_and(|conn| conn.is_broken()) {
            if let Some(broken) = self.bound.remove(pool) {
                tracing::debug!(scope = %self.id, pool, connection = %broken.id(), "released broken connection");
            }
        }
        result
    }

    /// Id of the connection bound for `pool`, if any
    pub fn bound_connection_id(&self, pool: &str) -> Option<ConnectionId> {
        self.bound.get(pool).map(|conn| conn.id())
    }

    pub fn bound_pools(&self) -> Vec<&str> {
        let mut pools: Vec<&str> = self.bound.keys().map(String::as_str).collect();
        pools.sort_unstable();
        pools
    }

    /// Return the connection for `pool` to its pool; `false` if none was bound
    pub fn release(&mut self, pool: &str) -> bool {
        self.bound.remove(pool).is_some()
    }

    /// Return every bound connection and end the scope
    pub fn finish(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        if !self.bound.is_empty() {
            tracing::trace!(scope = %self.id, released = self.bound.len(), "releasing scope connections");
            self.bound.clear();
        }
    }

    /// CRUD operations against `pool` through this scope
    pub fn store(&mut self, pool: impl Into<String>) -> Store<'_> {
        Store::new(self, pool.into())
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScope")
            .field("id", &self.id)
            .field("bound", &self.bound)
            .finish()
    }
}
