//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use docpool_core::{DocPoolError, Driver, PoolConfig, Result, StoreSettings};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use super::stats::PoolStats;
use crate::{Connection, ConnectionFactory, ConnectionId};

/// An idle connection and the instant it became idle
struct IdleConnection {
    conn: Connection,
    idle_since: Instant,
}

struct Checkout {
    since: Instant,
    leak_reported: bool,
}

struct PoolState {
    /// Most recently released at the back
    idle: VecDeque<IdleConnection>,
    checked_out: HashMap<ConnectionId, Checkout>,
    /// Slots reserved by connections that are still being opened
    connecting: usize,
    closed: bool,
    created: u64,
    destroyed: u64,
}

impl PoolState {
    fn open(&self) -> usize {
        self.idle.len() + self.checked_out.len()
    }

    fn check_out(&mut self, id: ConnectionId) {
        self.checked_out.insert(
            id,
            Checkout {
                since: Instant::now(),
                leak_reported: false,
            },
        );
    }
}

/// A bounded pool of connections for one configured name.
///
/// Every checked-out connection holds a semaphore permit, so at most
/// `max_open` connections are ever checked out or being opened. A new
/// connection is only opened when no idle one exists, which keeps
/// `idle + checked_out <= max_open`.
pub struct ConnectionPool {
    name: String,
    config: PoolConfig,
    factory: Arc<ConnectionFactory>,
    state: Mutex<PoolState>,
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
}

impl ConnectionPool {
    /// Create a new pool; no connection is opened until the first acquire
    pub fn new(name: impl Into<String>, config: PoolConfig, factory: Arc<ConnectionFactory>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_open()));
        Self {
            name: name.into(),
            config,
            factory,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                checked_out: HashMap::new(),
                connecting: 0,
                closed: false,
                created: 0,
                destroyed: 0,
            }),
            semaphore,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Validate `settings` and build the pool and its connection factory
    pub fn from_settings(
        name: impl Into<String>,
        driver: Arc<dyn Driver>,
        settings: &StoreSettings,
    ) -> Result<Self> {
        let name = name.into();
        let factory = ConnectionFactory::new(name.clone(), driver, settings)?;
        Ok(Self::new(name, settings.pool.clone(), Arc::new(factory)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn factory(&self) -> &Arc<ConnectionFactory> {
        &self.factory
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Check out a connection.
    ///
    /// This will:
    /// 1. Evict expired idle connections
    /// 2. Wait up to `wait_timeout` for a free slot
    /// 3. Reuse the most recently released idle connection, health-checking
    ///    it and running the reconnect policy if the check fails
    /// 4. Otherwise open a new connection
    ///
    /// Dropping the returned future at any point leaves the pool consistent.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(DocPoolError::PoolClosed(self.name.clone()));
        }
        self.evict_expired();

        let permit = self.wait_for_slot().await?;

        loop {
            let popped = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(DocPoolError::PoolClosed(self.name.clone()));
                }
                match state.idle.pop_back() {
                    Some(entry) => {
                        state.check_out(entry.conn.id());
                        Some(entry.conn)
                    }
                    None => {
                        state.connecting += 1;
                        None
                    }
                }
            };

            let Some(conn) = popped else {
                let conn = self.open_reserved().await?;
                return Ok(PooledConnection::new(conn, self.clone(), permit));
            };

            let mut in_flight = InFlight {
                conn: Some(conn),
                pool: self,
            };
            let valid = match in_flight.conn.as_mut() {
                Some(conn) => self.validate(conn).await,
                None => false,
            };
            let Some(conn) = in_flight.conn.take() else {
                continue;
            };
            if valid {
                tracing::trace!(pool = %self.name, connection = %conn.id(), "reusing idle connection");
                return Ok(PooledConnection::new(conn, self.clone(), permit));
            }
            self.destroy(conn);
        }
    }

    async fn wait_for_slot(&self) -> Result<OwnedSemaphorePermit> {
        let _waiting = WaitingGuard::new(&self.waiting);
        let wait = self.config.wait_timeout();

        match tokio::time::timeout(wait, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(DocPoolError::PoolClosed(self.name.clone())),
            Err(_) => {
                tracing::warn!(
                    pool = %self.name,
                    max_open = self.config.max_open(),
                    waited_ms = wait.as_millis() as u64,
                    "pool exhausted"
                );
                Err(DocPoolError::PoolExhausted {
                    pool: self.name.clone(),
                    waited: wait,
                })
            }
        }
    }

    /// Open a connection into a slot already counted in `connecting`
    async fn open_reserved(&self) -> Result<Connection> {
        let mut reservation = SlotReservation {
            pool: self,
            settled: false,
        };
        let opened = self.factory.create().await;

        let mut state = self.state.lock();
        state.connecting -= 1;
        reservation.settled = true;

        let conn = opened?;
        state.created += 1;
        if state.closed {
            state.destroyed += 1;
            drop(state);
            spawn_close(conn);
            return Err(DocPoolError::PoolClosed(self.name.clone()));
        }
        state.check_out(conn.id());
        Ok(conn)
    }

    async fn validate(&self, conn: &mut Connection) -> bool {
        if self.is_expired(conn) {
            tracing::debug!(pool = %self.name, connection = %conn.id(), "idle connection past max age");
            return false;
        }
        if conn.health_check().await {
            return true;
        }
        match self.factory.policy().revive(conn).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    pool = %self.name,
                    connection = %conn.id(),
                    error = %err,
                    "dropping idle connection that could not be revived"
                );
                false
            }
        }
    }

    fn is_expired(&self, conn: &Connection) -> bool {
        self.config.max_age().is_some_and(|max_age| conn.age() >= max_age)
    }

    /// Take back a checked-out connection.
    ///
    /// Broken or expired connections and anything returned after the pool
    /// closed are destroyed; the rest go back to the idle set.
    pub(crate) fn check_in(&self, conn: Connection) {
        let mut state = self.state.lock();
        if state.checked_out.remove(&conn.id()).is_none() {
            drop(state);
            tracing::error!(
                pool = %self.name,
                connection = %conn.id(),
                "released a connection that is not checked out"
            );
            return;
        }

        if conn.is_broken() || state.closed || self.is_expired(&conn) {
            state.destroyed += 1;
            drop(state);
            tracing::debug!(
                pool = %self.name,
                connection = %conn.id(),
                broken = conn.is_broken(),
                "destroying connection on release"
            );
            spawn_close(conn);
            return;
        }

        state.idle.push_back(IdleConnection {
            conn,
            idle_since: Instant::now(),
        });
    }

    /// Destroy a checked-out connection
    fn destroy(&self, conn: Connection) {
        {
            let mut state = self.state.lock();
            if state.checked_out.remove(&conn.id()).is_some() {
                state.destroyed += 1;
            }
        }
        spawn_close(conn);
    }

    /// Evict idle connections past `idle_timeout` (keeping `min_idle` of them)
    /// or past `max_age`, and report checkouts held past `leak_threshold`.
    ///
    /// Runs at the start of every acquire. Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout();
        let mut evicted = Vec::new();
        let mut leaks = Vec::new();

        {
            let mut state = self.state.lock();
            let mut remaining = state.idle.len();
            let mut kept = VecDeque::with_capacity(remaining);

            // oldest idle first, so `min_idle` keeps the most recently used
            for entry in state.idle.drain(..) {
                let idle_expired = now.duration_since(entry.idle_since) >= idle_timeout
                    && remaining > self.config.min_idle();
                if idle_expired || self.is_expired(&entry.conn) {
                    remaining -= 1;
                    evicted.push(entry.conn);
                } else {
                    kept.push_back(entry);
                }
            }
            state.idle = kept;
            state.destroyed += evicted.len() as u64;

            if let Some(threshold) = self.config.leak_threshold() {
                for (id, checkout) in state.checked_out.iter_mut() {
                    let held = now.duration_since(checkout.since);
                    if !checkout.leak_reported && held >= threshold {
                        checkout.leak_reported = true;
                        leaks.push((*id, held));
                    }
                }
            }
        }

        for (id, held) in leaks {
            tracing::warn!(
                pool = %self.name,
                connection = %id,
                held_ms = held.as_millis() as u64,
                "connection checked out longer than the leak threshold"
            );
        }

        let count = evicted.len();
        for conn in evicted {
            tracing::debug!(pool = %self.name, connection = %conn.id(), "evicting idle connection");
            spawn_close(conn);
        }
        count
    }

    /// Open connections until `min_idle` idle connections exist.
    ///
    /// Returns the number of connections opened.
    pub async fn prewarm(&self) -> Result<usize> {
        let mut opened = 0;

        loop {
            let Ok(_permit) = self.semaphore.clone().try_acquire_owned() else {
                break;
            };
            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(DocPoolError::PoolClosed(self.name.clone()));
                }
                if state.idle.len() >= self.config.min_idle()
                    || state.open() + state.connecting >= self.config.max_open()
                {
                    break;
                }
                state.connecting += 1;
            }

            let conn = self.open_reserved().await?;
            self.check_in(conn);
            opened += 1;
        }

        if opened > 0 {
            tracing::info!(pool = %self.name, opened, "prewarmed pool");
        }
        Ok(opened)
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let now = Instant::now();
        let state = self.state.lock();
        PoolStats {
            open: state.open(),
            idle: state.idle.len(),
            in_use: state.checked_out.len(),
            connecting: state.connecting,
            waiting: self.waiting.load(Ordering::SeqCst),
            max_open: self.config.max_open(),
            created: state.created,
            destroyed: state.destroyed,
            longest_checkout: state
                .checked_out
                .values()
                .map(|checkout| now.duration_since(checkout.since))
                .max(),
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are closed now; checked-out connections are destroyed
    /// when released. Later acquires, including ones already waiting, fail
    /// with `PoolClosed`.
    pub async fn close(&self) {
        let idle: Vec<IdleConnection> = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.destroyed += state.idle.len() as u64;
            state.idle.drain(..).collect()
        };
        self.semaphore.close();

        let closed = idle.len();
        for entry in idle {
            entry.conn.close().await;
        }
        tracing::info!(pool = %self.name, closed, "pool closed");
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn spawn_close(conn: Connection) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(conn.close());
        }
        Err(_) => drop(conn),
    }
}

/// Counts a caller in `waiting` for as long as it is alive
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Releases a `connecting` slot if opening is cancelled
struct SlotReservation<'a> {
    pool: &'a ConnectionPool,
    settled: bool,
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.pool.state.lock().connecting -= 1;
        }
    }
}

/// Returns a popped idle connection if the acquire is cancelled mid-validation
struct InFlight<'a> {
    conn: Option<Connection>,
    pool: &'a ConnectionPool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.check_in(conn);
        }
    }
}

/// A connection checked out of a pool
///
/// When dropped, the connection goes back to the pool, or is destroyed if it
/// was marked broken.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(conn: Connection, pool: Arc<ConnectionPool>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            conn: Some(conn),
            pool,
            _permit: permit,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Return the connection to the pool now
    pub fn release(self) {
        drop(self);
    }

    /// Destroy the connection instead of returning it to the pool
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.mark_broken();
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already released")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already released")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.check_in(conn);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.name)
            .field("conn", &self.conn)
            .finish()
    }
}
