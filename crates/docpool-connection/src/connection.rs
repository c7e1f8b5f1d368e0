//! A single store connection and the factory that opens it

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use docpool_core::{
    ConnectOptions, DocPoolError, Driver, ErrorClass, Operation, OperationOutput, Result, Session,
    StoreSettings,
};
use tokio::time::Instant;

use crate::health::ping_connection;
use crate::reconnect::ReconnectPolicy;

/// Identifier of a connection, unique within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens connections for one pool from its immutable settings
pub struct ConnectionFactory {
    pool: String,
    driver: Arc<dyn Driver>,
    options: ConnectOptions,
    policy: ReconnectPolicy,
    operation_timeout: Option<Duration>,
    next_id: AtomicU64,
}

impl ConnectionFactory {
    /// Build a factory, validating the settings up front.
    ///
    /// Malformed settings fail here with `InvalidConfig`, before any
    /// connection is attempted.
    pub fn new(
        pool: impl Into<String>,
        driver: Arc<dyn Driver>,
        settings: &StoreSettings,
    ) -> Result<Self> {
        let options = ConnectOptions::from_settings(settings)?;
        Ok(Self {
            pool: pool.into(),
            driver,
            options,
            policy: ReconnectPolicy::new(settings.pool.reconnect_attempts()),
            operation_timeout: settings.pool.operation_timeout(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn pool_name(&self) -> &str {
        &self.pool
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Open a new connection
    pub async fn create(self: &Arc<Self>) -> Result<Connection> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = self.open_session(id).await?;
        tracing::debug!(pool = %self.pool, connection = %id, "opened connection");
        Ok(Connection::new(id, session, self.clone()))
    }

    async fn open_session(&self, id: ConnectionId) -> Result<Box<dyn Session>> {
        let limit = self.options.connect_timeout;
        match tokio::time::timeout(limit, self.driver.open(&self.options)).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(err)) if err.class() == ErrorClass::Transient => {
                tracing::warn!(
                    pool = %self.pool,
                    connection = %id,
                    uri = %self.options.redacted_uri(),
                    error = %err,
                    "failed to open session"
                );
                Err(DocPoolError::ConnectFailed(format!(
                    "{}: {}",
                    self.options.redacted_uri(),
                    err.root()
                )))
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(DocPoolError::ConnectFailed(format!(
                "{}: timed out after {:?}",
                self.options.redacted_uri(),
                limit
            ))),
        }
    }
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("pool", &self.pool)
            .field("driver", &self.driver.name())
            .field("uri", &self.options.redacted_uri())
            .field("policy", &self.policy)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

/// One live driver session plus the bookkeeping the pool needs.
///
/// Exclusive use follows from ownership: a connection is either idle inside
/// its pool or owned by exactly one `PooledConnection`.
pub struct Connection {
    id: ConnectionId,
    session: Option<Box<dyn Session>>,
    factory: Arc<ConnectionFactory>,
    created_at: Instant,
    last_used_at: Instant,
    broken: bool,
}

impl Connection {
    fn new(id: ConnectionId, session: Box<dyn Session>, factory: Arc<ConnectionFactory>) -> Self {
        let now = Instant::now();
        Self {
            id,
            session: Some(session),
            factory,
            created_at: now,
            last_used_at: now,
            broken: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn pool_name(&self) -> &str {
        self.factory.pool_name()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// Time since the connection was first opened
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Broken connections are destroyed on release instead of returning to idle
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        self.factory.options().connect_timeout
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut (dyn Session + 'static)> {
        self.session.as_deref_mut()
    }

    /// Probe the session; never errors, a failed probe is `false`
    pub async fn health_check(&mut self) -> bool {
        match ping_connection(self).await {
            Ok(latency) => {
                tracing::trace!(connection = %self.id, ?latency, "health check passed");
                true
            }
            Err(err) => {
                tracing::debug!(
                    pool = %self.pool_name(),
                    connection = %self.id,
                    error = %err,
                    "health check failed"
                );
                false
            }
        }
    }

    /// Close the current session and open a fresh one from the same settings
    pub async fn reconnect(&mut self) -> Result<()> {
        if let Some(mut old) = self.session.take() {
            if let Err(err) = old.close().await {
                tracing::debug!(connection = %self.id, error = %err, "error closing stale session");
            }
        }

        let session = self.factory.open_session(self.id).await?;
        self.session = Some(session);
        self.broken = false;
        tracing::info!(pool = %self.pool_name(), connection = %self.id, "reconnected");
        Ok(())
    }

    /// Run one operation, once, without reconnecting.
    ///
    /// Bounded by the pool's operation timeout when one is configured. Errors
    /// that make the session untrustworthy mark the connection broken.
    pub async fn execute(&mut self, operation: &Operation) -> Result<OperationOutput> {
        operation.validate()?;

        let id = self.id;
        let timeout = self.factory.operation_timeout;
        let session = self.session.as_deref_mut().ok_or_else(|| {
            DocPoolError::TransientConnectivity(format!("{} has no open session", id))
        })?;

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, session.execute(operation)).await {
                Ok(result) => result,
                Err(_) => Err(DocPoolError::OperationTimeout {
                    operation: operation.kind(),
                    timeout: limit,
                }),
            },
            None => session.execute(operation).await,
        };

        match &result {
            Ok(_) => self.last_used_at = Instant::now(),
            Err(err) if err.discards_connection() => {
                tracing::warn!(
                    pool = %self.pool_name(),
                    connection = %id,
                    operation = %operation.kind(),
                    error = %err,
                    "discarding connection after unrecoverable error"
                );
                self.broken = true;
            }
            Err(_) => {}
        }

        result
    }

    /// Run one operation through the reconnect policy
    pub async fn run(&mut self, operation: &Operation) -> Result<OperationOutput> {
        let policy = self.factory.policy();
        policy.execute(self, operation).await
    }

    pub(crate) async fn close(mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.close().await {
                tracing::debug!(connection = %self.id, error = %err, "error closing session");
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("pool", &self.pool_name())
            .field("open", &self.session.is_some())
            .field("broken", &self.broken)
            .field("age", &self.age())
            .finish()
    }
}
