//! Driver and session traits - the boundary to the underlying store driver

use std::time::Duration;

use async_trait::async_trait;

use crate::{Operation, OperationOutput, Result, StoreSettings, WriteConcernSettings};

/// Everything a driver needs to open one session
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// Connection URI including credentials and options
    pub uri: String,
    /// Database that namespaces resolve against
    pub database: String,
    /// Upper bound for establishing the session
    pub connect_timeout: Duration,
    /// Write concern applied to every write
    pub write_concern: WriteConcernSettings,
    /// Name reported to the server for diagnostics
    pub app_name: Option<String>,
}

impl ConnectOptions {
    /// Build connect options from validated store settings.
    ///
    /// Fails with `InvalidConfig` when the URI cannot be assembled.
    pub fn from_settings(settings: &StoreSettings) -> Result<Self> {
        Ok(Self {
            uri: settings.connection_uri()?,
            database: settings.database.clone(),
            connect_timeout: settings.pool.connect_timeout(),
            write_concern: settings.write_concern.clone(),
            app_name: settings.app_name.clone(),
        })
    }

    /// The URI with any password replaced, safe for logs
    pub fn redacted_uri(&self) -> String {
        redact_uri(&self.uri)
    }
}

fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    match rest.rsplit_once('@') {
        Some((userinfo, hosts)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{}://{}:***@{}", scheme, user, hosts)
        }
        None => uri.to_string(),
    }
}

/// A store driver: opens sessions from connect options
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Driver identifier (e.g., "mongodb")
    fn name(&self) -> &'static str;

    /// Open a new session.
    ///
    /// Implementations map their failures onto `DocPoolError`: malformed
    /// options to `InvalidConfig`, rejected credentials to `Auth`,
    /// unreachable servers to `TransientConnectivity`.
    async fn open(&self, options: &ConnectOptions) -> Result<Box<dyn Session>>;
}

/// One live session with the store.
///
/// A session runs one operation at a time; exclusive access is expressed
/// through `&mut self`.
#[async_trait]
pub trait Session: Send + Sync {
    /// Run a single operation
    async fn execute(&mut self, operation: &Operation) -> Result<OperationOutput>;

    /// Lightweight liveness probe
    async fn ping(&mut self) -> Result<()>;

    /// Release server-side resources held by the session
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
