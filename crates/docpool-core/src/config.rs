//! Configuration types
//!
//! Settings are read per pool name from a TOML document shaped like:
//!
//! ```toml
//! [pools.default]
//! host = "127.0.0.1"
//! port = 27017
//! database = "app"
//!
//! [pools.default.pool]
//! min_idle = 1
//! max_open = 10
//! wait_timeout_ms = 3000
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DocPoolError, Result};

/// Sizing, timeout and lifecycle settings for one connection pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle connections kept open even when they exceed the idle timeout
    #[serde(alias = "min_connections")]
    min_idle: usize,
    /// Upper bound on open connections (idle + checked out)
    #[serde(alias = "max_connections")]
    max_open: usize,
    /// Timeout in milliseconds for establishing a session
    connect_timeout_ms: u64,
    /// Timeout in milliseconds a caller waits for a free connection
    wait_timeout_ms: u64,
    /// Milliseconds an idle connection may sit unused before eviction
    #[serde(alias = "max_idle_time_ms")]
    idle_timeout_ms: u64,
    /// Maximum age of a connection in milliseconds before it is recycled
    max_age_ms: Option<u64>,
    /// Deadline in milliseconds for a single operation
    operation_timeout_ms: Option<u64>,
    /// Checkouts held longer than this many milliseconds are reported
    leak_threshold_ms: Option<u64>,
    /// Reconnect attempts before a connection is given up
    reconnect_attempts: u32,
}

impl PoolConfig {
    /// Create a new pool configuration with the given sizes
    ///
    /// # Panics
    ///
    /// Panics if `min_idle > max_open` or if `max_open` is 0. Settings read
    /// from configuration go through [`PoolConfig::validate`] instead.
    pub fn new(min_idle: usize, max_open: usize) -> Self {
        assert!(max_open > 0, "max_open must be greater than 0, got {}", max_open);
        assert!(
            min_idle <= max_open,
            "min_idle ({}) cannot exceed max_open ({})",
            min_idle,
            max_open
        );

        Self {
            min_idle,
            max_open,
            connect_timeout_ms: 10_000,
            wait_timeout_ms: 3_000,
            idle_timeout_ms: 60_000,
            max_age_ms: None,
            operation_timeout_ms: Some(30_000),
            leak_threshold_ms: None,
            reconnect_attempts: 5,
        }
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn with_wait_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wait_timeout_ms = timeout_ms;
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_age_ms(mut self, age_ms: u64) -> Self {
        self.max_age_ms = Some(age_ms);
        self
    }

    /// Set the per-operation deadline; `None` leaves operations unbounded
    pub fn with_operation_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.operation_timeout_ms = timeout_ms;
        self
    }

    pub fn with_leak_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.leak_threshold_ms = Some(threshold_ms);
        self
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Check sizing and timeouts, naming the offending field on failure
    pub fn validate(&self) -> Result<()> {
        if self.max_open == 0 {
            return Err(DocPoolError::invalid_config(
                "pool.max_open",
                "must be greater than 0",
            ));
        }
        if self.min_idle > self.max_open {
            return Err(DocPoolError::invalid_config(
                "pool.min_idle",
                format!(
                    "min_idle ({}) cannot exceed max_open ({})",
                    self.min_idle, self.max_open
                ),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(DocPoolError::invalid_config(
                "pool.connect_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(DocPoolError::invalid_config(
                "pool.operation_timeout_ms",
                "must be greater than 0 when set",
            ));
        }
        Ok(())
    }

    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_ms.map(Duration::from_millis)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn leak_threshold(&self) -> Option<Duration> {
        self.leak_threshold_ms.map(Duration::from_millis)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - min_idle: 1, max_open: 10
    /// - connect timeout: 10 seconds, wait timeout: 3 seconds
    /// - idle timeout: 60 seconds, no max age
    /// - operation timeout: 30 seconds
    /// - reconnect attempts: 5
    fn default() -> Self {
        Self::new(1, 10)
    }
}

/// Write acknowledgement applied to every write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConcernSettings {
    /// `"majority"`, a node count such as `"1"`, or a custom tag set name
    pub w: String,
    /// How long the server may wait for the acknowledgement
    pub timeout_ms: u64,
    /// Require the write to reach the on-disk journal
    pub journal: Option<bool>,
}

impl WriteConcernSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for WriteConcernSettings {
    fn default() -> Self {
        Self {
            w: "majority".to_string(),
            timeout_ms: 1_000,
            journal: None,
        }
    }
}

/// Connection target and pool settings for one named pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Host name, or a comma separated `host[:port]` seed list
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(alias = "db")]
    pub database: String,
    #[serde(default, alias = "replica")]
    pub replica_set: Option<String>,
    /// Database to authenticate against; defaults to `admin`
    #[serde(default)]
    pub auth_source: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub write_concern: WriteConcernSettings,
    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_port() -> u16 {
    27017
}

impl StoreSettings {
    /// Settings for a single host with default pool sizing
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: None,
            password: None,
            database: database.into(),
            replica_set: None,
            auth_source: None,
            tls: false,
            app_name: None,
            write_concern: WriteConcernSettings::default(),
            pool: PoolConfig::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_replica_set(mut self, replica_set: impl Into<String>) -> Self {
        self.replica_set = Some(replica_set.into());
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Validate every field needed to open a session
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.seed_list()?;
        validate_database_name(&self.database)?;
        self.credentials()?;
        if self.replica_set.as_deref().is_some_and(|rs| rs.trim().is_empty()) {
            return Err(DocPoolError::invalid_config(
                "replica_set",
                "must not be empty when set",
            ));
        }
        Ok(())
    }

    fn credentials(&self) -> Result<Option<(&str, &str)>> {
        let username = self.username.as_deref().filter(|s| !s.is_empty());
        let password = self.password.as_deref().filter(|s| !s.is_empty());
        match (username, password) {
            (Some(user), Some(pass)) => Ok(Some((user, pass))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(DocPoolError::invalid_config(
                "password",
                "username is set but password is missing",
            )),
            (None, Some(_)) => Err(DocPoolError::invalid_config(
                "username",
                "password is set but username is missing",
            )),
        }
    }

    /// Expand `host` into `host:port` entries
    fn seed_list(&self) -> Result<Vec<String>> {
        if self.port == 0 {
            return Err(DocPoolError::invalid_config("port", "must not be 0"));
        }
        let mut seeds = Vec::new();
        for entry in self.host.split(',').map(str::trim) {
            if entry.is_empty() {
                return Err(DocPoolError::invalid_config(
                    "host",
                    format!("`{}` contains an empty host entry", self.host),
                ));
            }
            if entry.contains(['/', '@', '?', ' ']) {
                return Err(DocPoolError::invalid_config(
                    "host",
                    format!("`{}` is not a valid host", entry),
                ));
            }
            match entry.rsplit_once(':') {
                Some((_, port)) if port.parse::<u16>().is_err() => {
                    return Err(DocPoolError::invalid_config(
                        "host",
                        format!("`{}` has an invalid port", entry),
                    ));
                }
                Some(_) => seeds.push(entry.to_string()),
                None => seeds.push(format!("{}:{}", entry, self.port)),
            }
        }
        Ok(seeds)
    }

    /// Build the `mongodb://` connection URI.
    ///
    /// Credentials are percent-encoded; invalid settings fail with
    /// `InvalidConfig` and never reach the network.
    pub fn connection_uri(&self) -> Result<String> {
        self.validate()?;

        let mut uri = String::from("mongodb://");
        let credentials = self.credentials()?;
        if let Some((user, pass)) = credentials {
            uri.push_str(&urlencoding::encode(user));
            uri.push(':');
            uri.push_str(&urlencoding::encode(pass));
            uri.push('@');
        }
        uri.push_str(&self.seed_list()?.join(","));
        uri.push('/');
        uri.push_str(&self.database);

        let mut options = Vec::new();
        if credentials.is_some() {
            let auth_source = self.auth_source.as_deref().unwrap_or("admin");
            options.push(format!("authSource={}", urlencoding::encode(auth_source)));
        }
        if let Some(rs) = &self.replica_set {
            options.push(format!("replicaSet={}", urlencoding::encode(rs)));
        }
        if self.tls {
            options.push("tls=true".to_string());
        }
        if !options.is_empty() {
            uri.push('?');
            uri.push_str(&options.join("&"));
        }

        Ok(uri)
    }
}

fn validate_database_name(database: &str) -> Result<()> {
    if database.is_empty() {
        return Err(DocPoolError::invalid_config("database", "must not be empty"));
    }
    if let Some(c) = database
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '.' | ' ' | '"' | '$' | '\0'))
    {
        return Err(DocPoolError::invalid_config(
            "database",
            format!("`{}` contains forbidden character {:?}", database, c),
        ));
    }
    Ok(())
}

/// Percent-encoding for URI userinfo and option values
pub(crate) mod urlencoding {
    pub fn encode(s: &str) -> String {
        let mut result = String::with_capacity(s.len() * 3);
        for byte in s.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    result.push(byte as char)
                }
                _ => result.push_str(&format!("%{:02X}", byte)),
            }
        }
        result
    }
}

/// Source of per-pool settings, consulted when a pool is first built
pub trait ConfigSource: Send + Sync {
    /// Settings for `pool`, or `None` when the name is unknown
    fn settings(&self, pool: &str) -> Option<StoreSettings>;

    /// Every configured pool name
    fn pool_names(&self) -> Vec<String>;
}

/// Settings for every named pool, usually loaded from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub pools: BTreeMap<String, StoreSettings>,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the settings for one pool
    pub fn with_pool(mut self, name: impl Into<String>, settings: StoreSettings) -> Self {
        self.pools.insert(name.into(), settings);
        self
    }

    /// Parse a TOML document and validate every pool in it
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(source)
            .map_err(|e| DocPoolError::invalid_config("config", e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading store configuration");
        let source = std::fs::read_to_string(path).map_err(|e| {
            DocPoolError::invalid_config(path.display().to_string(), e.to_string())
        })?;
        Self::from_toml_str(&source)
    }

    /// Validate every pool, prefixing field names with the pool name
    pub fn validate(&self) -> Result<()> {
        for (name, settings) in &self.pools {
            settings.validate().map_err(|e| match e {
                DocPoolError::InvalidConfig { field, reason } => DocPoolError::InvalidConfig {
                    field: format!("pools.{}.{}", name, field),
                    reason,
                },
                other => other,
            })?;
        }
        Ok(())
    }
}

impl ConfigSource for StoreConfig {
    fn settings(&self, pool: &str) -> Option<StoreSettings> {
        self.pools.get(pool).cloned()
    }

    fn pool_names(&self) -> Vec<String> {
        self.pools.keys().cloned().collect()
    }
}
