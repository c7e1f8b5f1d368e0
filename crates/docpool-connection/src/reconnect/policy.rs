//! Bounded reconnect policy

use docpool_core::{DocPoolError, Operation, OperationOutput, Result};

use crate::Connection;

/// Reconnect budget applied to one probe or one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum reconnects per call (0 = fail on the first transient error)
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Bring a connection whose health check failed back to life.
    ///
    /// Each successful reconnect is followed by a fresh health check. On
    /// failure the connection is marked broken and the last error returned.
    pub async fn revive(&self, conn: &mut Connection) -> Result<()> {
        let mut last_error = DocPoolError::TransientConnectivity(format!(
            "{} failed its health check",
            conn.id()
        ));

        for attempt in 1..=self.max_attempts {
            match conn.reconnect().await {
                Ok(()) => {
                    if conn.health_check().await {
                        return Ok(());
                    }
                    last_error = DocPoolError::TransientConnectivity(format!(
                        "{} failed its health check after reconnecting",
                        conn.id()
                    ));
                }
                Err(err) if err.is_retryable() => last_error = err,
                Err(err) => {
                    conn.mark_broken();
                    return Err(err);
                }
            }
            tracing::warn!(
                pool = %conn.pool_name(),
                connection = %conn.id(),
                attempt,
                max_attempts = self.max_attempts,
                error = %last_error,
                "reconnect attempt failed"
            );
        }

        conn.mark_broken();
        Err(last_error)
    }

    /// Run an operation, reconnecting and retrying on transient failures.
    ///
    /// The reconnect budget is shared across the whole call, so an operation
    /// that keeps failing after successful reconnects still terminates.
    pub async fn execute(
        &self,
        conn: &mut Connection,
        operation: &Operation,
    ) -> Result<OperationOutput> {
        let mut reconnects = 0;

        loop {
            let mut last_error = match conn.execute(operation).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            loop {
                if reconnects >= self.max_attempts {
                    tracing::error!(
                        pool = %conn.pool_name(),
                        connection = %conn.id(),
                        operation = %operation.kind(),
                        reconnects,
                        error = %last_error,
                        "giving up on connection"
                    );
                    conn.mark_broken();
                    return Err(last_error);
                }

                reconnects += 1;
                tracing::warn!(
                    pool = %conn.pool_name(),
                    connection = %conn.id(),
                    operation = %operation.kind(),
                    attempt = reconnects,
                    error = %last_error,
                    "transient failure, reconnecting"
                );

                match conn.reconnect().await {
                    Ok(()) => break,
                    Err(err) if err.is_retryable() => last_error = err,
                    Err(err) => {
                        conn.mark_broken();
                        return Err(err);
                    }
                }
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}
