//! Pool statistics types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Open connections (idle + in use)
    pub(crate) open: usize,
    pub(crate) idle: usize,
    pub(crate) in_use: usize,
    /// Connections currently being opened
    pub(crate) connecting: usize,
    /// Callers waiting for a free connection
    pub(crate) waiting: usize,
    pub(crate) max_open: usize,
    /// Connections opened over the pool's lifetime
    pub(crate) created: u64,
    /// Connections destroyed over the pool's lifetime
    pub(crate) destroyed: u64,
    /// Age of the oldest current checkout
    pub(crate) longest_checkout: Option<Duration>,
}

impl PoolStats {
    pub fn open(&self) -> usize {
        self.open
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn connecting(&self) -> usize {
        self.connecting
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn destroyed(&self) -> u64 {
        self.destroyed
    }

    pub fn longest_checkout(&self) -> Option<Duration> {
        self.longest_checkout
    }

    /// Share of `max_open` currently checked out (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_open == 0 {
            0.0
        } else {
            self.in_use as f64 / self.max_open as f64
        }
    }

    /// Every permitted connection is checked out
    pub fn is_full(&self) -> bool {
        self.max_open > 0 && self.in_use >= self.max_open
    }
}
