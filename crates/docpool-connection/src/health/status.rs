//! Latency-based health classification

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::PingResult;

/// Health of a pool as seen by a ping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// Reachable, but slow enough to notice
    Degraded,
    /// Unreachable or too slow to be useful
    Unhealthy,
}

impl HealthStatus {
    /// Classify a latency using [`HealthThresholds::default`]
    pub fn from_latency(latency: Duration) -> Self {
        Self::from_latency_with_thresholds(latency, &HealthThresholds::default())
    }

    pub fn from_latency_with_thresholds(latency: Duration, thresholds: &HealthThresholds) -> Self {
        if latency <= thresholds.healthy {
            HealthStatus::Healthy
        } else if latency <= thresholds.degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// A failed ping is always unhealthy
    pub fn from_ping(result: &PingResult, thresholds: &HealthThresholds) -> Self {
        match result {
            Ok(latency) => Self::from_latency_with_thresholds(*latency, thresholds),
            Err(_) => HealthStatus::Unhealthy,
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency bounds for [`HealthStatus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthThresholds {
    /// Highest latency still considered healthy
    pub healthy: Duration,
    /// Highest latency considered degraded; anything slower is unhealthy
    pub degraded: Duration,
}

impl HealthThresholds {
    pub fn new(healthy_ms: u64, degraded_ms: u64) -> Self {
        Self {
            healthy: Duration::from_millis(healthy_ms),
            degraded: Duration::from_millis(degraded_ms.max(healthy_ms)),
        }
    }
}

impl Default for HealthThresholds {
    /// healthy up to 50ms, degraded up to 250ms
    fn default() -> Self {
        Self::new(50, 250)
    }
}
