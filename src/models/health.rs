use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::circuit_breaker::CircuitState;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<&'static str, DependencyHealth>,
}

/// Probe result of one downstream dependency.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyHealth {
    pub status: HealthStatus,

    /// Dispatch cannot run at all while a critical dependency is down.
    pub critical: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_state: Option<CircuitState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DependencyHealth {
    fn with_status(status: HealthStatus) -> Self {
        Self {
            status,
            critical: false,
            latency_ms: None,
            circuit_state: None,
            detail: None,
        }
    }

    pub fn up(latency_ms: Option<u64>) -> Self {
        Self {
            latency_ms,
            ..Self::with_status(HealthStatus::Healthy)
        }
    }

    pub fn down(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::with_status(HealthStatus::Unhealthy)
        }
    }

    pub fn degraded(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::with_status(HealthStatus::Degraded)
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Health as seen through a circuit breaker: closed is healthy, anything else degraded.
    pub fn from_circuit(state: CircuitState) -> Self {
        let mut health = match state {
            CircuitState::Closed => Self::up(None),
            CircuitState::HalfOpen => Self::degraded("probing after open circuit"),
            CircuitState::Open => Self::degraded("circuit open, calls rejected"),
        };
        health.circuit_state = Some(state);
        health
    }
}
