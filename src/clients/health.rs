use std::{collections::BTreeMap, sync::Arc, time::Instant};

use chrono::Utc;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tracing::{debug, warn};

use crate::{
    clients::{
        circuit_breaker::{CircuitBreaker, IDENTITY_SERVICE},
        database::DatabaseClient,
        rbmq::RabbitMqPublisher,
    },
    models::health::{DependencyHealth, HealthCheckResponse, HealthStatus},
};

pub struct HealthChecker {
    database: DatabaseClient,
    publisher: Arc<RabbitMqPublisher>,
    redis: MultiplexedConnection,
    identity_breaker: CircuitBreaker,
}

impl HealthChecker {
    pub fn new(
        database: DatabaseClient,
        publisher: Arc<RabbitMqPublisher>,
        redis: MultiplexedConnection,
        identity_breaker: CircuitBreaker,
    ) -> Self {
        Self {
            database,
            publisher,
            redis,
            identity_breaker,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = BTreeMap::new();

        checks.insert("notification_store", self.check_database().await.critical());
        checks.insert("message_broker", self.check_message_broker().critical());
        checks.insert("circuit_store", self.check_redis().await);
        checks.insert(
            IDENTITY_SERVICE,
            DependencyHealth::from_circuit(self.identity_breaker.state().await),
        );

        HealthCheckResponse {
            status: overall_status(checks.values()),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_database(&self) -> DependencyHealth {
        let start = Instant::now();

        match self.database.health_check().await {
            Ok(()) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                debug!(latency_ms, "Notification store reachable");
                DependencyHealth::up(Some(latency_ms))
            }
            Err(e) => {
                warn!(error = %e, "Notification store health check failed");
                DependencyHealth::down(e.to_string())
            }
        }
    }

    fn check_message_broker(&self) -> DependencyHealth {
        if self.publisher.is_connected() {
            DependencyHealth::up(None)
        } else {
            warn!("RabbitMQ connection is not open");
            DependencyHealth::down("connection is not open")
        }
    }

    async fn check_redis(&self) -> DependencyHealth {
        let start = Instant::now();
        let mut conn = self.redis.clone();

        match conn.ping::<String>().await {
            Ok(_) => DependencyHealth::up(Some(start.elapsed().as_millis() as u64)),
            Err(e) => {
                warn!(error = %e, "Redis ping failed, circuit breakers fail open");
                DependencyHealth::degraded(format!("ping failed: {}", e))
            }
        }
    }
}

/// A down critical dependency makes the service unhealthy; any other problem degrades it.
pub fn overall_status<'a>(checks: impl IntoIterator<Item = &'a DependencyHealth>) -> HealthStatus {
    checks
        .into_iter()
        .fold(HealthStatus::Healthy, |overall, health| {
            match (overall, health.status, health.critical) {
                (HealthStatus::Unhealthy, _, _) => HealthStatus::Unhealthy,
                (_, HealthStatus::Unhealthy, true) => HealthStatus::Unhealthy,
                (_, HealthStatus::Healthy, _) => overall,
                _ => HealthStatus::Degraded,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::circuit_breaker::CircuitState;

    #[test]
    fn test_all_healthy() {
        let checks = [DependencyHealth::up(Some(3)).critical(), DependencyHealth::up(None)];
        assert_eq!(overall_status(&checks), HealthStatus::Healthy);
    }

    #[test]
    fn test_open_circuit_only_degrades() {
        let checks = [
            DependencyHealth::up(Some(3)).critical(),
            DependencyHealth::from_circuit(CircuitState::Open),
        ];
        assert_eq!(overall_status(&checks), HealthStatus::Degraded);
    }

    #[test]
    fn test_critical_outage_is_unhealthy() {
        let checks = [
            DependencyHealth::degraded("ping failed"),
            DependencyHealth::down("connection refused").critical(),
        ];
        assert_eq!(overall_status(&checks), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_non_critical_outage_degrades() {
        let checks = [DependencyHealth::down("connection refused")];
        assert_eq!(overall_status(&checks), HealthStatus::Degraded);
    }
}
