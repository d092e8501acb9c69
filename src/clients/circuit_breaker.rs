use std::time::{SystemTime, UNIX_EPOCH};

use redis::{AsyncCommands, RedisError, aio::MultiplexedConnection};
use tracing::{debug, info, warn};

use crate::{
    error::DispatchError,
    models::circuit_breaker::{CircuitBreakerConfig, CircuitState},
};

pub const IDENTITY_SERVICE: &str = "identity_service";

/// Redis-backed breaker shared by every replica calling the same upstream.
///
/// Breaker bookkeeping never fails a request: if Redis is unreachable the
/// breaker reports `Closed` and the call goes through.
#[derive(Clone)]
pub struct CircuitBreaker {
    service_name: String,
    connection: MultiplexedConnection,
    config: CircuitBreakerConfig,
}

pub fn state_key(service_name: &str) -> String {
    format!("circuit:{}:state", service_name)
}

impl CircuitBreaker {
    pub fn new(
        service_name: impl Into<String>,
        connection: MultiplexedConnection,
        config: CircuitBreakerConfig,
    ) -> Self {
        let service_name = service_name.into();
        info!(service = %service_name, "Circuit breaker initialized");

        Self {
            service_name,
            connection,
            config,
        }
    }

    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, DispatchError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, DispatchError>>,
    {
        match self.state().await {
            CircuitState::Open => {
                if self.should_attempt_reset().await {
                    info!(service = %self.service_name, "Circuit breaker attempting reset");
                    self.set_state(CircuitState::HalfOpen).await;
                    return self.try_operation(operation).await;
                }
                warn!(service = %self.service_name, "Circuit breaker is open, rejecting request");
                Err(DispatchError::UpstreamUnavailable(format!(
                    "circuit breaker is open for {}",
                    self.service_name
                )))
            }
            CircuitState::HalfOpen => {
                debug!(service = %self.service_name, "Circuit breaker in half-open state");
                self.try_operation(operation).await
            }
            CircuitState::Closed => self.try_operation(operation).await,
        }
    }

    pub async fn state(&self) -> CircuitState {
        let mut conn = self.connection.clone();
        match conn.get::<_, Option<String>>(state_key(&self.service_name)).await {
            Ok(value) => CircuitState::from_redis(value.as_deref()),
            Err(e) => {
                warn!(service = %self.service_name, error = %e, "Failed to read circuit state");
                CircuitState::Closed
            }
        }
    }

    async fn try_operation<F, Fut, T>(&self, operation: F) -> Result<T, DispatchError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, DispatchError>>,
    {
        match operation().await {
            Ok(result) => {
                self.record(self.record_success().await);
                Ok(result)
            }
            Err(e) => {
                if e.is_upstream() {
                    self.record(self.record_failure().await);
                }
                Err(e)
            }
        }
    }

    fn record(&self, outcome: Result<(), RedisError>) {
        if let Err(e) = outcome {
            warn!(service = %self.service_name, error = %e, "Failed to update circuit breaker");
        }
    }

    async fn record_success(&self) -> Result<(), RedisError> {
        let mut conn = self.connection.clone();

        match self.state().await {
            CircuitState::HalfOpen => {
                let successes: u32 = conn
                    .incr(format!("circuit:{}:successes", self.service_name), 1)
                    .await?;
                debug!(
                    service = %self.service_name,
                    successes,
                    threshold = self.config.success_threshold,
                    "Circuit breaker success recorded"
                );

                if successes >= self.config.success_threshold {
                    self.set_state(CircuitState::Closed).await;
                    self.reset_counters().await?;
                    info!(service = %self.service_name, "Circuit breaker closed after successful recovery");
                }
            }
            CircuitState::Closed => {
                conn.del::<_, ()>(format!("circuit:{}:failures", self.service_name))
                    .await?;
            }
            CircuitState::Open => {}
        }

        Ok(())
    }

    async fn record_failure(&self) -> Result<(), RedisError> {
        if self.state().await == CircuitState::HalfOpen {
            self.open().await?;
            warn!(service = %self.service_name, "Circuit breaker reopened after failed recovery attempt");
            return Ok(());
        }

        let mut conn = self.connection.clone();
        let key = format!("circuit:{}:failures", self.service_name);
        let failures: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, self.config.timeout_seconds as i64)
            .await?;

        debug!(
            service = %self.service_name,
            failures,
            threshold = self.config.failure_threshold,
            "Circuit breaker failure recorded"
        );

        if failures >= self.config.failure_threshold {
            self.open().await?;
            warn!(
                service = %self.service_name,
                failures,
                "Circuit breaker opened due to consecutive failures"
            );
        }

        Ok(())
    }

    async fn open(&self) -> Result<(), RedisError> {
        self.set_state(CircuitState::Open).await;
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(format!("circuit:{}:opened_at", self.service_name), now_secs())
            .await
    }

    async fn set_state(&self, state: CircuitState) {
        let mut conn = self.connection.clone();
        let outcome = conn
            .set::<_, _, ()>(state_key(&self.service_name), state.as_str())
            .await;
        self.record(outcome);
    }

    async fn reset_counters(&self) -> Result<(), RedisError> {
        let mut conn = self.connection.clone();
        for suffix in ["failures", "successes", "opened_at"] {
            conn.del::<_, ()>(format!("circuit:{}:{}", self.service_name, suffix))
                .await?;
        }
        Ok(())
    }

    async fn should_attempt_reset(&self) -> bool {
        let mut conn = self.connection.clone();
        let key = format!("circuit:{}:opened_at", self.service_name);

        match conn.get::<_, Option<u64>>(&key).await {
            Ok(Some(opened_at)) => {
                now_secs().saturating_sub(opened_at) >= self.config.timeout_seconds
            }
            Ok(None) => true,
            Err(e) => {
                warn!(service = %self.service_name, error = %e, "Failed to read circuit open time");
                true
            }
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
