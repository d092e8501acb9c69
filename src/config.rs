use std::{collections::BTreeMap, time::Duration};

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    clients::identity::IdentitySettings,
    models::{circuit_breaker::CircuitBreakerConfig, retry::RetryConfig},
};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    pub database_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    pub rabbitmq_url: String,
    #[serde(default = "default_exchange")]
    pub exchange_name: String,
    #[serde(default = "default_exchange_type")]
    pub exchange_type: String,
    #[serde(default = "default_exchange")]
    pub queue_name: String,
    #[serde(default = "default_routing_key")]
    pub routing_key: String,

    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_backoff_multiplier: u64,

    pub redis_url: String,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_timeout_seconds: u64,
    pub circuit_breaker_success_threshold: u32,

    pub identity_channels_url: String,
    pub identity_users_url: String,
    pub identity_login_url: String,
    pub identity_refresh_url: String,
    pub identity_username: String,
    pub identity_password: String,
    #[serde(default = "default_identity_timeout_seconds")]
    pub identity_timeout_seconds: u64,

    #[serde(default = "default_email_from")]
    pub notifications_email_from: String,
    pub verify_url: String,

    /// JSON object of constant context values, e.g. `{"support_email": "help@movix.ru"}`.
    #[serde(default)]
    pub static_context: Option<String>,
}

fn default_server_port() -> u16 {
    8000
}

fn default_page_size() -> usize {
    1000
}

fn default_exchange() -> String {
    "movix-notification".to_string()
}

fn default_exchange_type() -> String {
    "fanout".to_string()
}

fn default_routing_key() -> String {
    "notification.email".to_string()
}

fn default_identity_timeout_seconds() -> u64 {
    10
}

fn default_email_from() -> String {
    "notifications@movix.ru".to_string()
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        if config.page_size == 0 {
            return Err(anyhow!("PAGE_SIZE must be greater than zero"));
        }

        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            timeout_seconds: self.circuit_breaker_timeout_seconds,
            success_threshold: self.circuit_breaker_success_threshold,
        }
    }

    pub fn identity_settings(&self) -> IdentitySettings {
        IdentitySettings {
            channels_url: self.identity_channels_url.clone(),
            users_url: self.identity_users_url.clone(),
            login_url: self.identity_login_url.clone(),
            refresh_url: self.identity_refresh_url.clone(),
            username: self.identity_username.clone(),
            password: self.identity_password.clone(),
            timeout: Duration::from_secs(self.identity_timeout_seconds),
        }
    }

    /// Constant context values. `verify_url` is always present.
    pub fn static_context(&self) -> Result<BTreeMap<String, Value>, Error> {
        let mut values = match self.static_context.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str::<BTreeMap<String, Value>>(raw)
                    .map_err(|e| anyhow!("STATIC_CONTEXT must be a JSON object: {}", e))?
            }
            _ => BTreeMap::new(),
        };

        values
            .entry("verify_url".to_string())
            .or_insert_with(|| Value::String(self.verify_url.clone()));

        Ok(values)
    }
}
