use std::{sync::Arc, time::Duration};

use anyhow::{Error, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clients::{
        circuit_breaker::CircuitBreaker,
        token::{AuthTokens, TokenCache},
    },
    context::profile::UserDirectory,
    dispatch::ChannelResolver,
    error::DispatchError,
    models::user::{UserChannels, UserProfile},
};

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub channels_url: String,
    pub users_url: String,
    pub login_url: String,
    pub refresh_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct LoginResponse {
    refresh_token: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
}

enum Reply {
    Entries(Vec<Value>),
    Unauthorized(StatusCode),
}

/// Client for the identity service: user channels and profiles behind bearer auth.
pub struct IdentityClient {
    http_client: Client,
    settings: IdentitySettings,
    tokens: Arc<TokenCache>,
    circuit_breaker: Option<CircuitBreaker>,
}

impl IdentityClient {
    pub fn new(settings: IdentitySettings, tokens: Arc<TokenCache>) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        info!(channels_url = %settings.channels_url, "Identity service client initialized");

        Ok(Self {
            http_client,
            settings,
            tokens,
            circuit_breaker: None,
        })
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub async fn get_users_channels(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<UserChannels>, DispatchError> {
        let entries = self.fetch(&self.settings.channels_url, user_ids).await?;
        let channels = parse_entries::<UserChannels>(entries, "user channels");

        debug!(
            requested = user_ids.len(),
            resolved = channels.len(),
            "Resolved user channels"
        );

        Ok(channels)
    }

    pub async fn get_user_profiles(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<UserProfile>, DispatchError> {
        let entries = self.fetch(&self.settings.users_url, user_ids).await?;
        Ok(parse_entries::<UserProfile>(entries, "user profile"))
    }

    async fn fetch(&self, url: &str, user_ids: &[Uuid]) -> Result<Vec<Value>, DispatchError> {
        match &self.circuit_breaker {
            Some(circuit_breaker) => {
                circuit_breaker
                    .call(|| self.fetch_authenticated(url, user_ids))
                    .await
            }
            None => self.fetch_authenticated(url, user_ids).await,
        }
    }

    async fn fetch_authenticated(
        &self,
        url: &str,
        user_ids: &[Uuid],
    ) -> Result<Vec<Value>, DispatchError> {
        let access_token = match self.tokens.access_token() {
            Some(token) => token,
            None => self.refresh_tokens(None).await?,
        };

        match self.send(url, user_ids, &access_token).await? {
            Reply::Entries(entries) => return Ok(entries),
            Reply::Unauthorized(status) => {
                info!(url, status = %status, "Access token rejected, refreshing");
            }
        }

        let access_token = self.refresh_tokens(Some(&access_token)).await?;

        match self.send(url, user_ids, &access_token).await? {
            Reply::Entries(entries) => Ok(entries),
            Reply::Unauthorized(status) => Err(DispatchError::UpstreamAuthFailure(format!(
                "{} rejected a freshly issued access token with status {}",
                url, status
            ))),
        }
    }

    async fn send(
        &self,
        url: &str,
        user_ids: &[Uuid],
        access_token: &str,
    ) -> Result<Reply, DispatchError> {
        let response = self
            .http_client
            .get(url)
            .header("X-Request-Id", Uuid::new_v4().to_string())
            .bearer_auth(access_token)
            .json(user_ids)
            .send()
            .await
            .map_err(|e| DispatchError::UpstreamUnavailable(format!("{} request failed: {}", url, e)))?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(Reply::Unauthorized(status));
        }

        if !status.is_success() {
            return Err(DispatchError::UpstreamUnavailable(format!(
                "{} returned status {}",
                url, status
            )));
        }

        let entries: Vec<Value> = response.json().await.map_err(|e| {
            DispatchError::UpstreamUnavailable(format!("{} returned an invalid body: {}", url, e))
        })?;

        Ok(Reply::Entries(entries))
    }

    /// Logs in again and swaps in a new token pair, unless another dispatch
    /// already replaced the token this caller saw rejected.
    async fn refresh_tokens(&self, rejected: Option<&str>) -> Result<String, DispatchError> {
        let _guard = self.tokens.lock_refresh().await;

        if let Some(current) = self.tokens.access_token() {
            if rejected != Some(current.as_str()) {
                debug!("Access token already refreshed by a concurrent caller");
                return Ok(current);
            }
        }

        let refresh_token = self.login().await?;
        let access_token = self.refresh(&refresh_token).await?;

        self.tokens.replace(AuthTokens {
            access_token: Some(access_token.clone()),
            refresh_token: Some(refresh_token),
        });

        info!("Identity service tokens refreshed");

        Ok(access_token)
    }

    async fn login(&self) -> Result<String, DispatchError> {
        let response = self
            .http_client
            .post(&self.settings.login_url)
            .header("X-Request-Id", Uuid::new_v4().to_string())
            .form(&[
                ("username", self.settings.username.as_str()),
                ("password", self.settings.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DispatchError::UpstreamAuthFailure(format!("login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::UpstreamAuthFailure(format!(
                "login returned status {}",
                status
            )));
        }

        let body: LoginResponse = response.json().await.map_err(|e| {
            DispatchError::UpstreamAuthFailure(format!("login response without refresh token: {}", e))
        })?;

        Ok(body.refresh_token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String, DispatchError> {
        let response = self
            .http_client
            .post(&self.settings.refresh_url)
            .header("X-Request-Id", Uuid::new_v4().to_string())
            .bearer_auth(refresh_token)
            .send()
            .await
            .map_err(|e| DispatchError::UpstreamAuthFailure(format!("refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::UpstreamAuthFailure(format!(
                "token refresh returned status {}",
                status
            )));
        }

        let body: RefreshResponse = response.json().await.map_err(|e| {
            DispatchError::UpstreamAuthFailure(format!("refresh response without access token: {}", e))
        })?;

        Ok(body.access_token)
    }
}

fn parse_entries<T: DeserializeOwned>(entries: Vec<Value>, kind: &str) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<T>(entry) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    let error = DispatchError::MalformedRecipient(format!("{} {}: {}", kind, id, e));
                    warn!(error = %error, "Skipping malformed identity service entry");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl ChannelResolver for IdentityClient {
    async fn resolve(&self, user_ids: &[Uuid]) -> Result<Vec<UserChannels>, DispatchError> {
        self.get_users_channels(user_ids).await
    }
}

#[async_trait]
impl UserDirectory for IdentityClient {
    async fn get_users(&self, user_ids: &[Uuid]) -> Result<Vec<UserProfile>, DispatchError> {
        self.get_user_profiles(user_ids).await
    }
}
