use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Identity service credentials shared by every dispatch in the process.
///
/// Both tokens live in one snapshot that is swapped as a whole, so readers never
/// observe an access token paired with a stale refresh token. Refreshes are
/// serialized through `refresh_lock`; concurrent readers are never blocked.
#[derive(Debug)]
pub struct TokenCache {
    tokens: ArcSwap<AuthTokens>,
    refresh_lock: Mutex<()>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            tokens: ArcSwap::from_pointee(AuthTokens::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_access_token(access_token: impl Into<String>) -> Self {
        let cache = Self::new();
        cache.replace(AuthTokens {
            access_token: Some(access_token.into()),
            refresh_token: None,
        });
        cache
    }

    pub fn snapshot(&self) -> Arc<AuthTokens> {
        self.tokens.load_full()
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens.load().access_token.clone()
    }

    pub fn replace(&self, tokens: AuthTokens) {
        self.tokens.store(Arc::new(tokens));
    }

    pub async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }
}
