use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Notification {0} not found")]
    NotFound(Uuid),

    #[error("Identity service authentication failed: {0}")]
    UpstreamAuthFailure(String),

    #[error("Identity service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed recipient entry: {0}")]
    MalformedRecipient(String),

    #[error("Failed to publish message: {0}")]
    PublishFailure(String),

    #[error("Notification store error: {0}")]
    Store(String),
}

impl DispatchError {
    /// Errors from the identity service that count against its circuit breaker.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            DispatchError::UpstreamAuthFailure(_) | DispatchError::UpstreamUnavailable(_)
        )
    }
}

impl From<tokio_postgres::Error> for DispatchError {
    fn from(err: tokio_postgres::Error) -> Self {
        DispatchError::Store(err.to_string())
    }
}
