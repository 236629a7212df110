use std::{sync::Arc, time::Duration};

use crate::{redis_store::RedisError, session_store::session_token::SessionToken};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage error: Backend error {0}")]
    BackendError(String),
    #[error("Storage error: Unable to serialize or deserialize session: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error(transparent)]
    RedisError(#[from] RedisError),
}

/// Write condition for [`Store::set`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetMode {
    /// Replace any existing value.
    Always,
    /// Only write when no live value exists for the key.
    IfAbsent,
    /// Only write when a live value already exists for the key.
    IfPresent,
}

/// A key-value store that expires entries on its own after a TTL.
///
/// Every write arms (or re-arms) the expiry timer. An expired entry must be
/// invisible to all operations, whether or not it has been physically evicted.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Returns the stored value, or `None` when the key is missing or expired.
    async fn get(&self, token: &SessionToken) -> Result<Option<String>, StoreError>;

    /// Stores `value` with a fresh expiry of `ttl`. Returns whether the write
    /// happened, which is always the case for [`SetMode::Always`].
    async fn set(
        &self,
        token: &SessionToken,
        value: String,
        ttl: Duration,
        mode: SetMode,
    ) -> Result<bool, StoreError>;

    /// Re-arms the expiry timer without touching the value. Returns `false`
    /// when there was no live key to refresh.
    async fn refresh_expiry(&self, token: &SessionToken, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Removes the key. Returns whether a live key was actually removed.
    async fn delete(&self, token: &SessionToken) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    async fn get(&self, token: &SessionToken) -> Result<Option<String>, StoreError> {
        <S as Store>::get(self, token).await
    }

    async fn set(
        &self,
        token: &SessionToken,
        value: String,
        ttl: Duration,
        mode: SetMode,
    ) -> Result<bool, StoreError> {
        <S as Store>::set(self, token, value, ttl, mode).await
    }

    async fn refresh_expiry(
        &self,
        token: &SessionToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        <S as Store>::refresh_expiry(self, token, ttl).await
    }

    async fn delete(&self, token: &SessionToken) -> Result<bool, StoreError> {
        <S as Store>::delete(self, token).await
    }
}
