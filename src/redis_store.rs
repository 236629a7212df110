mod commands;
mod error;
mod redis_database;

use std::time::Duration;

use commands::Command;
pub use error::RedisError;
pub use redis_database::RedisDatabase;

use crate::session_store::{SessionToken, SetMode, Store, StoreError};

#[async_trait::async_trait]
impl Store for RedisDatabase {
    async fn get(&self, token: &SessionToken) -> Result<Option<String>, StoreError> {
        let cache_key = (self.config().key_gen())(token);
        let value = self
            .execute_command::<Option<String>>(Command::get(cache_key))
            .await
            .map_err(StoreError::from)?;
        Ok(value)
    }

    async fn set(
        &self,
        token: &SessionToken,
        value: String,
        ttl: Duration,
        mode: SetMode,
    ) -> Result<bool, StoreError> {
        let cache_key = (self.config().key_gen())(token);
        let reply = self
            .execute_command::<redis::Value>(Command::set(cache_key, value, ttl, mode))
            .await
            .map_err(StoreError::from)?;
        match reply {
            redis::Value::Okay => Ok(true),
            redis::Value::Nil if mode != SetMode::Always => Ok(false),
            other => Err(StoreError::from(RedisError::UnexpectedReply {
                command: "SET",
                reply: format!("{:?}", other),
            })),
        }
    }

    async fn refresh_expiry(
        &self,
        token: &SessionToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let cache_key = (self.config().key_gen())(token);
        let refreshed = self
            .execute_command::<u64>(Command::expire(cache_key, ttl))
            .await
            .map_err(StoreError::from)?;
        Ok(refreshed > 0)
    }

    async fn delete(&self, token: &SessionToken) -> Result<bool, StoreError> {
        let cache_key = (self.config().key_gen())(token);
        let deleted = self
            .execute_command::<u64>(Command::delete(cache_key))
            .await
            .map_err(StoreError::from)?;
        Ok(deleted > 0)
    }
}
