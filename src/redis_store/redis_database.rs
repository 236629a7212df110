use redis::aio::ConnectionManager;

use crate::{
    redis_store::{commands::Command, error::RedisError},
    session_store::StoreConfiguration,
};

pub struct RedisDatabase {
    config: StoreConfiguration,
    connection: ConnectionManager,
}

impl RedisDatabase {
    pub async fn new(url: &str) -> Result<Self, RedisError> {
        Self::with_configuration(url, Default::default()).await
    }

    pub async fn with_configuration(
        url: &str,
        config: StoreConfiguration,
    ) -> Result<Self, RedisError> {
        let client = redis::Client::open(url)
            .map_err(|e| e.to_string())
            .map_err(RedisError::ConnectionError)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| e.to_string())
            .map_err(RedisError::ConnectionError)?;
        Ok(Self { config, connection })
    }

    pub fn config(&self) -> &StoreConfiguration {
        &self.config
    }

    pub(crate) async fn execute_command<T: redis::FromRedisValue>(
        &self,
        command: Command,
    ) -> Result<T, RedisError> {
        let redis_command: redis::Cmd = command.into();
        let result = redis_command
            .query_async(&mut self.connection.clone())
            .await
            .map_err(|e| e.to_string())
            .map_err(RedisError::QueryError)?;
        Ok(result)
    }
}
