use crate::storage::redis::RedisReplicaConfigBuilderError;

#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
    #[error("Configuration error: {0}")]
    ReplicaConfigError(#[from] RedisReplicaConfigBuilderError),
    #[error("Connecting to replica {0} timed out")]
    ConnectTimeout(String),
    #[error("Replica unavailable: {0}")]
    ReplicaUnavailable(String),
    #[error("Config error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, LockError>;
