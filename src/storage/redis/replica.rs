use std::time::Duration;

use derive_builder::Builder;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::info;

use crate::{
    error::{LockError, Result},
    lock::WriteToken,
    storage::traits::{read_key, write_key, ReplicaClient},
};

// Scripted transitions executed server-side. Redis runs each script as a
// single step, which is what makes the check-then-update safe against
// concurrent callers.

const TRY_READ_LOCK_SCRIPT: &str = r#"
    local rdkey = KEYS[1]
    local wrkey = KEYS[2]
    local ttl = ARGV[1]
    local rv
    if redis.call("EXISTS", wrkey) == 1 then
        return 0
    end
    rv = redis.call("INCR", rdkey)
    if redis.call("PTTL", rdkey) < tonumber(ttl) then
        redis.call("PEXPIRE", rdkey, ttl)
    end
    return rv
"#;

const TRY_WRITE_LOCK_SCRIPT: &str = r#"
    local wrkey = KEYS[1]
    local rdkey = KEYS[2]
    local ttl = ARGV[1]
    local token = ARGV[2]
    if redis.call("EXISTS", wrkey) == 1 then
        return 0
    end
    if redis.call("EXISTS", rdkey) == 0 then
        redis.call("PSETEX", wrkey, ttl, token)
        return 1
    end
    return 0
"#;

const TRY_READ_UNLOCK_SCRIPT: &str = r#"
    local rdkey = KEYS[1]
    local rv
    if redis.call("EXISTS", rdkey) == 0 then
        return 0
    end
    rv = redis.call("DECR", rdkey)
    if rv <= 0 then
        redis.call("DEL", rdkey)
    end
    return rv
"#;

const TRY_WRITE_UNLOCK_SCRIPT: &str = r#"
    local wrkey = KEYS[1]
    local token = ARGV[1]
    if redis.call("GET", wrkey) == token then
        return redis.call("DEL", wrkey)
    end
    return 0
"#;

#[derive(Builder, Clone, Debug)]
pub struct RedisReplicaConfig {
    #[builder(setter(into))]
    pub host: String,
    pub port: u16,
    #[builder(default = "Duration::from_secs(5)")]
    pub connect_timeout: Duration,
}

impl RedisReplicaConfig {
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// TTLs go on the wire as milliseconds; saturate instead of truncating for
// durations beyond u64 range.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

/// One Redis-backed lock-store replica.
///
/// Holds a managed connection that reconnects on failure; each operation
/// clones the handle, so the replica can be shared by reference across
/// concurrent lock calls.
pub struct RedisReplica {
    conn: ConnectionManager,
    read_lock: Script,
    write_lock: Script,
    read_unlock: Script,
    write_unlock: Script,
}

impl ReplicaClient for RedisReplica {
    type Config = RedisReplicaConfig;

    async fn connect(config: &RedisReplicaConfig) -> Result<Self> {
        let client = redis::Client::open(format!("redis://{}/", config.address()))?;
        let conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| LockError::ConnectTimeout(config.address()))??;
        info!("Connected to lock-store replica at {}", config.address());
        Ok(RedisReplica {
            conn,
            read_lock: Script::new(TRY_READ_LOCK_SCRIPT),
            write_lock: Script::new(TRY_WRITE_LOCK_SCRIPT),
            read_unlock: Script::new(TRY_READ_UNLOCK_SCRIPT),
            write_unlock: Script::new(TRY_WRITE_UNLOCK_SCRIPT),
        })
    }

    async fn try_read_lock(&self, resource: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .read_lock
            .key(read_key(resource))
            .key(write_key(resource))
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn try_write_lock(&self, resource: &str, ttl: Duration, token: &WriteToken) -> Result<bool> {
        let mut conn = self.conn.clone();
        let granted: i64 = self
            .write_lock
            .key(write_key(resource))
            .key(read_key(resource))
            .arg(ttl_millis(ttl))
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(granted == 1)
    }

    async fn try_read_unlock(&self, resource: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let remaining: i64 = self
            .read_unlock
            .key(read_key(resource))
            .invoke_async(&mut conn)
            .await?;
        Ok(remaining)
    }

    async fn try_write_unlock(&self, resource: &str, token: &WriteToken) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .write_unlock
            .key(write_key(resource))
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }
}
