use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::{
    error::{LockError, Result},
    lock::WriteToken,
    storage::traits::ReplicaClient,
};

/// Pause between retry passes, so an unreachable replica is not hammered at
/// network round-trip speed while the timeout budget runs down.
const RETRY_PAUSE: Duration = Duration::from_millis(1);

pub(crate) fn quorum_size(replica_count: usize) -> usize {
    replica_count / 2 + 1
}

/// Distributed read/write lock over a fixed set of lock-store replicas.
///
/// A lock call succeeds once a majority of replicas (`floor(n / 2) + 1`) has
/// granted it. Individual replica failures are absorbed: a replica that
/// refuses or cannot be reached is simply retried until the timeout budget
/// is spent. Only the aggregate outcome is reported to the caller.
///
/// The coordinator keeps no per-lock state of its own; all methods take
/// `&self` and concurrent calls are resolved entirely by the replica-side
/// atomic transitions plus majority agreement.
pub struct QuorumRwLock<R> {
    replicas: Vec<R>,
    quorum: usize,
}

impl<R: ReplicaClient> QuorumRwLock<R> {
    /// Connect to every replica, in order. Fails if the replica set is empty
    /// or any replica cannot be reached.
    pub async fn connect(configs: impl IntoIterator<Item = R::Config>) -> Result<Self> {
        let mut replicas = Vec::new();
        for config in configs {
            replicas.push(R::connect(&config).await?);
        }
        if replicas.is_empty() {
            return Err(LockError::ConfigError("replica set is empty".to_string()));
        }
        let quorum = quorum_size(replicas.len());
        info!("Connected to {} lock-store replicas, quorum is {}", replicas.len(), quorum);
        Ok(QuorumRwLock { replicas, quorum })
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Acquire a shared (read) lock on `resource`.
    ///
    /// Returns true once a quorum of replicas has admitted this reader. A
    /// zero `ttl` fails immediately without contacting any replica. On
    /// failure to reach quorum within `timeout`, any partially acquired
    /// replicas are released again (best effort) before returning false.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn acquire_read(&self, resource: &str, ttl: Duration, timeout: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let deadline = Instant::now() + timeout;
        let mut pending: Vec<&R> = self.replicas.iter().collect();
        let mut granted = 0;
        loop {
            let mut retry = Vec::new();
            for replica in pending {
                match replica.try_read_lock(resource, ttl).await {
                    Ok(count) if count > 0 => {
                        granted += 1;
                        if granted >= self.quorum {
                            debug!(granted, "Read lock acquired");
                            return true;
                        }
                    }
                    Ok(_) => retry.push(replica),
                    Err(err) => {
                        debug!("Read lock attempt failed on a replica: {}", err);
                        retry.push(replica);
                    }
                }
            }
            pending = retry;
            if Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(RETRY_PAUSE).await;
        }
        debug!(granted, quorum = self.quorum, "Read lock timed out below quorum, rolling back");
        self.release(resource, None).await;
        false
    }

    /// Acquire an exclusive (write) lock on `resource`.
    ///
    /// A single token is generated up front and offered to every replica;
    /// it is returned to the caller on quorum success and must be presented
    /// to [`release`](Self::release) the lock. Failure semantics match
    /// [`acquire_read`](Self::acquire_read).
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn acquire_write(
        &self,
        resource: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Option<WriteToken> {
        if ttl.is_zero() {
            return None;
        }
        let token = WriteToken::generate();
        let deadline = Instant::now() + timeout;
        let mut pending: Vec<&R> = self.replicas.iter().collect();
        let mut granted = 0;
        loop {
            let mut retry = Vec::new();
            for replica in pending {
                match replica.try_write_lock(resource, ttl, &token).await {
                    Ok(true) => {
                        granted += 1;
                        if granted >= self.quorum {
                            debug!(granted, %token, "Write lock acquired");
                            return Some(token);
                        }
                    }
                    Ok(false) => retry.push(replica),
                    Err(err) => {
                        debug!("Write lock attempt failed on a replica: {}", err);
                        retry.push(replica);
                    }
                }
            }
            pending = retry;
            if Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(RETRY_PAUSE).await;
        }
        debug!(granted, quorum = self.quorum, "Write lock timed out below quorum, rolling back");
        self.release(resource, Some(&token)).await;
        None
    }

    /// Release a lock on `resource` on every replica.
    ///
    /// Without a token this removes the caller from the readers of the
    /// resource (decrementing each replica's reader count); with a token it
    /// removes the matching write lock. Both forms are idempotent:
    /// replicas without matching state report a refusal, which is ignored,
    /// so releasing is always safe to broadcast (and is also used to roll
    /// back partial acquisitions).
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn release(&self, resource: &str, token: Option<&WriteToken>) {
        for replica in &self.replicas {
            let result = match token {
                None => replica.try_read_unlock(resource).await.map(|_| ()),
                Some(token) => replica.try_write_unlock(resource, token).await.map(|_| ()),
            };
            if let Err(err) = result {
                debug!("Unlock failed on a replica: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::quorum_size;

    #[test]
    fn quorum_is_a_strict_majority() {
        assert_eq!(quorum_size(1), 1);
        assert_eq!(quorum_size(2), 2);
        assert_eq!(quorum_size(3), 2);
        assert_eq!(quorum_size(4), 3);
        assert_eq!(quorum_size(5), 3);
    }
}
