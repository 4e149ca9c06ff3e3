use std::time::Duration;

use crate::error::Result;
use crate::lock::WriteToken;

/// Key holding the reader counter for a resource.
pub fn read_key(resource: &str) -> String {
    [resource, ":rd"].concat()
}

/// Key holding the write token for a resource.
pub fn write_key(resource: &str) -> String {
    [resource, ":wr"].concat()
}

/// One lock-store replica.
///
/// Each operation must run as a single atomic step on the replica: no other
/// caller may observe or mutate the lock state for the resource between the
/// check and the update. Lock state self-expires after its TTL, so a crashed
/// holder never wedges a replica permanently.
///
/// Per resource a replica keeps either a reader counter (under
/// [`read_key`]) or a write token (under [`write_key`]), never both.
pub trait ReplicaClient: Sized + Send + Sync {
    type Config: Send + Sync;

    /// Connect to the replica. Construction is eager: a replica that cannot
    /// be reached fails here, not on first lock attempt.
    fn connect(config: &Self::Config) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// Join the readers of `resource`, creating the counter at 1 if absent.
    /// The state's TTL is raised to `ttl` if its remaining TTL is smaller;
    /// it is never shortened. Returns the new reader count (>= 1), or 0 if
    /// a write lock currently exists.
    fn try_read_lock(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<i64>> + Send;

    /// Take the write lock on `resource` with the given token and TTL.
    /// Returns false if a write lock already exists (no re-entry, no
    /// upgrade) or if any readers are present.
    fn try_write_lock(
        &self,
        resource: &str,
        ttl: Duration,
        token: &WriteToken,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Remove one reader from `resource`, decrementing the counter. Returns
    /// the remaining count (the state is deleted once it drops to 0 or
    /// below), or 0 if no read state exists.
    fn try_read_unlock(
        &self,
        resource: &str,
    ) -> impl std::future::Future<Output = Result<i64>> + Send;

    /// Remove the write lock on `resource` if its token matches. A missing
    /// state or a mismatched token is a silent no-op returning false.
    fn try_write_unlock(
        &self,
        resource: &str,
        token: &WriteToken,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}
