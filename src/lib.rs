//! Distributed read/write lock with majority-quorum voting.
//!
//! A [`lock::QuorumRwLock`] coordinates shared (read) and exclusive (write)
//! access to a named resource across a fixed set of independent lock-store
//! replicas. A lock is held once `floor(n / 2) + 1` replicas have granted it,
//! so the failure of a minority of replicas never blocks progress.
//!
//! Replicas are abstracted behind [`storage::traits::ReplicaClient`]. Two
//! backends ship with the crate: [`storage::redis::RedisReplica`] executes
//! the lock-state transitions as server-side Lua scripts, and
//! [`storage::in_memory::InMemoryReplica`] runs them under a local critical
//! section for tests and single-process use.

pub mod error;
pub mod lock;
pub mod storage;

pub use lock::{QuorumRwLock, WriteToken};
