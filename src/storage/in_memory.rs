mod replica;

pub use replica::{InMemoryReplica, InMemoryStore};
