mod replica;

pub use replica::{read_key, write_key, ReplicaClient};
