mod replica;

pub use replica::{
    RedisReplica, RedisReplicaConfig, RedisReplicaConfigBuilder, RedisReplicaConfigBuilderError,
};
