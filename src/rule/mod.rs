pub mod algorithm;
pub mod context;
pub mod encrypt;
pub mod master_slave;
pub mod registry;
pub mod shard_hash;
pub mod sharding;

pub use algorithm::{
    HashModShardingAlgorithm, ModShardingAlgorithm, ShardingAlgorithm, sharding_algorithm,
};
pub use context::RuleContext;
pub use encrypt::{
    AesEncryptor, EncryptColumn, EncryptRule, EncryptTable, Encryptor, Sha256Encryptor, encryptor,
};
pub use master_slave::{
    LoadBalanceAlgorithm, MasterSlaveRule, RandomLoadBalance, RoundRobinLoadBalance,
    load_balance_algorithm,
};
pub use registry::RuleRegistry;
pub use sharding::{DataNode, ShardingRule, ShardingStrategy, TableRule};
