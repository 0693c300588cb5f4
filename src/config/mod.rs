pub mod inline;
pub mod properties;
pub mod rule_config;

pub use inline::{MAX_INLINE_EXPANSION, expand_inline};
pub use properties::RouteProperties;
pub use rule_config::{
    EncryptColumnConfig, EncryptConfig, EncryptTableConfig, EncryptorConfig, MasterSlaveConfig,
    RuleConfiguration, ShardingConfig, StrategyConfig, TableConfig,
};
