use crate::core::Result;
use crate::rule::encrypt::EncryptRule;
use crate::rule::master_slave::MasterSlaveRule;
use crate::rule::sharding::ShardingRule;

/// The active rule set; selects the routing strategy.
#[derive(Debug, Clone)]
pub enum RuleContext {
    Sharding(ShardingRule),
    MasterSlave(MasterSlaveRule),
    Encrypt(EncryptRule),
}

impl RuleContext {
    pub fn strategy_name(&self) -> &'static str {
        match self {
            Self::Sharding(_) => "sharding",
            Self::MasterSlave(_) => "master_slave",
            Self::Encrypt(_) => "encrypt",
        }
    }

    pub fn data_source_names(&self) -> Vec<&str> {
        match self {
            Self::Sharding(rule) => rule.data_source_names().iter().map(String::as_str).collect(),
            Self::MasterSlave(rule) => rule.data_source_names(),
            Self::Encrypt(rule) => vec![rule.data_source()],
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Sharding(rule) => rule.validate(),
            Self::MasterSlave(rule) => rule.validate(),
            Self::Encrypt(rule) => rule.validate(),
        }
    }
}

impl From<ShardingRule> for RuleContext {
    fn from(rule: ShardingRule) -> Self {
        Self::Sharding(rule)
    }
}

impl From<MasterSlaveRule> for RuleContext {
    fn from(rule: MasterSlaveRule) -> Self {
        Self::MasterSlave(rule)
    }
}

impl From<EncryptRule> for RuleContext {
    fn from(rule: EncryptRule) -> Self {
        Self::Encrypt(rule)
    }
}
