use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{RouteProperties, expand_inline};
use crate::core::{Result, ShardingError};
use crate::rule::{
    DataNode, EncryptColumn, EncryptRule, EncryptTable, Encryptor, MasterSlaveRule, RuleContext,
    ShardingRule, ShardingStrategy, TableRule, encryptor, load_balance_algorithm,
    sharding_algorithm,
};

/// JSON rule file: routing properties plus exactly one rule section.
///
/// ```json
/// {
///   "props": { "sql_show": true },
///   "sharding": {
///     "data_sources": ["ds_${0..1}"],
///     "tables": {
///       "t_order": {
///         "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
///         "database_strategy": { "sharding_column": "user_id", "algorithm": "mod" },
///         "table_strategy": { "sharding_column": "order_id", "algorithm": "mod" }
///       }
///     },
///     "broadcast_tables": ["t_config"]
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfiguration {
    #[serde(default)]
    pub props: RouteProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharding: Option<ShardingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_slave: Option<MasterSlaveConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<EncryptConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShardingConfig {
    /// Data source names; inline expressions allowed.
    pub data_sources: Vec<String>,
    #[serde(default)]
    pub tables: IndexMap<String, TableConfig>,
    /// Each entry lists bound tables separated by commas.
    #[serde(default)]
    pub binding_tables: Vec<String>,
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    #[serde(default)]
    pub default_data_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub actual_data_nodes: String,
    #[serde(default)]
    pub database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<StrategyConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    pub sharding_column: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterSlaveConfig {
    pub name: String,
    pub master: String,
    pub slaves: Vec<String>,
    #[serde(default)]
    pub disabled_slaves: Vec<String>,
    #[serde(default = "default_load_balance")]
    pub load_balance: String,
}

fn default_load_balance() -> String {
    "round_robin".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptConfig {
    pub data_source: String,
    #[serde(default)]
    pub encryptors: IndexMap<String, EncryptorConfig>,
    #[serde(default)]
    pub tables: IndexMap<String, EncryptTableConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptorConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub salt: Option<String>,
    /// Secret for reversible encryptors such as `aes`.
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptTableConfig {
    pub columns: IndexMap<String, EncryptColumnConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptColumnConfig {
    pub cipher_column: String,
    #[serde(default)]
    pub plain_column: Option<String>,
    pub encryptor: String,
}

impl RuleConfiguration {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ShardingError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builds and validates the configured rule set.
    pub fn build(&self) -> Result<RuleContext> {
        let context = match (&self.sharding, &self.master_slave, &self.encrypt) {
            (Some(sharding), None, None) => RuleContext::Sharding(sharding.build()?),
            (None, Some(master_slave), None) => RuleContext::MasterSlave(master_slave.build()?),
            (None, None, Some(encrypt)) => RuleContext::Encrypt(encrypt.build()?),
            (None, None, None) => {
                return Err(ShardingError::Config(
                    "configuration defines no rules".to_string(),
                ));
            }
            _ => {
                return Err(ShardingError::Config(
                    "configuration must define exactly one of sharding, master_slave or encrypt"
                        .to_string(),
                ));
            }
        };
        context.validate()?;
        Ok(context)
    }
}

impl StrategyConfig {
    fn build(&self) -> Result<ShardingStrategy> {
        Ok(ShardingStrategy::new(
            self.sharding_column.clone(),
            sharding_algorithm(&self.algorithm)?,
        ))
    }
}

impl ShardingConfig {
    fn build(&self) -> Result<ShardingRule> {
        let mut data_sources = Vec::new();
        for expression in &self.data_sources {
            data_sources.extend(expand_inline(expression)?);
        }
        let mut rule = ShardingRule::new(data_sources);

        for (logic_table, table) in &self.tables {
            let nodes = expand_inline(&table.actual_data_nodes)?
                .iter()
                .map(|node| DataNode::parse(node))
                .collect::<Result<Vec<_>>>()?;
            let mut table_rule = TableRule::new(logic_table.clone(), nodes);
            if let Some(strategy) = &table.database_strategy {
                table_rule = table_rule.database_strategy(strategy.build()?);
            }
            if let Some(strategy) = &table.table_strategy {
                table_rule = table_rule.table_strategy(strategy.build()?);
            }
            rule = rule.table_rule(table_rule);
        }

        for group in &self.binding_tables {
            rule = rule.binding_group(group.split(',').map(str::trim).filter(|t| !t.is_empty()));
        }
        for table in &self.broadcast_tables {
            rule = rule.broadcast_table(table.clone());
        }
        if let Some(default) = &self.default_data_source {
            rule = rule.default_data_source(default.clone());
        }
        Ok(rule)
    }
}

impl MasterSlaveConfig {
    fn build(&self) -> Result<MasterSlaveRule> {
        let mut rule = MasterSlaveRule::new(
            self.name.clone(),
            self.master.clone(),
            self.slaves.iter().cloned(),
        )
        .load_balance(load_balance_algorithm(&self.load_balance)?);
        for slave in &self.disabled_slaves {
            rule = rule.disable_slave(slave.clone());
        }
        Ok(rule)
    }
}

impl EncryptConfig {
    fn build(&self) -> Result<EncryptRule> {
        let mut encryptors: IndexMap<&str, Arc<dyn Encryptor>> = IndexMap::new();
        for (name, config) in &self.encryptors {
            let built = encryptor(&config.kind, config.salt.as_deref(), config.key.as_deref())?;
            encryptors.insert(name, built);
        }

        let mut rule = EncryptRule::new(self.data_source.clone());
        for (table_name, table) in &self.tables {
            let mut encrypt_table = EncryptTable::new(table_name.clone());
            for (logic_column, column) in &table.columns {
                let encryptor = encryptors
                    .get(column.encryptor.as_str())
                    .cloned()
                    .ok_or_else(|| {
                        ShardingError::Config(format!(
                            "column {}.{} uses undefined encryptor '{}'",
                            table_name, logic_column, column.encryptor
                        ))
                    })?;
                let mut encrypt_column =
                    EncryptColumn::new(logic_column.clone(), column.cipher_column.clone(), encryptor);
                if let Some(plain) = &column.plain_column {
                    encrypt_column = encrypt_column.plain_column(plain.clone());
                }
                encrypt_table = encrypt_table.column(encrypt_column);
            }
            rule = rule.table(encrypt_table);
        }
        Ok(rule)
    }
}
