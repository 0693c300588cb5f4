use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::core::{Result, ShardingError, Value};
use crate::route::ShardingCondition;
use crate::rule::algorithm::ShardingAlgorithm;

/// One physical table in one data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parses `data_source.table`.
    pub fn parse(text: &str) -> Result<Self> {
        match text.trim().split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(Self::new(ds, table))
            }
            _ => Err(ShardingError::Config(format!(
                "data node '{}' must be written as data_source.table",
                text
            ))),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

/// Sharding column plus the algorithm applied to its value.
#[derive(Debug, Clone)]
pub struct ShardingStrategy {
    column: String,
    algorithm: Arc<dyn ShardingAlgorithm>,
}

impl ShardingStrategy {
    pub fn new(column: impl Into<String>, algorithm: Arc<dyn ShardingAlgorithm>) -> Self {
        Self {
            column: column.into(),
            algorithm,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn algorithm(&self) -> &Arc<dyn ShardingAlgorithm> {
        &self.algorithm
    }

    /// Targets for `table` under `condition`; all of `available` when the
    /// condition does not constrain the sharding column.
    fn shard(
        &self,
        table: &str,
        available: &[String],
        condition: Option<&ShardingCondition>,
        parameters: &[Value],
    ) -> Result<Vec<String>> {
        let value = match condition {
            Some(condition) => condition.sharding_value(table, &self.column, parameters)?,
            None => None,
        };
        let Some(value) = value else {
            return Ok(available.to_vec());
        };

        let targets = self.algorithm.do_sharding(available, &value)?;
        if let Some(unknown) = targets.iter().find(|t| !available.contains(*t)) {
            return Err(ShardingError::Routing(format!(
                "algorithm '{}' returned unknown target '{}' for table {}",
                self.algorithm.name(),
                unknown,
                table
            )));
        }
        Ok(targets)
    }
}

/// Layout of one logical table across data sources.
#[derive(Debug, Clone)]
pub struct TableRule {
    logic_table: String,
    actual_data_nodes: Vec<DataNode>,
    database_strategy: Option<ShardingStrategy>,
    table_strategy: Option<ShardingStrategy>,
}

impl TableRule {
    pub fn new(logic_table: impl Into<String>, actual_data_nodes: Vec<DataNode>) -> Self {
        Self {
            logic_table: logic_table.into(),
            actual_data_nodes,
            database_strategy: None,
            table_strategy: None,
        }
    }

    pub fn database_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.database_strategy = Some(strategy);
        self
    }

    pub fn table_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.table_strategy = Some(strategy);
        self
    }

    pub fn logic_table(&self) -> &str {
        &self.logic_table
    }

    pub fn actual_data_nodes(&self) -> &[DataNode] {
        &self.actual_data_nodes
    }

    /// Distinct data sources holding this table, in node order.
    pub fn data_source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for node in &self.actual_data_nodes {
            if !names.contains(&node.data_source) {
                names.push(node.data_source.clone());
            }
        }
        names
    }

    pub fn actual_tables_in(&self, data_source: &str) -> Vec<String> {
        self.actual_data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .map(|node| node.table.clone())
            .collect()
    }

    /// Position of `node` among the tables of its data source.
    pub fn table_index(&self, node: &DataNode) -> Option<usize> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source == node.data_source)
            .position(|n| n.table == node.table)
    }

    /// Nodes selected by `condition`; every node when it is `None`.
    pub fn route(
        &self,
        condition: Option<&ShardingCondition>,
        parameters: &[Value],
    ) -> Result<Vec<DataNode>> {
        let data_sources = self.data_source_names();
        let selected_sources = match &self.database_strategy {
            Some(strategy) => strategy.shard(&self.logic_table, &data_sources, condition, parameters)?,
            None => data_sources,
        };

        let mut nodes = Vec::new();
        for data_source in selected_sources {
            let tables = self.actual_tables_in(&data_source);
            let selected_tables = match &self.table_strategy {
                Some(strategy) => strategy.shard(&self.logic_table, &tables, condition, parameters)?,
                None => tables,
            };
            nodes.extend(
                selected_tables
                    .into_iter()
                    .map(|table| DataNode::new(data_source.clone(), table)),
            );
        }
        Ok(nodes)
    }
}

/// Sharding configuration for a set of data sources.
#[derive(Debug, Clone)]
pub struct ShardingRule {
    data_source_names: Vec<String>,
    table_rules: Vec<TableRule>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: Vec<String>,
    default_data_source: Option<String>,
}

impl ShardingRule {
    pub fn new<I, S>(data_source_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data_source_names: data_source_names.into_iter().map(Into::into).collect(),
            table_rules: Vec::new(),
            binding_groups: Vec::new(),
            broadcast_tables: Vec::new(),
            default_data_source: None,
        }
    }

    pub fn table_rule(mut self, rule: TableRule) -> Self {
        self.table_rules.push(rule);
        self
    }

    /// Tables sharded identically; routed together without a cross product.
    pub fn binding_group<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binding_groups
            .push(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn broadcast_table(mut self, table: impl Into<String>) -> Self {
        self.broadcast_tables.push(table.into());
        self
    }

    pub fn default_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.default_data_source = Some(data_source.into());
        self
    }

    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn table_rules(&self) -> &[TableRule] {
        &self.table_rules
    }

    pub fn default_data_source_name(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_rules
            .iter()
            .find(|rule| rule.logic_table.eq_ignore_ascii_case(logic_table))
    }

    pub fn is_broadcast_table(&self, table: &str) -> bool {
        self.broadcast_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }

    /// The binding group containing `table`, if any.
    pub fn binding_group_of(&self, table: &str) -> Option<&[String]> {
        self.binding_groups
            .iter()
            .find(|group| group.iter().any(|t| t.eq_ignore_ascii_case(table)))
            .map(Vec::as_slice)
    }

    /// Checks that:
    /// - data source names are present and distinct,
    /// - every table rule has nodes on known data sources,
    /// - binding groups name sharded tables with identical layouts,
    /// - broadcast tables are not also sharded,
    /// - the default data source is configured.
    pub fn validate(&self) -> Result<()> {
        if self.data_source_names.is_empty() {
            return Err(ShardingError::Config(
                "sharding rule needs at least one data source".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for name in &self.data_source_names {
            if name.trim().is_empty() {
                return Err(ShardingError::Config(
                    "data source name must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ShardingError::Config(format!(
                    "data source '{}' appears more than once",
                    name
                )));
            }
        }

        let mut logic_tables = HashSet::new();
        for rule in &self.table_rules {
            if !logic_tables.insert(rule.logic_table.to_ascii_lowercase()) {
                return Err(ShardingError::Config(format!(
                    "table rule for '{}' appears more than once",
                    rule.logic_table
                )));
            }
            if rule.actual_data_nodes.is_empty() {
                return Err(ShardingError::Config(format!(
                    "table rule for '{}' has no data nodes",
                    rule.logic_table
                )));
            }
            if let Some(node) = rule
                .actual_data_nodes
                .iter()
                .find(|node| !self.data_source_names.contains(&node.data_source))
            {
                return Err(ShardingError::Config(format!(
                    "data node {} of '{}' references an unknown data source",
                    node, rule.logic_table
                )));
            }
        }

        for group in &self.binding_groups {
            let mut layout: Option<Vec<(String, usize)>> = None;
            for table in group {
                let rule = self.find_table_rule(table).ok_or_else(|| {
                    ShardingError::Config(format!(
                        "binding table '{}' has no table rule",
                        table
                    ))
                })?;
                let current: Vec<(String, usize)> = rule
                    .data_source_names()
                    .into_iter()
                    .map(|ds| {
                        let count = rule.actual_tables_in(&ds).len();
                        (ds, count)
                    })
                    .collect();
                match &layout {
                    None => layout = Some(current),
                    Some(expected) if *expected != current => {
                        return Err(ShardingError::Config(format!(
                            "binding table '{}' does not share the layout of '{}'",
                            table, group[0]
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        if let Some(table) = self
            .broadcast_tables
            .iter()
            .find(|t| self.find_table_rule(t).is_some())
        {
            return Err(ShardingError::Config(format!(
                "broadcast table '{}' also has a table rule",
                table
            )));
        }

        if let Some(ds) = &self.default_data_source {
            if !self.data_source_names.contains(ds) {
                return Err(ShardingError::Config(format!(
                    "default data source '{}' is not configured",
                    ds
                )));
            }
        }

        Ok(())
    }
}
