use indexmap::IndexMap;
use log::debug;

use crate::config::RouteProperties;
use crate::core::{Result, ShardingError, Value};
use crate::parser::{StatementContext, StatementKind};
use crate::rewrite::{RewriteEngine, RewriteRule};
use crate::route::{RouteResult, RouteUnit, ShardingCondition, TableMapping};
use crate::rule::{DataNode, ShardingRule, TableRule};

/// Routes a statement over sharded, broadcast and default-data-source tables.
pub fn route<'a>(
    context: &'a StatementContext,
    parameters: &[Value],
    rule: &ShardingRule,
    properties: &RouteProperties,
) -> Result<RouteResult<'a>> {
    let tables = context.table_names();

    let mut sharded: Vec<&TableRule> = Vec::new();
    let mut broadcast: Vec<&str> = Vec::new();
    let mut on_default: Vec<&str> = Vec::new();
    for table in &tables {
        if let Some(table_rule) = rule.find_table_rule(table) {
            sharded.push(table_rule);
        } else if rule.is_broadcast_table(table) {
            broadcast.push(*table);
        } else if rule.default_data_source_name().is_some() {
            on_default.push(*table);
        } else {
            return Err(ShardingError::Routing(format!(
                "no sharding rule or default data source for table {}",
                table
            )));
        }
    }

    let units = if sharded.is_empty() {
        route_unsharded(context, parameters, rule, &tables, !broadcast.is_empty(), !on_default.is_empty())?
    } else if let Some(table) = on_default.first() {
        return Err(ShardingError::Routing(format!(
            "table {} lives on the default data source and cannot be combined with sharded table {}",
            table,
            sharded[0].logic_table()
        )));
    } else if context.kind() == StatementKind::Insert
        && context.insert().is_some_and(|insert| !insert.rows.is_empty())
    {
        route_insert(context, parameters, &sharded, &broadcast)?
    } else {
        route_sharded(context, parameters, rule, &sharded, &broadcast)?
    };

    if !properties.allow_cross_shard && units.len() > 1 {
        return Err(ShardingError::AmbiguousRoute(format!(
            "statement routes to {} units but cross-shard statements are disabled",
            units.len()
        )));
    }

    Ok(RouteResult::new(context, units, context.conditions().clone()))
}

fn identity_mappings(tables: &[&str]) -> Vec<TableMapping> {
    tables.iter().map(|table| TableMapping::identity(table)).collect()
}

fn route_unsharded(
    context: &StatementContext,
    parameters: &[Value],
    rule: &ShardingRule,
    tables: &[&str],
    has_broadcast: bool,
    has_default: bool,
) -> Result<Vec<RouteUnit>> {
    let first = rule
        .data_source_names()
        .first()
        .map(String::as_str)
        .ok_or_else(|| ShardingError::Routing("sharding rule has no data sources".to_string()))?;

    let targets: Vec<&str> = match rule.default_data_source_name() {
        Some(default) if has_default || !has_broadcast => vec![default],
        _ if has_broadcast && context.kind().is_write() => {
            rule.data_source_names().iter().map(String::as_str).collect()
        }
        _ => vec![first],
    };
    debug!("Unsharded statement on tables {:?} routes to {:?}", tables, targets);

    let sql_unit = RewriteEngine::new(RewriteRule::Identity).generate_sql(context, parameters)?;
    let mappings = identity_mappings(tables);
    Ok(targets
        .into_iter()
        .map(|ds| RouteUnit::new(ds, mappings.clone(), sql_unit.clone()))
        .collect())
}

/// Each value row goes to exactly one node; rows sharing a node share a unit.
fn route_insert(
    context: &StatementContext,
    parameters: &[Value],
    sharded: &[&TableRule],
    broadcast: &[&str],
) -> Result<Vec<RouteUnit>> {
    let table_rule = sharded[0];
    let conditions = context.conditions();
    if conditions.is_empty() {
        return Err(ShardingError::AmbiguousRoute(format!(
            "insert into {} names no sharding column values",
            table_rule.logic_table()
        )));
    }

    let mut rows_by_node: IndexMap<DataNode, Vec<usize>> = IndexMap::new();
    for (position, condition) in conditions.iter().enumerate() {
        let row = condition.insert_row.unwrap_or(position);
        let nodes = table_rule.route(Some(condition), parameters)?;
        match nodes.as_slice() {
            [node] => rows_by_node.entry(node.clone()).or_default().push(row),
            _ => {
                return Err(ShardingError::AmbiguousRoute(format!(
                    "insert row {} of {} routes to {} data nodes",
                    row + 1,
                    table_rule.logic_table(),
                    nodes.len()
                )));
            }
        }
    }

    let mut units = Vec::with_capacity(rows_by_node.len());
    for (node, rows) in rows_by_node {
        let mut mappings = vec![TableMapping::new(table_rule.logic_table(), node.table.clone())];
        mappings.extend(identity_mappings(broadcast));
        let sql_unit = RewriteEngine::new(RewriteRule::Sharding {
            mappings: &mappings,
            insert_rows: Some(rows.as_slice()),
        })
        .generate_sql(context, parameters)?;
        units.push(RouteUnit::new(node.data_source, mappings, sql_unit));
    }
    Ok(units)
}

fn route_sharded(
    context: &StatementContext,
    parameters: &[Value],
    rule: &ShardingRule,
    sharded: &[&TableRule],
    broadcast: &[&str],
) -> Result<Vec<RouteUnit>> {
    let branches: Vec<Option<&ShardingCondition>> = if context.conditions().is_empty() {
        vec![None]
    } else {
        context.conditions().iter().map(Some).collect()
    };

    // tables ordered group by group, aligned with every combination below
    let mut ordered: Vec<&TableRule> = Vec::with_capacity(sharded.len());
    let mut combinations: Vec<Vec<DataNode>> = vec![Vec::new()];
    for group in binding_groups(rule, sharded) {
        let group_nodes = route_group(&group, &branches, parameters)?;
        if group_nodes.is_empty() {
            return Err(ShardingError::Routing(format!(
                "no data node of {} matches the statement",
                group[0].logic_table()
            )));
        }

        let mut next = Vec::new();
        for existing in &combinations {
            for nodes in &group_nodes {
                let same_source = existing
                    .first()
                    .is_none_or(|first| first.data_source == nodes[0].data_source);
                if same_source {
                    let mut combined = existing.clone();
                    combined.extend(nodes.iter().cloned());
                    next.push(combined);
                }
            }
        }
        combinations = next;
        ordered.extend(group);
    }

    if combinations.is_empty() {
        let names: Vec<&str> = ordered.iter().map(|t| t.logic_table()).collect();
        return Err(ShardingError::Routing(format!(
            "sharded tables [{}] share no data source",
            names.join(", ")
        )));
    }

    let mut units = Vec::with_capacity(combinations.len());
    for nodes in combinations {
        let mut mappings: Vec<TableMapping> = ordered
            .iter()
            .zip(&nodes)
            .map(|(table_rule, node)| TableMapping::new(table_rule.logic_table(), node.table.clone()))
            .collect();
        mappings.extend(identity_mappings(broadcast));
        let sql_unit = RewriteEngine::new(RewriteRule::Sharding {
            mappings: &mappings,
            insert_rows: None,
        })
        .generate_sql(context, parameters)?;
        units.push(RouteUnit::new(nodes[0].data_source.clone(), mappings, sql_unit));
    }
    Ok(units)
}

/// Splits the referenced sharded tables into binding groups, in reference
/// order; the first table of each group is its primary.
fn binding_groups<'r>(rule: &ShardingRule, sharded: &[&'r TableRule]) -> Vec<Vec<&'r TableRule>> {
    let mut groups: Vec<Vec<&TableRule>> = Vec::new();
    let mut group_keys: Vec<Option<Vec<String>>> = Vec::new();
    for &table_rule in sharded {
        let key = rule
            .binding_group_of(table_rule.logic_table())
            .map(|group| group.to_vec());
        match key
            .as_ref()
            .and_then(|key| group_keys.iter().position(|k| k.as_ref() == Some(key)))
        {
            Some(index) => groups[index].push(table_rule),
            None => {
                groups.push(vec![table_rule]);
                group_keys.push(key);
            }
        }
    }
    groups
}

/// Node combinations for one binding group: the primary's routed nodes, each
/// paired with the bound tables' nodes at the same position, kept only when
/// every bound table also routes there.
fn route_group(
    group: &[&TableRule],
    branches: &[Option<&ShardingCondition>],
    parameters: &[Value],
) -> Result<Vec<Vec<DataNode>>> {
    let mut routed: Vec<Vec<DataNode>> = Vec::with_capacity(group.len());
    for table_rule in group {
        let mut nodes: Vec<DataNode> = Vec::new();
        for branch in branches {
            for node in table_rule.route(*branch, parameters)? {
                if !nodes.contains(&node) {
                    nodes.push(node);
                }
            }
        }
        routed.push(nodes);
    }

    let primary = group[0];
    let mut combinations = Vec::new();
    'nodes: for node in &routed[0] {
        let Some(index) = primary.table_index(node) else {
            continue;
        };
        let mut combination = vec![node.clone()];
        for (bound, bound_nodes) in group.iter().zip(&routed).skip(1) {
            let tables = bound.actual_tables_in(&node.data_source);
            let Some(table) = tables.get(index) else {
                return Err(ShardingError::Routing(format!(
                    "binding table {} has no counterpart for {}",
                    bound.logic_table(),
                    node
                )));
            };
            let counterpart = DataNode::new(node.data_source.clone(), table.clone());
            if !bound_nodes.contains(&counterpart) {
                continue 'nodes;
            }
            combination.push(counterpart);
        }
        combinations.push(combination);
    }
    Ok(combinations)
}
