use log::debug;

use crate::core::{Result, Value};
use crate::parser::StatementContext;
use crate::rewrite::{RewriteEngine, RewriteRule};
use crate::route::{RouteHint, RouteResult, RouteUnit, ShardingConditions, TableMapping};
use crate::rule::MasterSlaveRule;

/// Writes, locking reads and forced reads go to the master; other reads to a
/// balanced slave. The SQL is rewritten once and never changes.
pub fn route<'a>(
    context: &'a StatementContext,
    parameters: &[Value],
    rule: &MasterSlaveRule,
    hint: RouteHint,
) -> Result<RouteResult<'a>> {
    let sql_unit = RewriteEngine::new(RewriteRule::Identity).generate_sql(context, parameters)?;

    let to_master = context.kind().is_write() || context.is_locking() || hint.force_master;
    let data_source = if to_master {
        rule.master()
    } else {
        rule.read_data_source()
    };
    debug!(
        "Master/slave rule '{}' routes {:?} to {}",
        rule.name(),
        context.kind(),
        data_source
    );

    let mappings = context
        .table_names()
        .into_iter()
        .map(TableMapping::identity)
        .collect();
    let unit = RouteUnit::new(data_source, mappings, sql_unit);
    Ok(RouteResult::new(
        context,
        vec![unit],
        ShardingConditions::empty(),
    ))
}
