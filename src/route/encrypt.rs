use crate::config::RouteProperties;
use crate::core::{Result, Value};
use crate::parser::StatementContext;
use crate::rewrite::{RewriteEngine, RewriteRule};
use crate::route::{RouteResult, RouteUnit, ShardingConditions, TableMapping};
use crate::rule::EncryptRule;

/// Always one unit on the rule's data source.
pub fn route<'a>(
    context: &'a StatementContext,
    parameters: &[Value],
    rule: &EncryptRule,
    properties: &RouteProperties,
) -> Result<RouteResult<'a>> {
    let sql_unit = RewriteEngine::new(RewriteRule::Encrypt {
        rule,
        query_with_cipher_column: properties.query_with_cipher_column,
    })
    .generate_sql(context, parameters)?;

    let mappings = context
        .table_names()
        .into_iter()
        .map(TableMapping::identity)
        .collect();
    let unit = RouteUnit::new(rule.data_source(), mappings, sql_unit);
    Ok(RouteResult::new(
        context,
        vec![unit],
        ShardingConditions::empty(),
    ))
}
