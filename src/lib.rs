// ============================================================================
// RustSharding Library
// ============================================================================

pub mod core;
pub mod parser;
pub mod route;
pub mod rewrite;
pub mod rule;
pub mod config;
pub mod merge;

// Re-export main types for convenience
pub use core::{ErrorKind, Result, ShardingError, Value};
pub use parser::{SqlDialect, StatementAnalyzer, StatementContext, StatementKind};
pub use route::{RouteHint, RouteResult, RouteUnit, RoutingEngine, SqlUnit, TableMapping};
pub use rewrite::{RewriteEngine, RewriteRule};
pub use rule::{RuleContext, RuleRegistry};
pub use config::{RouteProperties, RuleConfiguration};
pub use merge::{DistinctMerger, QueryResult, QueryRow};

// ============================================================================
// High-level API
// ============================================================================

/// Analyzes `sql` with the engine's dialect and routes it in one call.
///
/// The returned units own their SQL and parameters, so the statement context
/// does not need to outlive the call.
///
/// # Examples
///
/// ```
/// use rustsharding::{RoutingEngine, RuleContext, Value, route_sql};
/// use rustsharding::rule::{EncryptRule, EncryptTable, EncryptColumn, Sha256Encryptor};
/// use std::sync::Arc;
///
/// # fn main() -> rustsharding::Result<()> {
/// let rules = RuleContext::from(EncryptRule::new("ds").table(
///     EncryptTable::new("t_user")
///         .column(EncryptColumn::new("pwd", "pwd_cipher", Arc::new(Sha256Encryptor::new()))),
/// ));
///
/// let units = route_sql(
///     &RoutingEngine::default(),
///     "SELECT id FROM t_user WHERE pwd = ?",
///     &[Value::from("secret")],
///     &rules,
/// )?;
/// assert_eq!(units.len(), 1);
/// assert_eq!(units[0].sql_unit().sql(), "SELECT id FROM t_user WHERE pwd_cipher = ?");
/// # Ok(())
/// # }
/// ```
pub fn route_sql(
    engine: &RoutingEngine,
    sql: &str,
    parameters: &[Value],
    rules: &RuleContext,
) -> Result<Vec<RouteUnit>> {
    let context = engine.analyzer().analyze(sql)?;
    let result = engine.route(&context, parameters, rules)?;
    Ok(result.into_route_units())
}
