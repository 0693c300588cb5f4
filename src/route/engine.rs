use log::info;
use tracing::{Level, event, info_span};

use crate::config::RouteProperties;
use crate::core::{Result, ShardingError, Value};
use crate::parser::{StatementAnalyzer, StatementContext};
use crate::route::{RouteResult, encrypt, master_slave, sharding};
use crate::rule::RuleContext;

/// Per-statement routing hints supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteHint {
    /// Send reads to the master even when slaves are available.
    pub force_master: bool,
}

impl RouteHint {
    pub fn force_master() -> Self {
        Self { force_master: true }
    }
}

/// Dispatches a statement to the strategy of the active rule set.
///
/// Routing is pure: the same statement, parameters and rules produce the same
/// route units. The only variation comes from the master/slave load balancer.
///
/// # Examples
///
/// ```
/// use rustsharding::{RoutingEngine, RuleContext, Value};
/// use rustsharding::rule::MasterSlaveRule;
///
/// # fn main() -> rustsharding::Result<()> {
/// let engine = RoutingEngine::default();
/// let rules = RuleContext::from(MasterSlaveRule::new("ms", "master", ["slave_0"]));
/// let context = engine.analyzer().analyze("INSERT INTO t_user (id) VALUES (?)")?;
///
/// let result = engine.route(&context, &[Value::Integer(1)], &rules)?;
/// assert_eq!(result.data_source_names(), vec!["master"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoutingEngine {
    properties: RouteProperties,
}

impl RoutingEngine {
    pub fn new(properties: RouteProperties) -> Self {
        Self { properties }
    }

    pub fn properties(&self) -> &RouteProperties {
        &self.properties
    }

    /// Analyzer for the configured dialect.
    pub fn analyzer(&self) -> StatementAnalyzer {
        StatementAnalyzer::new(self.properties.dialect)
    }

    pub fn route<'a>(
        &self,
        context: &'a StatementContext,
        parameters: &[Value],
        rules: &RuleContext,
    ) -> Result<RouteResult<'a>> {
        self.route_with_hint(context, parameters, rules, RouteHint::default())
    }

    pub fn route_with_hint<'a>(
        &self,
        context: &'a StatementContext,
        parameters: &[Value],
        rules: &RuleContext,
        hint: RouteHint,
    ) -> Result<RouteResult<'a>> {
        let span = info_span!(
            "route.statement",
            strategy = rules.strategy_name(),
            kind = ?context.kind()
        );
        let _enter = span.enter();

        let expected = context.parameter_count();
        if parameters.len() < expected {
            return Err(ShardingError::Rewrite(format!(
                "statement expects {} parameter(s) but {} were bound",
                expected,
                parameters.len()
            )));
        }

        let routed = match rules {
            RuleContext::Sharding(rule) => {
                sharding::route(context, parameters, rule, &self.properties)
            }
            RuleContext::MasterSlave(rule) => master_slave::route(context, parameters, rule, hint),
            RuleContext::Encrypt(rule) => {
                encrypt::route(context, parameters, rule, &self.properties)
            }
        };
        let result = match routed {
            Ok(result) => result,
            Err(err) => {
                event!(Level::DEBUG, error = %err, "statement route failed");
                return Err(err);
            }
        };

        event!(Level::DEBUG, units = result.route_units().len(), "statement routed");
        if self.properties.sql_show {
            info!("Logic SQL: {}", context.sql());
            for unit in result.route_units() {
                info!("Actual SQL: {}", unit);
            }
        }
        Ok(result)
    }
}
