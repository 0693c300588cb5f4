use serde::{Deserialize, Serialize};

use crate::parser::SqlDialect;

/// Routing behaviour switches, passed explicitly to the routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteProperties {
    /// Log the logic SQL and every route unit at `info` level
    pub sql_show: bool,

    /// Read encrypted columns from the cipher column rather than the plain one
    pub query_with_cipher_column: bool,

    /// Allow a statement to fan out to more than one route unit
    pub allow_cross_shard: bool,

    /// Dialect used to analyze statements
    pub dialect: SqlDialect,
}

impl Default for RouteProperties {
    fn default() -> Self {
        Self {
            sql_show: false,
            query_with_cipher_column: true,
            allow_cross_shard: true,
            dialect: SqlDialect::default(),
        }
    }
}

impl RouteProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql_show(mut self, enabled: bool) -> Self {
        self.sql_show = enabled;
        self
    }

    pub fn query_with_cipher_column(mut self, enabled: bool) -> Self {
        self.query_with_cipher_column = enabled;
        self
    }

    pub fn allow_cross_shard(mut self, enabled: bool) -> Self {
        self.allow_cross_shard = enabled;
        self
    }

    pub fn dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }
}
