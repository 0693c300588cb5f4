use std::fmt;

use crate::core::Value;
use crate::parser::StatementContext;
use crate::route::ShardingConditions;

/// Final SQL text and the parameters bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlUnit {
    sql: String,
    parameters: Vec<Value>,
}

impl SqlUnit {
    pub fn new(sql: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }
}

impl fmt::Display for SqlUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self.parameters.iter().map(Value::to_sql_literal).collect();
            write!(f, " ::: [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// Logical table name and the physical table it was routed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableMapping {
    pub logic_table: String,
    pub actual_table: String,
}

impl TableMapping {
    pub fn new(logic_table: impl Into<String>, actual_table: impl Into<String>) -> Self {
        Self {
            logic_table: logic_table.into(),
            actual_table: actual_table.into(),
        }
    }

    pub fn identity(table: &str) -> Self {
        Self::new(table, table)
    }
}

/// One physical target and the SQL to run against it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteUnit {
    data_source_name: String,
    table_mappings: Vec<TableMapping>,
    sql_unit: SqlUnit,
}

impl RouteUnit {
    pub fn new(
        data_source_name: impl Into<String>,
        table_mappings: Vec<TableMapping>,
        sql_unit: SqlUnit,
    ) -> Self {
        Self {
            data_source_name: data_source_name.into(),
            table_mappings,
            sql_unit,
        }
    }

    pub fn data_source_name(&self) -> &str {
        &self.data_source_name
    }

    pub fn table_mappings(&self) -> &[TableMapping] {
        &self.table_mappings
    }

    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.table_mappings
            .iter()
            .find(|m| m.logic_table.eq_ignore_ascii_case(logic_table))
            .map(|m| m.actual_table.as_str())
    }

    pub fn sql_unit(&self) -> &SqlUnit {
        &self.sql_unit
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::: {}", self.data_source_name, self.sql_unit)
    }
}

/// Everything the execution layer needs for one logical statement.
///
/// Built once per statement and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RouteResult<'a> {
    statement_context: &'a StatementContext,
    route_units: Vec<RouteUnit>,
    sharding_conditions: ShardingConditions,
}

impl<'a> RouteResult<'a> {
    pub(crate) fn new(
        statement_context: &'a StatementContext,
        route_units: Vec<RouteUnit>,
        sharding_conditions: ShardingConditions,
    ) -> Self {
        Self {
            statement_context,
            route_units,
            sharding_conditions,
        }
    }

    pub fn statement_context(&self) -> &'a StatementContext {
        self.statement_context
    }

    pub fn route_units(&self) -> &[RouteUnit] {
        &self.route_units
    }

    pub fn into_route_units(self) -> Vec<RouteUnit> {
        self.route_units
    }

    pub fn sharding_conditions(&self) -> &ShardingConditions {
        &self.sharding_conditions
    }

    pub fn is_single_route(&self) -> bool {
        self.route_units.len() == 1
    }

    /// Distinct data source names in route order.
    pub fn data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.route_units {
            if !names.contains(&unit.data_source_name()) {
                names.push(unit.data_source_name());
            }
        }
        names
    }

    /// Distinct physical tables routed for `logic_table`, in route order.
    pub fn actual_tables(&self, logic_table: &str) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for table in self
            .route_units
            .iter()
            .filter_map(|unit| unit.actual_table(logic_table))
        {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }
}
