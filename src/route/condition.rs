use crate::core::{Result, ShardingError, Value};

/// Operand of a shard-determining predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOperand {
    /// Zero-based position in the bound parameter list.
    Parameter(usize),
    Literal(Value),
}

impl ConditionOperand {
    pub fn resolve(&self, parameters: &[Value]) -> Result<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Parameter(index) => parameters.get(*index).cloned().ok_or_else(|| {
                ShardingError::Routing(format!(
                    "parameter {} is referenced but only {} bound",
                    index + 1,
                    parameters.len()
                ))
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Equal,
    In,
    Between,
}

/// One `column <op> operands` predicate lifted from the statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionValue {
    /// Logical table the column belongs to, `None` when the column was unqualified
    /// in a multi-table statement.
    pub table: Option<String>,
    pub column: String,
    pub operator: ConditionOperator,
    pub operands: Vec<ConditionOperand>,
}

impl ConditionValue {
    pub fn applies_to(&self, table: &str, column: &str) -> bool {
        self.column.eq_ignore_ascii_case(column)
            && self
                .table
                .as_deref()
                .is_none_or(|owner| owner.eq_ignore_ascii_case(table))
    }
}

/// Value handed to a sharding algorithm.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValue {
    Precise(Vec<Value>),
    Range { lower: Value, upper: Value },
}

/// Predicates that hold together (AND). For INSERT, one condition per value row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardingCondition {
    pub values: Vec<ConditionValue>,
    pub insert_row: Option<usize>,
}

impl ShardingCondition {
    pub fn new(values: Vec<ConditionValue>) -> Self {
        Self {
            values,
            insert_row: None,
        }
    }

    pub fn for_insert_row(row: usize, values: Vec<ConditionValue>) -> Self {
        Self {
            values,
            insert_row: Some(row),
        }
    }

    /// Resolves the value for `table.column`, or `None` when this condition does
    /// not constrain it. Several equalities on one column intersect.
    pub fn sharding_value(
        &self,
        table: &str,
        column: &str,
        parameters: &[Value],
    ) -> Result<Option<ShardingValue>> {
        let mut precise: Option<Vec<Value>> = None;
        let mut range: Option<ShardingValue> = None;

        for value in self.values.iter().filter(|v| v.applies_to(table, column)) {
            let resolved = value
                .operands
                .iter()
                .map(|operand| operand.resolve(parameters))
                .collect::<Result<Vec<_>>>()?;

            match value.operator {
                ConditionOperator::Equal | ConditionOperator::In => {
                    precise = Some(match precise {
                        None => dedupe(resolved),
                        Some(existing) => existing
                            .into_iter()
                            .filter(|v| resolved.contains(v))
                            .collect(),
                    });
                }
                ConditionOperator::Between => {
                    let mut bounds = resolved.into_iter();
                    if let (Some(lower), Some(upper)) = (bounds.next(), bounds.next()) {
                        range = Some(ShardingValue::Range { lower, upper });
                    }
                }
            }
        }

        Ok(precise.map(ShardingValue::Precise).or(range))
    }
}

fn dedupe(values: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Alternatives (OR) of shard-determining conditions. Empty means the
/// statement carries nothing that narrows its targets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardingConditions {
    conditions: Vec<ShardingCondition>,
}

impl ShardingConditions {
    pub fn new(conditions: Vec<ShardingCondition>) -> Self {
        Self { conditions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> &[ShardingCondition] {
        &self.conditions
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShardingCondition> {
        self.conditions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equal(table: Option<&str>, column: &str, operand: ConditionOperand) -> ConditionValue {
        ConditionValue {
            table: table.map(str::to_string),
            column: column.to_string(),
            operator: ConditionOperator::Equal,
            operands: vec![operand],
        }
    }

    #[test]
    fn test_sharding_value_resolves_parameters() {
        let condition = ShardingCondition::new(vec![equal(
            Some("t_order"),
            "user_id",
            ConditionOperand::Parameter(1),
        )]);
        let params = vec![Value::from("x"), Value::Integer(7)];

        let value = condition
            .sharding_value("t_order", "USER_ID", &params)
            .unwrap();
        assert_eq!(value, Some(ShardingValue::Precise(vec![Value::Integer(7)])));
    }

    #[test]
    fn test_sharding_value_ignores_other_tables() {
        let condition = ShardingCondition::new(vec![equal(
            Some("t_user"),
            "user_id",
            ConditionOperand::Literal(Value::Integer(1)),
        )]);
        assert_eq!(
            condition.sharding_value("t_order", "user_id", &[]).unwrap(),
            None
        );
    }

    #[test]
    fn test_equalities_on_same_column_intersect() {
        let in_list = ConditionValue {
            table: None,
            column: "user_id".into(),
            operator: ConditionOperator::In,
            operands: vec![
                ConditionOperand::Literal(Value::Integer(1)),
                ConditionOperand::Literal(Value::Integer(2)),
            ],
        };
        let condition = ShardingCondition::new(vec![
            in_list,
            equal(None, "user_id", ConditionOperand::Literal(Value::Integer(2))),
        ]);
        assert_eq!(
            condition.sharding_value("t_order", "user_id", &[]).unwrap(),
            Some(ShardingValue::Precise(vec![Value::Integer(2)]))
        );
    }

    #[test]
    fn test_missing_parameter_is_routing_error() {
        let condition = ShardingCondition::new(vec![equal(
            None,
            "user_id",
            ConditionOperand::Parameter(3),
        )]);
        let err = condition
            .sharding_value("t_order", "user_id", &[Value::Integer(1)])
            .unwrap_err();
        assert!(matches!(err, ShardingError::Routing(_)));
    }
}
