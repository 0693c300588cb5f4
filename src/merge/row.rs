use std::hash::{Hash, Hasher};

use crate::core::{Result, ShardingError, Value};

/// One result row as seen by the merge layer.
///
/// Column positions are 1-based. Equality is judged from the left-hand row:
/// with no distinct columns the whole rows are compared; otherwise both rows
/// must name the same distinct columns, in the same order, holding equal
/// values. `a == b` therefore does not imply `b == a` when only one side has
/// distinct columns. Rows merged together always share one index list, which
/// keeps hashing and set membership consistent for them.
#[derive(Debug, Clone)]
pub struct QueryRow {
    row_data: Vec<Value>,
    distinct_column_indexes: Vec<usize>,
}

impl QueryRow {
    pub fn new(row_data: Vec<Value>, distinct_column_indexes: Vec<usize>) -> Self {
        Self {
            row_data,
            distinct_column_indexes,
        }
    }

    /// A row compared on all of its columns.
    pub fn from_values(row_data: Vec<Value>) -> Self {
        Self::new(row_data, Vec::new())
    }

    pub fn column_value(&self, index: usize) -> Result<&Value> {
        index
            .checked_sub(1)
            .and_then(|i| self.row_data.get(i))
            .ok_or(ShardingError::IndexOutOfRange {
                index,
                len: self.row_data.len(),
            })
    }

    pub fn row_data(&self) -> &[Value] {
        &self.row_data
    }

    pub fn distinct_column_indexes(&self) -> &[usize] {
        &self.distinct_column_indexes
    }

    pub fn into_row_data(self) -> Vec<Value> {
        self.row_data
    }
}

impl PartialEq for QueryRow {
    fn eq(&self, other: &Self) -> bool {
        if self.distinct_column_indexes.is_empty() {
            return self.row_data == other.row_data;
        }
        self.distinct_column_indexes == other.distinct_column_indexes
            && self.distinct_column_indexes.iter().all(|&index| {
                match (self.column_value(index), other.column_value(index)) {
                    (Ok(left), Ok(right)) => left == right,
                    _ => false,
                }
            })
    }
}

impl Eq for QueryRow {}

impl Hash for QueryRow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.distinct_column_indexes.is_empty() {
            self.row_data.hash(state);
            return;
        }
        for &index in &self.distinct_column_indexes {
            if let Ok(value) = self.column_value(index) {
                value.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(row: &QueryRow) -> u64 {
        let mut hasher = DefaultHasher::new();
        row.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_column_value_is_one_based() {
        let row = QueryRow::from_values(vec![Value::Integer(10), Value::from("a")]);
        assert_eq!(row.column_value(1).unwrap(), &Value::Integer(10));
        assert_eq!(row.column_value(2).unwrap(), &Value::from("a"));
        assert_eq!(
            row.column_value(0).unwrap_err(),
            ShardingError::IndexOutOfRange { index: 0, len: 2 }
        );
        assert_eq!(
            row.column_value(3).unwrap_err(),
            ShardingError::IndexOutOfRange { index: 3, len: 2 }
        );
    }

    #[test]
    fn test_distinct_columns_ignore_others() {
        let a = QueryRow::new(vec![Value::Integer(1), Value::from("x")], vec![1]);
        let b = QueryRow::new(vec![Value::Integer(1), Value::from("y")], vec![1]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_out_of_range_distinct_index_is_unequal() {
        let a = QueryRow::new(vec![Value::Integer(1)], vec![2]);
        let b = QueryRow::new(vec![Value::Integer(1)], vec![2]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_index_order_is_unequal() {
        let a = QueryRow::new(vec![Value::Integer(1), Value::Integer(1)], vec![1, 2]);
        let b = QueryRow::new(vec![Value::Integer(1), Value::Integer(1)], vec![2, 1]);
        assert_ne!(a, b);
    }
}
