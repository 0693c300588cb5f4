use indexmap::IndexSet;

use crate::core::{Result, ShardingError};
use crate::merge::{QueryResult, QueryRow};

/// Merges per-unit results keeping the first occurrence of each logical row.
///
/// Rows are compared on the configured 1-based distinct columns, or on every
/// column when none are configured. Unit order and row order are preserved.
#[derive(Debug, Clone, Default)]
pub struct DistinctMerger {
    distinct_column_indexes: Vec<usize>,
}

impl DistinctMerger {
    pub fn new(distinct_column_indexes: Vec<usize>) -> Self {
        Self {
            distinct_column_indexes,
        }
    }

    pub fn merge(&self, results: Vec<QueryResult>) -> Result<QueryResult> {
        let columns = results
            .iter()
            .find(|result| !result.columns.is_empty())
            .map(|result| result.columns.clone())
            .unwrap_or_default();
        if let Some(&index) = self
            .distinct_column_indexes
            .iter()
            .find(|&&index| index == 0 || index > columns.len())
        {
            return Err(ShardingError::IndexOutOfRange {
                index,
                len: columns.len(),
            });
        }

        let mut rows: IndexSet<QueryRow> = IndexSet::new();
        for result in results {
            for row in result.rows {
                let row = QueryRow::new(row, self.distinct_column_indexes.clone());
                for &index in &self.distinct_column_indexes {
                    row.column_value(index)?;
                }
                rows.insert(row);
            }
        }

        Ok(QueryResult::new(
            columns,
            rows.into_iter().map(QueryRow::into_row_data).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn result(rows: &[(i64, &str)]) -> QueryResult {
        QueryResult::new(
            vec!["user_id".into(), "status".into()],
            rows.iter()
                .map(|(id, status)| vec![Value::Integer(*id), Value::from(*status)])
                .collect(),
        )
    }

    #[test]
    fn test_merges_whole_rows() {
        let merged = DistinctMerger::default()
            .merge(vec![result(&[(1, "a"), (2, "b")]), result(&[(1, "a"), (3, "c")])])
            .unwrap();
        let ids: Vec<&Value> = merged.rows.iter().map(|r| &r[0]).collect();
        assert_eq!(ids, vec![&Value::Integer(1), &Value::Integer(2), &Value::Integer(3)]);
    }

    #[test]
    fn test_merges_on_distinct_columns() {
        let merged = DistinctMerger::new(vec![1])
            .merge(vec![result(&[(1, "a")]), result(&[(1, "z"), (2, "b")])])
            .unwrap();
        assert_eq!(merged.row_count(), 2);
        assert_eq!(merged.rows[0][1], Value::from("a"));
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let err = DistinctMerger::new(vec![3])
            .merge(vec![result(&[(1, "a")])])
            .unwrap_err();
        assert_eq!(err, ShardingError::IndexOutOfRange { index: 3, len: 2 });
    }
}
