pub mod analyzer;
pub mod context;

pub use analyzer::{SqlDialect, StatementAnalyzer};
pub use context::{
    ColumnRef, ColumnRole, InsertRow, InsertValues, Operand, Placeholder, PredicateOperator,
    Qualifier, StatementContext, StatementKind, TableRef,
};
