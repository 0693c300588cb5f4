use sqlparser::tokenizer::Token;

use crate::route::{ConditionOperand, ShardingConditions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL and anything else; routed like a write.
    Other,
}

impl StatementKind {
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Select)
    }

    pub fn is_write(&self) -> bool {
        !self.is_query()
    }
}

/// A logical table referenced in table position (FROM, JOIN, INTO, UPDATE, TABLE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    pub token_index: usize,
}

/// A table name used as a column qualifier, as in `t_order.user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qualifier {
    pub name: String,
    pub token_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub token_index: usize,
    pub parameter_index: usize,
}

/// A value operand spanning `start..=end` tokens (a signed number spans two).
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub start: usize,
    pub end: usize,
    pub value: ConditionOperand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOperator {
    Equal,
    NotEqual,
    Compare,
    In,
    NotIn,
    Between,
    NotBetween,
    /// `LIKE` and `ILIKE`, with or without `NOT`.
    Like,
}

impl PredicateOperator {
    /// Operators whose operands are compared for equality with the column.
    pub fn is_equality(&self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual | Self::In | Self::NotIn)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRole {
    /// A bare projection item, `aliased` when it already carries an alias.
    Projection { aliased: bool },
    Predicate {
        operator: PredicateOperator,
        operands: Vec<Option<Operand>>,
    },
    /// `SET column = value` and `ON DUPLICATE KEY UPDATE column = value`.
    Assignment { operand: Option<Operand> },
    /// Column at `position` of the INSERT column list.
    InsertColumn { position: usize },
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub name: String,
    /// Qualifier as written: a table name or an alias.
    pub owner: Option<String>,
    pub token_index: usize,
    pub role: ColumnRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    /// Token index of the row's opening parenthesis.
    pub start: usize,
    /// Token index of the row's closing parenthesis.
    pub end: usize,
    /// One entry per value; `None` for anything other than a plain literal or placeholder.
    pub values: Vec<Option<Operand>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertValues {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<InsertRow>,
}

/// Immutable view of one analyzed statement.
///
/// Token indexes refer to [`StatementContext::tokens`], which reproduce the
/// original SQL text exactly when displayed in order.
#[derive(Debug, Clone)]
pub struct StatementContext {
    pub(crate) sql: String,
    pub(crate) kind: StatementKind,
    pub(crate) tokens: Vec<Token>,
    pub(crate) tables: Vec<TableRef>,
    pub(crate) qualifiers: Vec<Qualifier>,
    pub(crate) placeholders: Vec<Placeholder>,
    pub(crate) columns: Vec<ColumnRef>,
    pub(crate) insert: Option<InsertValues>,
    pub(crate) locking: bool,
    pub(crate) conditions: ShardingConditions,
}

impl StatementContext {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn tables(&self) -> &[TableRef] {
        &self.tables
    }

    /// Distinct logical table names in order of first reference.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for table in &self.tables {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&table.name)) {
                names.push(&table.name);
            }
        }
        names
    }

    /// Maps an alias or table name used as a qualifier to its logical table.
    pub fn resolve_table(&self, qualifier: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|t| {
                t.alias
                    .as_deref()
                    .is_some_and(|a| a.eq_ignore_ascii_case(qualifier))
            })
            .or_else(|| {
                self.tables
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(qualifier))
            })
            .map(|t| t.name.as_str())
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Number of parameters the statement needs bound.
    pub fn parameter_count(&self) -> usize {
        self.placeholders
            .iter()
            .map(|p| p.parameter_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// True when placeholders are written `$n` rather than `?`.
    pub fn uses_numbered_placeholders(&self) -> bool {
        self.placeholders.iter().any(|p| {
            matches!(&self.tokens[p.token_index], Token::Placeholder(text) if text.starts_with('$'))
        })
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn insert(&self) -> Option<&InsertValues> {
        self.insert.as_ref()
    }

    /// `SELECT ... FOR UPDATE`, `FOR SHARE` or `LOCK IN SHARE MODE`.
    pub fn is_locking(&self) -> bool {
        self.locking
    }

    pub fn conditions(&self) -> &ShardingConditions {
        &self.conditions
    }
}
