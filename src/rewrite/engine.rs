use std::collections::{HashMap, HashSet};

use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Word};

use crate::core::{Result, ShardingError, Value};
use crate::parser::{ColumnRole, Operand, StatementContext};
use crate::route::{ConditionOperand, SqlUnit, TableMapping};
use crate::rule::{EncryptColumn, EncryptRule, Encryptor};

/// What the rewrite engine changes in the logical SQL.
#[derive(Debug, Clone, Copy)]
pub enum RewriteRule<'r> {
    /// Tables and columns unchanged; placeholders still renumbered.
    Identity,
    /// Logical tables replaced by the mapped physical tables. With
    /// `insert_rows`, only those INSERT value rows are kept.
    Sharding {
        mappings: &'r [TableMapping],
        insert_rows: Option<&'r [usize]>,
    },
    /// Encrypted columns mapped to their cipher or plain columns.
    Encrypt {
        rule: &'r EncryptRule,
        query_with_cipher_column: bool,
    },
}

/// Pure SQL rewriter working on the analyzed token stream.
///
/// Whitespace, comments and identifier quoting survive. The output parameter
/// list is built in placeholder output order.
#[derive(Debug, Clone, Copy)]
pub struct RewriteEngine<'r> {
    rule: RewriteRule<'r>,
}

impl<'r> RewriteEngine<'r> {
    pub fn new(rule: RewriteRule<'r>) -> Self {
        Self { rule }
    }

    pub fn generate_sql(&self, context: &StatementContext, parameters: &[Value]) -> Result<SqlUnit> {
        let expected = context.parameter_count();
        if parameters.len() < expected {
            return Err(ShardingError::Rewrite(format!(
                "statement expects {} parameter(s) but {} were bound",
                expected,
                parameters.len()
            )));
        }

        let mut edits = Edits::default();
        match self.rule {
            RewriteRule::Identity => {}
            RewriteRule::Sharding {
                mappings,
                insert_rows,
            } => sharding_edits(context, mappings, insert_rows, &mut edits)?,
            RewriteRule::Encrypt {
                rule,
                query_with_cipher_column,
            } => encrypt_edits(context, rule, query_with_cipher_column, &mut edits)?,
        }
        edits.render(context, parameters)
    }
}

enum Fragment<'e> {
    Text(String),
    Parameter {
        index: usize,
        encryptor: Option<&'e dyn Encryptor>,
    },
}

#[derive(Default)]
struct Edits<'e> {
    replaced: HashMap<usize, Vec<Fragment<'e>>>,
    appended: HashMap<usize, Vec<Fragment<'e>>>,
    skipped: HashSet<usize>,
}

impl<'e> Edits<'e> {
    fn replace(&mut self, token_index: usize, fragments: Vec<Fragment<'e>>) {
        self.replaced.insert(token_index, fragments);
    }

    fn append(&mut self, token_index: usize, fragments: Vec<Fragment<'e>>) {
        self.appended.entry(token_index).or_default().extend(fragments);
    }

    fn skip(&mut self, tokens: impl IntoIterator<Item = usize>) {
        self.skipped.extend(tokens);
    }

    /// Renames the identifier at `token_index`, keeping its quote style.
    fn rename(&mut self, context: &StatementContext, token_index: usize, name: &str) {
        let text = match &context.tokens()[token_index] {
            Token::Word(word) => Token::Word(Word {
                value: name.to_string(),
                quote_style: word.quote_style,
                keyword: Keyword::NoKeyword,
            })
            .to_string(),
            _ => name.to_string(),
        };
        self.replace(token_index, vec![Fragment::Text(text)]);
    }

    /// Replaces an operand with its encrypted form.
    fn encrypt_operand(&mut self, operand: &Operand, encryptor: &'e dyn Encryptor) -> Result<()> {
        let fragment = match &operand.value {
            ConditionOperand::Parameter(index) => Fragment::Parameter {
                index: *index,
                encryptor: Some(encryptor),
            },
            ConditionOperand::Literal(value) => {
                Fragment::Text(encryptor.encrypt(value)?.to_sql_literal())
            }
        };
        self.replace(operand.start, vec![fragment]);
        self.skip(operand.start + 1..=operand.end);
        Ok(())
    }

    fn render(&self, context: &StatementContext, parameters: &[Value]) -> Result<SqlUnit> {
        let placeholders: HashMap<usize, usize> = context
            .placeholders()
            .iter()
            .map(|p| (p.token_index, p.parameter_index))
            .collect();
        let mut out = Emitter {
            sql: String::with_capacity(context.sql().len()),
            values: Vec::with_capacity(parameters.len()),
            numbered: context.uses_numbered_placeholders(),
            parameters,
        };

        for (i, token) in context.tokens().iter().enumerate() {
            if self.skipped.contains(&i) {
                continue;
            }
            match self.replaced.get(&i) {
                Some(fragments) => out.emit_all(fragments)?,
                None => match placeholders.get(&i) {
                    Some(&index) => out.emit_parameter(index, None)?,
                    None => out.sql.push_str(&token.to_string()),
                },
            }
            if let Some(fragments) = self.appended.get(&i) {
                out.emit_all(fragments)?;
            }
        }

        Ok(SqlUnit::new(out.sql, out.values))
    }
}

struct Emitter<'p> {
    sql: String,
    values: Vec<Value>,
    numbered: bool,
    parameters: &'p [Value],
}

impl Emitter<'_> {
    fn emit_all(&mut self, fragments: &[Fragment<'_>]) -> Result<()> {
        for fragment in fragments {
            match fragment {
                Fragment::Text(text) => self.sql.push_str(text),
                Fragment::Parameter { index, encryptor } => {
                    self.emit_parameter(*index, *encryptor)?
                }
            }
        }
        Ok(())
    }

    fn emit_parameter(&mut self, index: usize, encryptor: Option<&dyn Encryptor>) -> Result<()> {
        let value = self.parameters.get(index).ok_or_else(|| {
            ShardingError::Rewrite(format!("parameter {} is not bound", index + 1))
        })?;
        let value = match encryptor {
            Some(encryptor) => encryptor.encrypt(value)?,
            None => value.clone(),
        };
        self.values.push(value);
        if self.numbered {
            self.sql.push_str(&format!("${}", self.values.len()));
        } else {
            self.sql.push('?');
        }
        Ok(())
    }
}

fn mapped_table<'m>(mappings: &'m [TableMapping], logic_table: &str) -> Result<&'m str> {
    mappings
        .iter()
        .find(|m| m.logic_table.eq_ignore_ascii_case(logic_table))
        .map(|m| m.actual_table.as_str())
        .ok_or_else(|| {
            ShardingError::Rewrite(format!(
                "no actual table mapped for logic table {}",
                logic_table
            ))
        })
}

fn sharding_edits(
    context: &StatementContext,
    mappings: &[TableMapping],
    insert_rows: Option<&[usize]>,
    edits: &mut Edits<'_>,
) -> Result<()> {
    for table in context.tables() {
        let actual = mapped_table(mappings, &table.name)?;
        edits.rename(context, table.token_index, actual);
    }
    for qualifier in context.qualifiers() {
        let actual = mapped_table(mappings, &qualifier.name)?;
        edits.rename(context, qualifier.token_index, actual);
    }

    let (Some(keep), Some(insert)) = (insert_rows, context.insert()) else {
        return Ok(());
    };
    let mut kept_any = false;
    for (i, row) in insert.rows.iter().enumerate() {
        let kept = keep.contains(&i);
        if !kept {
            edits.skip(row.start..=row.end);
        }
        // the separator before row i survives only between two kept rows
        if i > 0 && !(kept && kept_any) {
            edits.skip(insert.rows[i - 1].end + 1..row.start);
        }
        kept_any |= kept;
    }
    Ok(())
}

fn encrypt_edits<'e>(
    context: &StatementContext,
    rule: &'e EncryptRule,
    query_with_cipher_column: bool,
    edits: &mut Edits<'e>,
) -> Result<()> {
    let read_column = |column: &'e EncryptColumn| -> &'e str {
        match (&column.plain_column, query_with_cipher_column) {
            (Some(plain), false) => plain.as_str(),
            _ => column.cipher_column.as_str(),
        }
    };

    for column_ref in context.columns() {
        let Some(table) = owning_table(context, rule, &column_ref.name, column_ref.owner.as_deref())
        else {
            continue;
        };
        let Some(column) = rule.find_column(table, &column_ref.name) else {
            continue;
        };
        let encryptor = column.encryptor.as_ref();

        match &column_ref.role {
            ColumnRole::Projection { aliased } => {
                edits.rename(context, column_ref.token_index, read_column(column));
                if !aliased {
                    edits.append(
                        column_ref.token_index,
                        vec![Fragment::Text(format!(" AS {}", column_ref.name))],
                    );
                }
            }
            ColumnRole::Predicate { operator, operands } => {
                let target = read_column(column);
                edits.rename(context, column_ref.token_index, target);
                if target == column.cipher_column {
                    if !operator.is_equality() {
                        return Err(ShardingError::Rewrite(format!(
                            "encrypted column {}.{} only supports equality predicates, got {:?}",
                            table, column_ref.name, operator
                        )));
                    }
                    for operand in operands.iter().flatten() {
                        edits.encrypt_operand(operand, encryptor)?;
                    }
                }
            }
            ColumnRole::Assignment { operand } => {
                let operand = operand.as_ref().ok_or_else(|| {
                    ShardingError::Rewrite(format!(
                        "cannot encrypt a computed value assigned to {}.{}",
                        table, column_ref.name
                    ))
                })?;
                edits.rename(context, column_ref.token_index, &column.cipher_column);
                edits.encrypt_operand(operand, encryptor)?;
                if let Some(plain) = &column.plain_column {
                    let mut fragments = vec![Fragment::Text(format!(", {} = ", plain))];
                    fragments.push(plain_fragment(operand));
                    edits.append(operand.end, fragments);
                }
            }
            ColumnRole::InsertColumn { position } => {
                edits.rename(context, column_ref.token_index, &column.cipher_column);
                if let Some(plain) = &column.plain_column {
                    edits.append(
                        column_ref.token_index,
                        vec![Fragment::Text(format!(", {}", plain))],
                    );
                }
                let rows = context.insert().map(|insert| insert.rows.as_slice()).unwrap_or_default();
                for row in rows {
                    let operand = row.values.get(*position).and_then(Option::as_ref).ok_or_else(|| {
                        ShardingError::Rewrite(format!(
                            "cannot encrypt a computed value inserted into {}.{}",
                            table, column_ref.name
                        ))
                    })?;
                    edits.encrypt_operand(operand, encryptor)?;
                    if column.plain_column.is_some() {
                        edits.append(
                            operand.end,
                            vec![Fragment::Text(", ".to_string()), plain_fragment(operand)],
                        );
                    }
                }
            }
            ColumnRole::Other => {
                edits.rename(context, column_ref.token_index, read_column(column));
            }
        }
    }
    Ok(())
}

/// Logical table of a column reference: its qualifier, the only table, or the
/// first referenced table with an encrypted column of that name.
fn owning_table<'c>(
    context: &'c StatementContext,
    rule: &EncryptRule,
    column: &str,
    owner: Option<&str>,
) -> Option<&'c str> {
    if let Some(owner) = owner {
        return context.resolve_table(owner);
    }
    context
        .table_names()
        .into_iter()
        .find(|table| rule.find_column(table, column).is_some())
}

fn plain_fragment<'e>(operand: &Operand) -> Fragment<'e> {
    match &operand.value {
        ConditionOperand::Parameter(index) => Fragment::Parameter {
            index: *index,
            encryptor: None,
        },
        ConditionOperand::Literal(value) => Fragment::Text(value.to_sql_literal()),
    }
}
