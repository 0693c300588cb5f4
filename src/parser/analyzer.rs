use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Word};

use crate::core::{Result, ShardingError, Value};
use crate::parser::context::*;
use crate::route::{
    ConditionOperand, ConditionOperator, ConditionValue, ShardingCondition, ShardingConditions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    MySql,
    PostgreSql,
    Generic,
}

impl SqlDialect {
    fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            Self::MySql => Box::new(MySqlDialect {}),
            Self::PostgreSql => Box::new(PostgreSqlDialect {}),
            Self::Generic => Box::new(GenericDialect {}),
        }
    }
}

/// Words never taken for a table, alias or column name.
const RESERVED: &[Keyword] = &[
    Keyword::SELECT,
    Keyword::FROM,
    Keyword::WHERE,
    Keyword::AND,
    Keyword::OR,
    Keyword::NOT,
    Keyword::IN,
    Keyword::IS,
    Keyword::NULL,
    Keyword::AS,
    Keyword::ON,
    Keyword::USING,
    Keyword::JOIN,
    Keyword::INNER,
    Keyword::LEFT,
    Keyword::RIGHT,
    Keyword::FULL,
    Keyword::OUTER,
    Keyword::CROSS,
    Keyword::NATURAL,
    Keyword::GROUP,
    Keyword::ORDER,
    Keyword::BY,
    Keyword::HAVING,
    Keyword::LIMIT,
    Keyword::OFFSET,
    Keyword::UNION,
    Keyword::EXCEPT,
    Keyword::INTERSECT,
    Keyword::ALL,
    Keyword::DISTINCT,
    Keyword::INSERT,
    Keyword::INTO,
    Keyword::VALUES,
    Keyword::VALUE,
    Keyword::UPDATE,
    Keyword::SET,
    Keyword::DELETE,
    Keyword::TABLE,
    Keyword::FOR,
    Keyword::LOCK,
    Keyword::SHARE,
    Keyword::BETWEEN,
    Keyword::LIKE,
    Keyword::ILIKE,
    Keyword::CASE,
    Keyword::WHEN,
    Keyword::THEN,
    Keyword::ELSE,
    Keyword::END,
    Keyword::EXISTS,
    Keyword::TRUE,
    Keyword::FALSE,
    Keyword::DEFAULT,
    Keyword::RETURNING,
    Keyword::WINDOW,
    Keyword::DUPLICATE,
    Keyword::ASC,
    Keyword::DESC,
    Keyword::WITH,
    Keyword::IF,
    Keyword::FORCE,
    Keyword::USE,
    Keyword::IGNORE,
];

/// Keywords that close a FROM list at the list's own depth.
const FROM_LIST_END: &[Keyword] = &[
    Keyword::WHERE,
    Keyword::GROUP,
    Keyword::ORDER,
    Keyword::HAVING,
    Keyword::LIMIT,
    Keyword::OFFSET,
    Keyword::UNION,
    Keyword::EXCEPT,
    Keyword::INTERSECT,
    Keyword::FOR,
    Keyword::LOCK,
    Keyword::WINDOW,
    Keyword::SET,
    Keyword::VALUES,
    Keyword::RETURNING,
];

/// Keywords that close a top-level WHERE clause.
const WHERE_END: &[Keyword] = &[
    Keyword::GROUP,
    Keyword::ORDER,
    Keyword::HAVING,
    Keyword::LIMIT,
    Keyword::OFFSET,
    Keyword::UNION,
    Keyword::EXCEPT,
    Keyword::INTERSECT,
    Keyword::FOR,
    Keyword::LOCK,
    Keyword::WINDOW,
    Keyword::RETURNING,
];

/// Builds a [`StatementContext`] from SQL text.
///
/// The statement is validated and classified with `sqlparser`; table
/// references, placeholders, insert rows, column references and
/// shard-determining predicates are then located on the lossless token
/// stream so the rewrite engine can substitute tokens in place.
#[derive(Debug, Clone, Default)]
pub struct StatementAnalyzer {
    dialect: SqlDialect,
}

impl StatementAnalyzer {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn analyze(&self, sql: &str) -> Result<StatementContext> {
        let dialect = self.dialect.dialect();

        let statements = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| ShardingError::Parse(e.to_string()))?;
        let kind = match statements.as_slice() {
            [statement] => classify(statement),
            other => {
                return Err(ShardingError::Parse(format!(
                    "expected exactly one statement, found {}",
                    other.len()
                )));
            }
        };

        let tokens = Tokenizer::new(dialect.as_ref(), sql)
            .with_unescape(false)
            .tokenize()
            .map_err(|e| ShardingError::Parse(e.to_string()))?
            .into_iter()
            .filter(|token| !matches!(token, Token::EOF))
            .collect();

        Ok(TokenScan::new(tokens, kind).into_context(sql))
    }
}

fn classify(statement: &sql_ast::Statement) -> StatementKind {
    match statement {
        sql_ast::Statement::Query(_) => StatementKind::Select,
        sql_ast::Statement::Insert(_) => StatementKind::Insert,
        sql_ast::Statement::Update { .. } => StatementKind::Update,
        sql_ast::Statement::Delete(_) => StatementKind::Delete,
        _ => StatementKind::Other,
    }
}

/// Positions below are indexes into `sig`, the non-whitespace tokens.
struct TokenScan {
    kind: StatementKind,
    tokens: Vec<Token>,
    sig: Vec<usize>,
    depth: Vec<usize>,
}

impl TokenScan {
    fn new(tokens: Vec<Token>, kind: StatementKind) -> Self {
        let sig: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| !matches!(token, Token::Whitespace(_)))
            .map(|(i, _)| i)
            .collect();

        let mut depth = Vec::with_capacity(sig.len());
        let mut current = 0usize;
        for &i in &sig {
            depth.push(current);
            match tokens[i] {
                Token::LParen => current += 1,
                Token::RParen => current = current.saturating_sub(1),
                _ => {}
            }
        }

        Self {
            kind,
            tokens,
            sig,
            depth,
        }
    }

    fn len(&self) -> usize {
        self.sig.len()
    }

    fn tok(&self, p: usize) -> Option<&Token> {
        self.sig.get(p).map(|&i| &self.tokens[i])
    }

    fn is_token(&self, p: usize, expected: &Token) -> bool {
        self.tok(p) == Some(expected)
    }

    fn keyword(&self, p: usize) -> Option<Keyword> {
        match self.tok(p) {
            Some(Token::Word(w)) if w.quote_style.is_none() => Some(w.keyword),
            _ => None,
        }
    }

    fn is_keyword(&self, p: usize, keyword: Keyword) -> bool {
        self.keyword(p) == Some(keyword)
    }

    fn ident(&self, p: usize) -> Option<&Word> {
        match self.tok(p) {
            Some(Token::Word(w)) if w.quote_style.is_some() || !RESERVED.contains(&w.keyword) => {
                Some(w)
            }
            _ => None,
        }
    }

    fn word_value(&self, p: usize) -> String {
        self.ident(p).map(|w| w.value.clone()).unwrap_or_default()
    }

    fn first_keyword_at_depth(&self, from: usize, keyword: Keyword, depth: usize) -> Option<usize> {
        (from..self.len()).find(|&p| self.depth[p] == depth && self.is_keyword(p, keyword))
    }

    fn matching_close(&self, open: usize) -> Option<usize> {
        let inner = self.depth[open] + 1;
        (open + 1..self.len()).find(|&p| self.is_token(p, &Token::RParen) && self.depth[p] == inner)
    }

    /// Splits `start..end` on commas at `depth` into half-open ranges.
    fn split_commas(&self, start: usize, end: usize, depth: usize) -> Vec<(usize, usize)> {
        let mut items = Vec::new();
        let mut item_start = start;
        for p in start..end {
            if self.depth[p] == depth && self.is_token(p, &Token::Comma) {
                items.push((item_start, p));
                item_start = p + 1;
            }
        }
        if item_start < end {
            items.push((item_start, end));
        }
        items
    }

    fn into_context(self, sql: &str) -> StatementContext {
        let mut consumed = HashSet::new();
        let tables = self.collect_tables(&mut consumed);
        let qualifiers = self.collect_qualifiers(&tables, &consumed);
        let placeholders = self.collect_placeholders();
        let param_at: HashMap<usize, usize> = placeholders
            .iter()
            .map(|p| (p.token_index, p.parameter_index))
            .collect();

        let projection = self.collect_projection(&mut consumed);
        let (insert, insert_columns) = self.collect_insert(&tables, &param_at);
        let assignments = self.collect_assignments(&param_at);
        let columns = self.collect_columns(
            &consumed,
            &projection,
            &insert_columns,
            &assignments,
            &param_at,
        );
        let locking = self.kind.is_query() && self.detect_locking();

        let mut context = StatementContext {
            sql: sql.to_string(),
            kind: self.kind,
            tokens: Vec::new(),
            tables,
            qualifiers,
            placeholders,
            columns: Vec::new(),
            insert,
            locking,
            conditions: ShardingConditions::empty(),
        };
        context.conditions = self.collect_conditions(&context, &columns);
        context.columns = columns.into_iter().map(|(_, column)| column).collect();
        context.tokens = self.tokens;
        context
    }

    fn collect_tables(&self, consumed: &mut HashSet<usize>) -> Vec<TableRef> {
        let mut tables = Vec::new();
        let mut from_lists: Vec<usize> = Vec::new();
        let mut expect_table = false;
        let mut p = 0;

        while p < self.len() {
            let depth = self.depth[p];
            while from_lists.last().is_some_and(|&d| depth < d) {
                from_lists.pop();
            }

            if expect_table {
                if matches!(
                    self.keyword(p),
                    Some(Keyword::IF | Keyword::NOT | Keyword::EXISTS | Keyword::ONLY)
                ) {
                    p += 1;
                    continue;
                }
                expect_table = false;

                if self.ident(p).is_some() {
                    let mut name_p = p;
                    // schema-qualified: the last part names the table
                    while self.is_token(name_p + 1, &Token::Period) && self.ident(name_p + 2).is_some() {
                        consumed.insert(name_p);
                        name_p += 2;
                    }
                    consumed.insert(name_p);

                    let mut next = name_p + 1;
                    let mut alias = None;
                    if self.is_keyword(next, Keyword::AS) {
                        if self.ident(next + 1).is_some() {
                            alias = Some(self.word_value(next + 1));
                            consumed.insert(next + 1);
                            next += 2;
                        }
                    } else if self.ident(next).is_some()
                        && !self.is_token(next + 1, &Token::LParen)
                        && !self.is_token(next + 1, &Token::Period)
                    {
                        alias = Some(self.word_value(next));
                        consumed.insert(next);
                        next += 1;
                    }

                    tables.push(TableRef {
                        name: self.word_value(name_p),
                        alias,
                        token_index: self.sig[name_p],
                    });
                    p = next;
                    continue;
                }
            }

            match self.keyword(p) {
                Some(Keyword::FROM) => {
                    from_lists.push(depth);
                    expect_table = true;
                }
                Some(Keyword::JOIN | Keyword::INTO | Keyword::TABLE) => expect_table = true,
                Some(Keyword::UPDATE) if p == 0 => expect_table = true,
                Some(keyword)
                    if FROM_LIST_END.contains(&keyword) && from_lists.last() == Some(&depth) =>
                {
                    from_lists.pop();
                }
                _ => {
                    if self.is_token(p, &Token::Comma) && from_lists.last() == Some(&depth) {
                        expect_table = true;
                    }
                }
            }
            p += 1;
        }

        tables
    }

    fn collect_qualifiers(&self, tables: &[TableRef], consumed: &HashSet<usize>) -> Vec<Qualifier> {
        (0..self.len())
            .filter(|p| !consumed.contains(p) && self.is_token(p + 1, &Token::Period))
            .filter_map(|p| {
                let word = self.ident(p)?;
                let is_alias = tables.iter().any(|t| {
                    t.alias
                        .as_deref()
                        .is_some_and(|a| a.eq_ignore_ascii_case(&word.value))
                });
                let is_table = tables.iter().any(|t| t.name.eq_ignore_ascii_case(&word.value));
                (is_table && !is_alias).then(|| Qualifier {
                    name: word.value.clone(),
                    token_index: self.sig[p],
                })
            })
            .collect()
    }

    fn collect_placeholders(&self) -> Vec<Placeholder> {
        let mut next_sequential = 0;
        let mut placeholders = Vec::new();
        for &i in &self.sig {
            if let Token::Placeholder(text) = &self.tokens[i] {
                let numbered = text
                    .strip_prefix('$')
                    .and_then(|digits| digits.parse::<usize>().ok())
                    .filter(|n| *n >= 1);
                let parameter_index = match numbered {
                    Some(n) => n - 1,
                    None => {
                        next_sequential += 1;
                        next_sequential - 1
                    }
                };
                placeholders.push(Placeholder {
                    token_index: i,
                    parameter_index,
                });
            }
        }
        placeholders
    }

    fn operand_at(&self, p: usize, param_at: &HashMap<usize, usize>) -> Option<(Operand, usize)> {
        let single = |value: ConditionOperand| {
            Some((
                Operand {
                    start: self.sig[p],
                    end: self.sig[p],
                    value,
                },
                p + 1,
            ))
        };

        match self.tok(p)? {
            Token::Placeholder(_) => {
                let index = *param_at.get(&self.sig[p])?;
                single(ConditionOperand::Parameter(index))
            }
            Token::Number(text, _) => {
                single(ConditionOperand::Literal(Value::from_number_literal(text)))
            }
            Token::SingleQuotedString(raw) | Token::DoubleQuotedString(raw) => {
                single(ConditionOperand::Literal(Value::from_quoted_literal(raw)))
            }
            Token::Minus => match self.tok(p + 1)? {
                Token::Number(text, _) => Some((
                    Operand {
                        start: self.sig[p],
                        end: self.sig[p + 1],
                        value: ConditionOperand::Literal(Value::from_number_literal(&format!(
                            "-{}",
                            text
                        ))),
                    },
                    p + 2,
                )),
                _ => None,
            },
            Token::Word(w) if w.quote_style.is_none() => match w.keyword {
                Keyword::TRUE => single(ConditionOperand::Literal(Value::Boolean(true))),
                Keyword::FALSE => single(ConditionOperand::Literal(Value::Boolean(false))),
                Keyword::NULL => single(ConditionOperand::Literal(Value::Null)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Operand filling exactly `start..end`, if any.
    fn operand_spanning(
        &self,
        start: usize,
        end: usize,
        param_at: &HashMap<usize, usize>,
    ) -> Option<Operand> {
        self.operand_at(start, param_at)
            .filter(|(_, next)| *next == end)
            .map(|(operand, _)| operand)
    }

    fn collect_projection(&self, consumed: &mut HashSet<usize>) -> HashMap<usize, bool> {
        let mut projection = HashMap::new();
        if self.kind != StatementKind::Select {
            return projection;
        }
        let Some(select_p) = self.first_keyword_at_depth(0, Keyword::SELECT, 0) else {
            return projection;
        };
        let end = self
            .first_keyword_at_depth(select_p + 1, Keyword::FROM, 0)
            .unwrap_or(self.len());

        let mut start = select_p + 1;
        if matches!(self.keyword(start), Some(Keyword::DISTINCT | Keyword::ALL)) {
            start += 1;
        }

        for (a, b) in self.split_commas(start, end, 0) {
            let column_end = if self.ident(a).is_some()
                && self.is_token(a + 1, &Token::Period)
                && self.ident(a + 2).is_some()
            {
                Some(a + 3)
            } else if self.ident(a).is_some() {
                Some(a + 1)
            } else {
                None
            };

            let aliased = column_end.and_then(|ce| match b - ce {
                0 => Some(false),
                1 if self.ident(ce).is_some() => {
                    consumed.insert(ce);
                    Some(true)
                }
                2 if self.is_keyword(ce, Keyword::AS) && self.ident(ce + 1).is_some() => {
                    consumed.insert(ce + 1);
                    Some(true)
                }
                _ => None,
            });

            match (column_end, aliased) {
                (Some(ce), Some(aliased)) => {
                    projection.insert(ce - 1, aliased);
                }
                _ => {
                    if b >= a + 2 && self.is_keyword(b - 2, Keyword::AS) && self.ident(b - 1).is_some() {
                        consumed.insert(b - 1);
                    }
                }
            }
        }
        projection
    }

    fn collect_insert(
        &self,
        tables: &[TableRef],
        param_at: &HashMap<usize, usize>,
    ) -> (Option<InsertValues>, HashMap<usize, usize>) {
        let mut positions = HashMap::new();
        if self.kind != StatementKind::Insert {
            return (None, positions);
        }
        let Some(table) = tables.first() else {
            return (None, positions);
        };
        let Some(mut p) = self.sig.iter().position(|&i| i == table.token_index) else {
            return (None, positions);
        };
        p += 1;
        if table.alias.is_some() {
            p += if self.is_keyword(p, Keyword::AS) { 2 } else { 1 };
        }

        let mut columns = Vec::new();
        if self.is_token(p, &Token::LParen) {
            let Some(close) = self.matching_close(p) else {
                return (None, positions);
            };
            for (_, b) in self.split_commas(p + 1, close, self.depth[p] + 1) {
                let name_p = b - 1;
                if self.ident(name_p).is_some() {
                    positions.insert(name_p, columns.len());
                }
                columns.push(self.word_value(name_p));
            }
            p = close + 1;
        }

        let mut rows = Vec::new();
        if matches!(self.keyword(p), Some(Keyword::VALUES | Keyword::VALUE)) {
            p += 1;
            while self.is_token(p, &Token::LParen) {
                let Some(close) = self.matching_close(p) else {
                    break;
                };
                let values = self
                    .split_commas(p + 1, close, self.depth[p] + 1)
                    .into_iter()
                    .map(|(a, b)| self.operand_spanning(a, b, param_at))
                    .collect();
                rows.push(InsertRow {
                    start: self.sig[p],
                    end: self.sig[close],
                    values,
                });
                p = close + 1;
                if self.is_token(p, &Token::Comma) && self.is_token(p + 1, &Token::LParen) {
                    p += 1;
                } else {
                    break;
                }
            }
        }

        let insert = InsertValues {
            table: table.name.clone(),
            columns,
            rows,
        };
        (Some(insert), positions)
    }

    /// Columns assigned in `SET` lists, mapped to their value operand.
    fn collect_assignments(&self, param_at: &HashMap<usize, usize>) -> HashMap<usize, Option<Operand>> {
        let mut ranges = Vec::new();
        match self.kind {
            StatementKind::Update => {
                if let Some(set_p) = self.first_keyword_at_depth(0, Keyword::SET, 0) {
                    let end = (set_p + 1..self.len())
                        .find(|&p| {
                            self.depth[p] == 0
                                && matches!(
                                    self.keyword(p),
                                    Some(Keyword::WHERE | Keyword::ORDER | Keyword::LIMIT | Keyword::RETURNING)
                                )
                        })
                        .unwrap_or(self.len());
                    ranges.push((set_p + 1, end));
                }
            }
            StatementKind::Insert => {
                for p in 0..self.len() {
                    if self.depth[p] != 0 {
                        continue;
                    }
                    let on_duplicate = self.is_keyword(p, Keyword::ON)
                        && self.is_keyword(p + 1, Keyword::DUPLICATE)
                        && self.is_keyword(p + 2, Keyword::KEY)
                        && self.is_keyword(p + 3, Keyword::UPDATE);
                    if on_duplicate {
                        ranges.push((p + 4, self.len()));
                    } else if self.is_keyword(p, Keyword::DO)
                        && self.is_keyword(p + 1, Keyword::UPDATE)
                        && self.is_keyword(p + 2, Keyword::SET)
                    {
                        ranges.push((p + 3, self.len()));
                    } else if self.is_keyword(p, Keyword::SET) && p > 0 && self.ident(p - 1).is_some() {
                        // INSERT INTO t SET a = 1
                        ranges.push((p + 1, self.len()));
                    }
                }
            }
            _ => {}
        }

        let mut assignments = HashMap::new();
        for (start, end) in ranges {
            let depth = self.depth.get(start).copied().unwrap_or(0);
            for (a, b) in self.split_commas(start, end, depth) {
                let Some(eq) = (a..b).find(|&p| self.is_token(p, &Token::Eq)) else {
                    continue;
                };
                if eq == 0 || self.ident(eq - 1).is_none() {
                    continue;
                }
                let operand = self.operand_spanning(eq + 1, b, param_at);
                assignments.insert(eq - 1, operand);
            }
        }
        assignments
    }

    fn collect_columns(
        &self,
        consumed: &HashSet<usize>,
        projection: &HashMap<usize, bool>,
        insert_columns: &HashMap<usize, usize>,
        assignments: &HashMap<usize, Option<Operand>>,
        param_at: &HashMap<usize, usize>,
    ) -> Vec<(usize, ColumnRef)> {
        let mut columns = Vec::new();
        for p in 0..self.len() {
            if consumed.contains(&p) {
                continue;
            }
            let Some(word) = self.ident(p) else {
                continue;
            };
            if self.is_token(p + 1, &Token::Period) || self.is_token(p + 1, &Token::LParen) {
                continue;
            }
            if p >= 1 && self.is_token(p - 1, &Token::DoubleColon) {
                continue;
            }

            let owner = (p >= 2 && self.is_token(p - 1, &Token::Period))
                .then(|| self.ident(p - 2).map(|w| w.value.clone()))
                .flatten();

            let role = if let Some(aliased) = projection.get(&p) {
                ColumnRole::Projection { aliased: *aliased }
            } else if let Some(position) = insert_columns.get(&p) {
                ColumnRole::InsertColumn { position: *position }
            } else if let Some(operand) = assignments.get(&p) {
                ColumnRole::Assignment {
                    operand: operand.clone(),
                }
            } else if let Some((operator, operands)) = self.match_predicate(p, param_at) {
                ColumnRole::Predicate { operator, operands }
            } else {
                ColumnRole::Other
            };

            columns.push((
                p,
                ColumnRef {
                    name: word.value.clone(),
                    owner,
                    token_index: self.sig[p],
                    role,
                },
            ));
        }
        columns
    }

    fn match_predicate(
        &self,
        p: usize,
        param_at: &HashMap<usize, usize>,
    ) -> Option<(PredicateOperator, Vec<Option<Operand>>)> {
        let q = p + 1;
        let negated = p >= 1 && self.is_keyword(p - 1, Keyword::NOT);
        let single = |at: usize| vec![self.operand_at(at, param_at).map(|(operand, _)| operand)];

        match self.tok(q)? {
            Token::Eq => {
                let operator = if negated {
                    PredicateOperator::NotEqual
                } else {
                    PredicateOperator::Equal
                };
                Some((operator, single(q + 1)))
            }
            Token::Neq => Some((PredicateOperator::NotEqual, single(q + 1))),
            Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => {
                Some((PredicateOperator::Compare, single(q + 1)))
            }
            Token::Word(_) => {
                let (not, r) = if self.is_keyword(q, Keyword::NOT) {
                    (true, q + 1)
                } else {
                    (false, q)
                };
                if self.is_keyword(r, Keyword::IN) {
                    let operator = if not || negated {
                        PredicateOperator::NotIn
                    } else {
                        PredicateOperator::In
                    };
                    Some((operator, self.in_list_operands(r + 1, param_at)))
                } else if self.is_keyword(r, Keyword::BETWEEN) {
                    let operator = if not || negated {
                        PredicateOperator::NotBetween
                    } else {
                        PredicateOperator::Between
                    };
                    let (lower, next) = match self.operand_at(r + 1, param_at) {
                        Some((operand, next)) => (Some(operand), next),
                        None => (None, r + 2),
                    };
                    let upper = if self.is_keyword(next, Keyword::AND) {
                        self.operand_at(next + 1, param_at).map(|(operand, _)| operand)
                    } else {
                        None
                    };
                    Some((operator, vec![lower, upper]))
                } else if matches!(self.keyword(r), Some(Keyword::LIKE | Keyword::ILIKE)) {
                    Some((PredicateOperator::Like, single(r + 1)))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn in_list_operands(&self, open: usize, param_at: &HashMap<usize, usize>) -> Vec<Option<Operand>> {
        if !self.is_token(open, &Token::LParen) || self.is_keyword(open + 1, Keyword::SELECT) {
            return Vec::new();
        }
        let Some(close) = self.matching_close(open) else {
            return Vec::new();
        };
        self.split_commas(open + 1, close, self.depth[open] + 1)
            .into_iter()
            .map(|(a, b)| self.operand_spanning(a, b, param_at))
            .collect()
    }

    fn detect_locking(&self) -> bool {
        (0..self.len()).any(|p| {
            self.depth[p] == 0
                && ((self.is_keyword(p, Keyword::FOR)
                    && matches!(self.keyword(p + 1), Some(Keyword::UPDATE | Keyword::SHARE)))
                    || (self.is_keyword(p, Keyword::LOCK) && self.is_keyword(p + 1, Keyword::IN)))
        })
    }

    fn collect_conditions(
        &self,
        context: &StatementContext,
        columns: &[(usize, ColumnRef)],
    ) -> ShardingConditions {
        match self.kind {
            StatementKind::Insert => insert_conditions(context),
            StatementKind::Select | StatementKind::Update | StatementKind::Delete => {
                self.where_conditions(context, columns)
            }
            StatementKind::Other => ShardingConditions::empty(),
        }
    }

    /// OR-separated branches of the top-level WHERE clause. Predicates nested in
    /// parentheses do not narrow the route.
    fn where_conditions(
        &self,
        context: &StatementContext,
        columns: &[(usize, ColumnRef)],
    ) -> ShardingConditions {
        let Some(where_p) = self.first_keyword_at_depth(0, Keyword::WHERE, 0) else {
            return ShardingConditions::empty();
        };
        let end = (where_p + 1..self.len())
            .find(|&p| {
                self.depth[p] == 0 && self.keyword(p).is_some_and(|kw| WHERE_END.contains(&kw))
            })
            .unwrap_or(self.len());
        let or_positions: Vec<usize> = (where_p + 1..end)
            .filter(|&p| self.depth[p] == 0 && self.is_keyword(p, Keyword::OR))
            .collect();

        let single_table = match context.table_names().as_slice() {
            [only] => Some(only.to_string()),
            _ => None,
        };

        let mut branches: Vec<Vec<ConditionValue>> = vec![Vec::new(); or_positions.len() + 1];
        for (p, column) in columns {
            if *p <= where_p || *p >= end || self.depth[*p] != 0 {
                continue;
            }
            let ColumnRole::Predicate { operator, operands } = &column.role else {
                continue;
            };
            let operator = match operator {
                PredicateOperator::Equal => ConditionOperator::Equal,
                PredicateOperator::In => ConditionOperator::In,
                PredicateOperator::Between => ConditionOperator::Between,
                _ => continue,
            };
            let Some(operands) = operands
                .iter()
                .map(|operand| operand.as_ref().map(|o| o.value.clone()))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            if operands.is_empty() {
                continue;
            }
            let table = match &column.owner {
                Some(owner) => match context.resolve_table(owner) {
                    Some(table) => Some(table.to_string()),
                    None => continue,
                },
                None => single_table.clone(),
            };

            let branch = or_positions.iter().filter(|&&o| o < *p).count();
            branches[branch].push(ConditionValue {
                table,
                column: column.name.clone(),
                operator,
                operands,
            });
        }

        if branches.iter().all(Vec::is_empty) {
            return ShardingConditions::empty();
        }
        ShardingConditions::new(branches.into_iter().map(ShardingCondition::new).collect())
    }
}

fn insert_conditions(context: &StatementContext) -> ShardingConditions {
    let Some(insert) = context.insert() else {
        return ShardingConditions::empty();
    };
    if insert.columns.is_empty() {
        return ShardingConditions::empty();
    }
    let conditions = insert
        .rows
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            let values = insert
                .columns
                .iter()
                .zip(&row.values)
                .filter_map(|(column, operand)| {
                    operand.as_ref().map(|operand| ConditionValue {
                        table: Some(insert.table.clone()),
                        column: column.clone(),
                        operator: ConditionOperator::Equal,
                        operands: vec![operand.value.clone()],
                    })
                })
                .collect();
            ShardingCondition::for_insert_row(row_index, values)
        })
        .collect();
    ShardingConditions::new(conditions)
}
