//! Store-native query strings.
//!
//! Queries are parsed with `sqlparser` and then narrowed to the subset the
//! store evaluates:
//!
//! ```text
//! SELECT * FROM c [WHERE c.<field> <op> <literal> [AND ...]]
//! ```
//!
//! `<op>` is `=`, `!=` or `<>`. A literal is a single-quoted string, a
//! number, `true`, `false` or `null`. Keywords are case-insensitive and a
//! field the document does not have compares as `null`. Any other valid SQL
//! (ORDER BY, OR, projections, joins, ...) is rejected with
//! [`StoreError::BadRequest`] naming the clause.

use serde_json::Value as JsonValue;
use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, SelectItem, SetExpr, Statement, TableFactor,
    UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::StoreError;

/// Query run when the caller does not supply one.
pub const SELECT_ALL: &str = "SELECT * FROM c";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
}

/// One `<alias>.<field> <op> <literal>` term of a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub comparison: Comparison,
    pub value: JsonValue,
}

impl Predicate {
    fn matches(&self, document: &JsonValue) -> bool {
        let actual = document.get(&self.field).unwrap_or(&JsonValue::Null);
        let equal = values_equal(actual, &self.value);
        match self.comparison {
            Comparison::Equal => equal,
            Comparison::NotEqual => !equal,
        }
    }
}

/// Numbers compare by value so that `1` matches `1.0`.
fn values_equal(left: &JsonValue, right: &JsonValue) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

/// A parsed query. Documents match when every predicate holds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub alias: String,
    pub predicates: Vec<Predicate>,
}

impl Query {
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        let mut statements = Parser::parse_sql(&GenericDialect {}, text)
            .map_err(|e| bad_query(&e.to_string()))?;
        if statements.len() != 1 {
            return Err(bad_query("expected exactly one statement"));
        }

        let Statement::Query(query) = statements.remove(0) else {
            return Err(bad_query("only SELECT statements are supported"));
        };
        let query = *query;
        if query.order_by.is_some() {
            return Err(bad_query(
                "ORDER BY is not supported, results come back in arrival order",
            ));
        }
        if query.with.is_some()
            || query.limit.is_some()
            || query.offset.is_some()
            || query.fetch.is_some()
        {
            return Err(bad_query("only a WHERE clause may follow FROM"));
        }

        let SetExpr::Select(select) = *query.body else {
            return Err(bad_query("only a plain SELECT is supported"));
        };

        let grouped = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => !exprs.is_empty(),
            _ => true,
        };
        if select.distinct.is_some() || select.top.is_some() || select.having.is_some() || grouped
        {
            return Err(bad_query("only a WHERE clause may follow FROM"));
        }
        if !matches!(select.projection.as_slice(), [SelectItem::Wildcard(_)]) {
            return Err(bad_query("only SELECT * is supported"));
        }

        let [from] = select.from.as_slice() else {
            return Err(bad_query("expected a single FROM collection"));
        };
        if !from.joins.is_empty() {
            return Err(bad_query("joins are not supported"));
        }
        let alias = match &from.relation {
            TableFactor::Table { name, alias, .. } => alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| name.to_string()),
            _ => return Err(bad_query("expected a collection name after FROM")),
        };

        let mut predicates = Vec::new();
        if let Some(selection) = &select.selection {
            collect_predicates(selection, &alias, &mut predicates)?;
        }

        Ok(Query { alias, predicates })
    }

    /// `SELECT * FROM c`.
    pub fn all() -> Self {
        Self {
            alias: "c".to_string(),
            predicates: Vec::new(),
        }
    }

    pub fn matches(&self, document: &JsonValue) -> bool {
        self.predicates.iter().all(|p| p.matches(document))
    }
}

fn bad_query(reason: &str) -> StoreError {
    StoreError::BadRequest(format!("Invalid query: {reason}"))
}

/// Flattens an `AND` tree of comparisons into predicates.
fn collect_predicates(
    expr: &Expr,
    alias: &str,
    out: &mut Vec<Predicate>,
) -> Result<(), StoreError> {
    match expr {
        Expr::Nested(inner) => collect_predicates(inner, alias, out),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_predicates(left, alias, out)?;
            collect_predicates(right, alias, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let comparison = match op {
                BinaryOperator::Eq => Comparison::Equal,
                BinaryOperator::NotEq => Comparison::NotEqual,
                other => return Err(bad_query(&format!("unsupported operator '{other}'"))),
            };

            let (field, literal) = if let Some(field) = field_of(left, alias)? {
                (field, right)
            } else if let Some(field) = field_of(right, alias)? {
                (field, left)
            } else {
                return Err(bad_query("expected <alias>.<field> compared with a literal"));
            };

            out.push(Predicate {
                field,
                comparison,
                value: literal_of(literal)?,
            });
            Ok(())
        }
        other => Err(bad_query(&format!("unsupported condition '{other}'"))),
    }
}

/// `Some(field)` for `<alias>.<field>`, `None` for anything that is not a
/// compound identifier.
fn field_of(expr: &Expr, alias: &str) -> Result<Option<String>, StoreError> {
    match expr {
        Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [owner, field] if owner.value == alias => Ok(Some(field.value.clone())),
            [owner, _] => Err(bad_query(&format!("unknown alias '{}'", owner.value))),
            _ => Err(bad_query("nested field paths are not supported")),
        },
        _ => Ok(None),
    }
}

fn literal_of(expr: &Expr) -> Result<JsonValue, StoreError> {
    match expr {
        Expr::Value(value) => match value {
            Value::Number(number, _) => number_of(number),
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => {
                Ok(JsonValue::String(s.clone()))
            }
            Value::Boolean(b) => Ok(JsonValue::Bool(*b)),
            Value::Null => Ok(JsonValue::Null),
            other => Err(bad_query(&format!("unsupported literal '{other}'"))),
        },
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match expr.as_ref() {
            Expr::Value(Value::Number(number, _)) => number_of(&format!("-{number}")),
            _ => Err(bad_query("expected literal")),
        },
        other => Err(bad_query(&format!("expected literal, found '{other}'"))),
    }
}

fn number_of(text: &str) -> Result<JsonValue, StoreError> {
    serde_json::from_str::<serde_json::Number>(text)
        .map(JsonValue::Number)
        .map_err(|_| bad_query(&format!("invalid number '{text}'")))
}
