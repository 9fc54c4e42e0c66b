//! Store-level predicates. Rendered to bound SQL by `sql::builder`, evaluated directly by
//! the in-memory store with SQL three-valued logic.

use crate::filter::operator::Comparator;
use crate::schema::SqlType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A column, optionally qualified by a join alias. Unqualified columns belong to the
/// queried record type's own table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(column: impl Into<String>) -> Self {
        ColumnRef {
            table: None,
            column: column.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            table: Some(table.into()),
            column: column.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `column <op> value`, both sides cast to `cast` when set (text otherwise).
    Compare {
        column: ColumnRef,
        op: Comparator,
        value: Value,
        cast: Option<SqlType>,
    },
    /// Inclusive range.
    Between {
        column: ColumnRef,
        low: Value,
        high: Value,
        cast: Option<SqlType>,
    },
    /// Case-insensitive substring match.
    Contains { column: ColumnRef, needle: String },
    /// Case-insensitive substring match against any needle.
    ContainsAny { column: ColumnRef, needles: Vec<String> },
    /// Null or empty text.
    Blank(ColumnRef),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Equality on an own-table column, cast inferred from the value.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        let value = value.into();
        let cast = match &value {
            Value::Number(_) => Some(SqlType::Numeric),
            Value::Bool(_) => Some(SqlType::Boolean),
            _ => None,
        };
        Predicate::Compare {
            column: ColumnRef::new(column),
            op: Comparator::Eq,
            value,
            cast,
        }
    }

    pub fn negate(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    /// True only when the predicate evaluates to TRUE (unknown rows are filtered out).
    pub fn matches<L: RowLookup + ?Sized>(&self, row: &L) -> bool {
        self.evaluate(row) == Some(true)
    }

    /// Three-valued evaluation: `None` is SQL UNKNOWN.
    pub fn evaluate<L: RowLookup + ?Sized>(&self, row: &L) -> Option<bool> {
        match self {
            Predicate::Compare { column, op, value, cast } => {
                let ord = compare_values(row.lookup(column)?, value, *cast)?;
                Some(op.matches(ord))
            }
            Predicate::Between { column, low, high, cast } => {
                let v = row.lookup(column)?;
                all_of([
                    compare_values(v, low, *cast).map(|o| o != Ordering::Less),
                    compare_values(v, high, *cast).map(|o| o != Ordering::Greater),
                ])
            }
            Predicate::Contains { column, needle } => {
                let text = text_of(row.lookup(column)?)?.to_lowercase();
                Some(text.contains(&needle.to_lowercase()))
            }
            Predicate::ContainsAny { column, needles } => {
                let text = text_of(row.lookup(column)?)?.to_lowercase();
                Some(needles.iter().any(|n| text.contains(&n.to_lowercase())))
            }
            Predicate::Blank(column) => Some(match row.lookup(column) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            }),
            Predicate::Not(inner) => inner.evaluate(row).map(|b| !b),
            Predicate::And(items) => all_of(items.iter().map(|p| p.evaluate(row))),
            Predicate::Or(items) => {
                let mut unknown = false;
                for p in items {
                    match p.evaluate(row) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown {
                    None
                } else {
                    Some(false)
                }
            }
        }
    }
}

fn all_of(results: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for r in results {
        match r {
            Some(false) => return Some(false),
            None => unknown = true,
            Some(true) => {}
        }
    }
    if unknown {
        None
    } else {
        Some(true)
    }
}

/// Column access for in-memory evaluation.
pub trait RowLookup {
    fn lookup(&self, column: &ColumnRef) -> Option<&Value>;
}

/// A bare row: the table qualifier is ignored.
impl RowLookup for Map<String, Value> {
    fn lookup(&self, column: &ColumnRef) -> Option<&Value> {
        self.get(&column.column)
    }
}

/// Order two values the way the store would after casting both to `cast`.
/// `None` when either side is null or does not cast.
pub fn compare_values(a: &Value, b: &Value, cast: Option<SqlType>) -> Option<Ordering> {
    match cast {
        Some(SqlType::Date) => Some(as_day(a)?.cmp(&as_day(b)?)),
        Some(SqlType::Numeric | SqlType::BigInt | SqlType::Double) => as_f64(a)?.partial_cmp(&as_f64(b)?),
        Some(SqlType::Boolean) => Some(as_bool(a)?.cmp(&as_bool(b)?)),
        _ => match (a, b) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
            (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
            _ => Some(text_of(a)?.cmp(&text_of(b)?)),
        },
    }
}

pub(crate) fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        _ => None,
    }
}

fn as_day(v: &Value) -> Option<NaiveDate> {
    match v {
        Value::String(s) => parse_day(s),
        _ => None,
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

/// Day of a date or timestamp string. Offsets are normalized to UTC first.
pub(crate) fn parse_day(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn null_comparisons_are_unknown() {
        let r = row(json!({ "port": null }));
        let p = Predicate::eq("port", 80);
        assert_eq!(p.evaluate(&r), None);
        assert_eq!(p.clone().negate().evaluate(&r), None);
        assert!(!p.negate().matches(&r));
    }

    #[test]
    fn and_or_follow_three_valued_logic() {
        let r = row(json!({ "port": null, "name": "edge" }));
        let unknown = Predicate::eq("port", 80);
        let yes = Predicate::eq("name", "edge");
        let no = Predicate::eq("name", "core");
        assert_eq!(Predicate::And(vec![unknown.clone(), no.clone()]).evaluate(&r), Some(false));
        assert_eq!(Predicate::And(vec![unknown.clone(), yes.clone()]).evaluate(&r), None);
        assert_eq!(Predicate::Or(vec![unknown.clone(), yes]).evaluate(&r), Some(true));
        assert_eq!(Predicate::Or(vec![unknown, no]).evaluate(&r), None);
    }

    #[test]
    fn dates_compare_at_day_granularity() {
        let a = json!("2024-03-05T23:10:00Z");
        assert_eq!(compare_values(&a, &json!("2024-03-05"), Some(SqlType::Date)), Some(Ordering::Equal));
        assert_eq!(compare_values(&a, &json!("2024-03-06"), Some(SqlType::Date)), Some(Ordering::Less));
        assert_eq!(compare_values(&a, &json!("garbage"), Some(SqlType::Date)), None);
        // offsets shift the day to UTC
        let late = json!("2024-03-05T23:10:00-02:00");
        assert_eq!(compare_values(&late, &json!("2024-03-06"), Some(SqlType::Date)), Some(Ordering::Equal));
    }

    #[test]
    fn blank_matches_null_missing_and_empty() {
        let p = Predicate::Blank(ColumnRef::new("note"));
        assert!(p.matches(&row(json!({ "note": null }))));
        assert!(p.matches(&row(json!({}))));
        assert!(p.matches(&row(json!({ "note": "" }))));
        assert!(!p.matches(&row(json!({ "note": "x" }))));
    }
}
