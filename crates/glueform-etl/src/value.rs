//! Cell values and row predicates

use crate::schema::Type;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// One cell of a table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    /// Days since 1970-01-01
    Date(i32),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's own type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "bigint",
            Value::Double(_) => "double",
            Value::Date(_) => "date",
            Value::String(_) => "string",
        }
    }

    /// Convert to `target`, widening numerics the way Spark's implicit
    /// casts do. Returns `None` when no lossless conversion exists.
    pub(crate) fn coerce(self, target: Type) -> Option<Value> {
        match (self, target) {
            (Value::Null, _) => Some(Value::Null),
            (v @ Value::Boolean(_), Type::Boolean)
            | (v @ Value::Int(_), Type::Int)
            | (v @ Value::Long(_), Type::Long)
            | (v @ Value::Double(_), Type::Double)
            | (v @ Value::Date(_), Type::Date)
            | (v @ Value::String(_), Type::String) => Some(v),
            (Value::Int(i), Type::Long) => Some(Value::Long(i64::from(i))),
            (Value::Int(i), Type::Double) => Some(Value::Double(f64::from(i))),
            (Value::Long(l), Type::Int) => i32::try_from(l).ok().map(Value::Int),
            _ => None,
        }
    }

    /// SQL comparison; `None` when either side is null or the types differ.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Long(b)) => Some(i64::from(*a).cmp(b)),
            (Value::Long(a), Value::Int(b)) => Some(a.cmp(&i64::from(*b))),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&f64::from(*b)),
            (Value::Int(a), Value::Double(b)) => f64::from(*a).partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Date(d) => write!(f, "DATE({d})"),
            Value::String(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Row filter for `UPDATE ... WHERE` and `DELETE ... WHERE`.
///
/// Evaluation follows SQL three-valued logic: a row matches only when the
/// predicate is definitely true, so comparisons against NULL never match.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    NotEq(String, Value),
    Lt(String, Value),
    LtEq(String, Value),
    Gt(String, Value),
    GtEq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    IsNotNull(String),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq(column.to_string(), value.into())
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Gt(column.to_string(), value.into())
    }

    pub fn lt(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Lt(column.to_string(), value.into())
    }

    pub fn is_in<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(column: &str) -> Self {
        Predicate::IsNull(column.to_string())
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Every column the predicate reads.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Eq(c, _)
            | Predicate::NotEq(c, _)
            | Predicate::Lt(c, _)
            | Predicate::LtEq(c, _)
            | Predicate::Gt(c, _)
            | Predicate::GtEq(c, _)
            | Predicate::In(c, _)
            | Predicate::IsNull(c)
            | Predicate::IsNotNull(c) => out.push(c),
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
            Predicate::Not(p) => p.collect_columns(out),
        }
    }

    /// Three-valued evaluation; `lookup` returns a column's value in the row.
    pub(crate) fn evaluate<'v, F>(&self, lookup: &F) -> Option<bool>
    where
        F: Fn(&str) -> &'v Value,
    {
        let cmp = |c: &str, v: &Value| lookup(c).compare(v);
        match self {
            Predicate::Eq(c, v) => cmp(c, v).map(Ordering::is_eq),
            Predicate::NotEq(c, v) => cmp(c, v).map(Ordering::is_ne),
            Predicate::Lt(c, v) => cmp(c, v).map(Ordering::is_lt),
            Predicate::LtEq(c, v) => cmp(c, v).map(Ordering::is_le),
            Predicate::Gt(c, v) => cmp(c, v).map(Ordering::is_gt),
            Predicate::GtEq(c, v) => cmp(c, v).map(Ordering::is_ge),
            Predicate::In(c, values) => {
                let current = lookup(c);
                if current.is_null() {
                    return None;
                }
                let mut unknown = false;
                for v in values {
                    match current.compare(v) {
                        Some(Ordering::Equal) => return Some(true),
                        Some(_) => {}
                        None => unknown = true,
                    }
                }
                if unknown {
                    None
                } else {
                    Some(false)
                }
            }
            Predicate::IsNull(c) => Some(lookup(c).is_null()),
            Predicate::IsNotNull(c) => Some(!lookup(c).is_null()),
            Predicate::And(a, b) => match (a.evaluate(lookup), b.evaluate(lookup)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Predicate::Or(a, b) => match (a.evaluate(lookup), b.evaluate(lookup)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Predicate::Not(p) => p.evaluate(lookup).map(|b| !b),
        }
    }

    pub(crate) fn matches<'v, F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> &'v Value,
    {
        self.evaluate(lookup) == Some(true)
    }
}
