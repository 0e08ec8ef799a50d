//! Sort and filter criteria
//!
//! Criteria apply to index rows, whose fields are dictionary ids or plain
//! numbers. Text filter values on dictionary fields are translated to ids
//! by the executor before matching.
//!
//! # Filter syntax
//!
//! ```text
//! criticality>=4
//! path=/pets/{id}
//! method!=get
//! ```

use crate::ingest::report::ARRIVAL_SPACES;
use crate::query::error::{QueryError, QueryResult};
use crate::storage::{SortOrder, Space};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Record kinds exposed by the query layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Test,
    HappyPath,
    Operation,
}

impl RecordKind {
    pub fn payload_space(self) -> Space {
        match self {
            RecordKind::Test => Space::Tests,
            RecordKind::HappyPath => Space::HappyPaths,
            RecordKind::Operation => Space::Operations,
        }
    }

    pub fn index_space(self) -> Space {
        match self {
            RecordKind::Test => Space::TestsIndex,
            RecordKind::HappyPath => Space::HappyPathsIndex,
            RecordKind::Operation => Space::OperationsIndex,
        }
    }

    /// Index fields usable for sorting and filtering
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            RecordKind::Test => &["operationId", "path", "method", "testKey", "criticality"],
            RecordKind::HappyPath | RecordKind::Operation => &["operationId", "path", "method"],
        }
    }

    fn has_field(self, field: &str) -> bool {
        self.fields().contains(&field)
    }
}

/// Dictionary space behind an index field, if any
pub fn dictionary_for(field: &str) -> Option<Space> {
    match field {
        "operationId" => Some(Space::OperationIds),
        "path" => Some(Space::Paths),
        "method" => Some(Space::Methods),
        "testKey" => Some(Space::TestKeys),
        _ => None,
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal to
    Gte,
    /// Less than
    Lt,
    /// Less than or equal to
    Lte,
}

impl Operator {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" | "==" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            _ => None,
        }
    }

    /// Ordering comparison rather than (in)equality
    pub fn is_range(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }

    /// Compare a row field against a filter value
    ///
    /// Numbers compare numerically and strings lexicographically. Any other
    /// pairing only satisfies `Ne`.
    pub fn compare(self, field: &Value, target: &Value) -> bool {
        let ordering = match (field, target) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        };

        match ordering {
            Some(ordering) => self.accepts(ordering),
            None => self == Self::Ne,
        }
    }
}

/// Value to compare against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl FilterValue {
    /// Numbers where possible, text otherwise
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => FilterValue::Number(n),
            _ => FilterValue::Text(raw.trim().to_string()),
        }
    }

    /// The value as a dictionary label
    ///
    /// Whole numbers print without a fraction, so `Number(200.0)` is `"200"`.
    pub fn as_label(&self) -> String {
        match self {
            FilterValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Text(s) => s.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FilterValue::Text(s) => Value::String(s.clone()),
        }
    }
}

/// A filter condition on one index field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field to filter on
    pub field: String,
    /// Comparison operator
    pub op: Operator,
    /// Value to compare against
    pub value: FilterValue,
}

impl Filter {
    /// Create a new filter
    pub fn new(field: impl Into<String>, op: Operator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Equality filter on a label or number
    pub fn eq(field: impl Into<String>, value: FilterValue) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    /// Parse `field<op>value`
    pub fn parse(expr: &str) -> QueryResult<Self> {
        let start = expr
            .find(|c| matches!(c, '=' | '!' | '<' | '>'))
            .ok_or_else(|| QueryError::InvalidFilter(format!("no operator in '{}'", expr)))?;

        let field = expr[..start].trim();
        if field.is_empty() {
            return Err(QueryError::InvalidFilter(format!("no field in '{}'", expr)));
        }

        let rest = &expr[start..];
        let (op, len) = [2, 1]
            .iter()
            .filter_map(|&len| rest.get(..len).and_then(Operator::parse).map(|op| (op, len)))
            .next()
            .ok_or_else(|| QueryError::InvalidFilter(format!("bad operator in '{}'", expr)))?;

        // Label fields keep the raw text even when it looks numeric
        let raw = &rest[len..];
        let value = match dictionary_for(field) {
            Some(_) => FilterValue::Text(raw.trim().to_string()),
            None => FilterValue::parse(raw),
        };
        Ok(Self::new(field, op, value))
    }

    pub(crate) fn validate(&self, kind: RecordKind) -> QueryResult<()> {
        if !kind.has_field(&self.field) {
            return Err(QueryError::InvalidFilter(format!(
                "unknown field '{}' (expected one of {})",
                self.field,
                kind.fields().join(", ")
            )));
        }

        // First-seen ids carry no order
        let unordered = dictionary_for(&self.field).map_or(false, |s| ARRIVAL_SPACES.contains(&s));
        if unordered && self.op.is_range() {
            return Err(QueryError::InvalidFilter(format!(
                "'{}' only supports = and !=",
                self.field
            )));
        }
        Ok(())
    }
}

/// Sort field and direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Desc)
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Asc)
    }

    pub(crate) fn validate(&self, kind: RecordKind) -> QueryResult<()> {
        if kind.has_field(&self.field) {
            Ok(())
        } else {
            Err(QueryError::InvalidSort(format!(
                "unknown field '{}' (expected one of {})",
                self.field,
                kind.fields().join(", ")
            )))
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of pages at this page size
    pub pages: u64,
    /// Matching records across all pages
    pub total: u64,
    /// Zero-based page number of `items`
    pub current: u64,
}

impl<T> Page<T> {
    /// Page count for `total` records, `ceil(total / size)`
    pub fn page_count(total: u64, size: u64) -> u64 {
        if size == 0 {
            0
        } else {
            total.div_ceil(size)
        }
    }

    /// `[start, end)` slice bounds of page `page`, clamped to `total`
    pub fn bounds(page: u64, size: u64, total: u64) -> (usize, usize) {
        let start = page.saturating_mul(size).min(total);
        let end = start.saturating_add(size).min(total);
        (start as usize, end as usize)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pages: self.pages,
            total: self.total,
            current: self.current,
        }
    }
}
