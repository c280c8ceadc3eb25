use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Untyped backend row. Decoded into typed payloads before entering a collection.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    Neq(String, String),
    Gt(String, String),
    Gte(String, String),
    Lt(String, String),
    Lte(String, String),
    In(String, Vec<String>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _)
            | Filter::Neq(column, _)
            | Filter::Gt(column, _)
            | Filter::Gte(column, _)
            | Filter::Lt(column, _)
            | Filter::Lte(column, _)
            | Filter::In(column, _) => column,
        }
    }

    /// PostgREST operator expression, e.g. `eq.42` or `in.(a,b)`.
    pub fn expression(&self) -> String {
        match self {
            Filter::Eq(_, value) => format!("eq.{value}"),
            Filter::Neq(_, value) => format!("neq.{value}"),
            Filter::Gt(_, value) => format!("gt.{value}"),
            Filter::Gte(_, value) => format!("gte.{value}"),
            Filter::Lt(_, value) => format!("lt.{value}"),
            Filter::Lte(_, value) => format!("lte.{value}"),
            Filter::In(_, values) => format!(
                "in.({})",
                values
                    .iter()
                    .map(|value| list_item(value))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(self.column()).and_then(value_as_text) else {
            return false;
        };
        match self {
            Filter::Eq(_, expected) => actual == *expected,
            Filter::Neq(_, expected) => actual != *expected,
            Filter::Gt(_, expected) => compare_text(&actual, expected) == Ordering::Greater,
            Filter::Gte(_, expected) => compare_text(&actual, expected) != Ordering::Less,
            Filter::Lt(_, expected) => compare_text(&actual, expected) == Ordering::Less,
            Filter::Lte(_, expected) => compare_text(&actual, expected) != Ordering::Greater,
            Filter::In(_, values) => values.iter().any(|value| *value == actual),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.column(), self.expression())
    }
}

/// Items holding list delimiters are double-quoted, with `"` and `\\` escaped.
fn list_item(value: &str) -> String {
    let reserved = |c: char| matches!(c, ',' | '(' | ')' | '"' | '\\') || c.is_whitespace();
    if !value.is_empty() && !value.contains(reserved) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Plain decimals compare numerically and RFC 3339 timestamps by instant.
/// Anything else compares lexically.
pub fn compare_text(left: &str, right: &str) -> Ordering {
    if is_plain_decimal(left) && is_plain_decimal(right) {
        if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
            return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
        }
    }
    match (
        DateTime::parse_from_rfc3339(left),
        DateTime::parse_from_rfc3339(right),
    ) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.cmp(right),
    }
}

/// `-12`, `3.5`. No exponent, sign-only or special values.
fn is_plain_decimal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub table: String,
    pub select: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub filter: Option<Filter>,
}

impl ChangeFilter {
    pub fn matches(&self, table: &str, row: &Row) -> bool {
        self.table == table && self.filter.as_ref().map_or(true, |filter| filter.matches(row))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// Row-level notification pushed by the backend's change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    pub new: Option<Row>,
    pub old: Option<Row>,
    pub commit_timestamp: Option<DateTime<Utc>>,
}

/// Handle to a live change-feed subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: String,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    cancel: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
        cancel: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            id: id.into(),
            events,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `None` once the feed has ended, either by unsubscribe or by connection loss.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.events.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[async_trait]
pub trait RemoteDataGateway: Send + Sync {
    async fn list(&self, query: &RowQuery) -> Result<Vec<Row>, AppError>;

    async fn create(&self, table: &str, row: Row) -> Result<Row, AppError>;

    async fn update(&self, table: &str, target: &Filter, patch: Row) -> Result<Row, AppError>;

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError>;

    async fn remove(&self, table: &str, target: &Filter) -> Result<(), AppError>;

    async fn subscribe_change_feed(&self, filter: ChangeFilter) -> Result<Subscription, AppError>;
}
