use super::client::BackendClient;
use super::realtime::RealtimeClient;
use crate::application::ports::{ChangeFilter, Filter, RemoteDataGateway, Row, RowQuery, Subscription};
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

const REST_PREFIX: &str = "rest/v1";

/// PostgREST rows plus the realtime change feed.
pub struct RestGateway {
    client: BackendClient,
    realtime: RealtimeClient,
}

impl RestGateway {
    pub fn new(client: BackendClient, realtime: RealtimeClient) -> Self {
        Self { client, realtime }
    }

    fn table_path(table: &str) -> String {
        format!("{REST_PREFIX}/{table}")
    }
}

/// `select`, one pair per filter, `order` and `limit`, in that order.
pub fn query_pairs(query: &RowQuery) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(select) = &query.select {
        pairs.push(("select".to_string(), select.clone()));
    }
    for filter in &query.filters {
        pairs.push((filter.column().to_string(), filter.expression()));
    }
    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect::<Vec<_>>()
            .join(",");
        pairs.push(("order".to_string(), order));
    }
    if let Some(limit) = query.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

fn filter_pair(filter: &Filter) -> [(String, String); 1] {
    [(filter.column().to_string(), filter.expression())]
}

/// PostgREST answers writes with an array of affected rows.
fn rows_from(value: Value) -> Result<Vec<Row>, AppError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(AppError::Deserialization(format!(
                    "expected a row object, got {other}"
                ))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        Value::Null => Ok(Vec::new()),
        other => Err(AppError::Deserialization(format!(
            "expected rows, got {other}"
        ))),
    }
}

fn single_row(value: Value, table: &str) -> Result<Row, AppError> {
    rows_from(value)?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("no row returned from {table}")))
}

#[async_trait]
impl RemoteDataGateway for RestGateway {
    async fn list(&self, query: &RowQuery) -> Result<Vec<Row>, AppError> {
        let request = self
            .client
            .request(Method::GET, &Self::table_path(&query.table))
            .await
            .query(&query_pairs(query));
        let rows = rows_from(self.client.send_json(request).await?)?;
        tracing::trace!(table = %query.table, count = rows.len(), "listed rows");
        Ok(rows)
    }

    async fn create(&self, table: &str, row: Row) -> Result<Row, AppError> {
        let request = self
            .client
            .request(Method::POST, &Self::table_path(table))
            .await
            .header("Prefer", "return=representation")
            .json(&row);
        single_row(self.client.send_json(request).await?, table)
    }

    async fn update(&self, table: &str, target: &Filter, patch: Row) -> Result<Row, AppError> {
        let request = self
            .client
            .request(Method::PATCH, &Self::table_path(table))
            .await
            .query(&filter_pair(target))
            .header("Prefer", "return=representation")
            .json(&patch);
        single_row(self.client.send_json(request).await?, table)
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError> {
        let request = self
            .client
            .request(Method::POST, &Self::table_path(table))
            .await
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .json(&row);
        single_row(self.client.send_json(request).await?, table)
    }

    async fn remove(&self, table: &str, target: &Filter) -> Result<(), AppError> {
        let request = self
            .client
            .request(Method::DELETE, &Self::table_path(table))
            .await
            .query(&filter_pair(target));
        self.client.send(request).await?;
        Ok(())
    }

    async fn subscribe_change_feed(&self, filter: ChangeFilter) -> Result<Subscription, AppError> {
        let token = self.client.bearer().await;
        self.realtime.subscribe(filter, &token).await
    }
}
