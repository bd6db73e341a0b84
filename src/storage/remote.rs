use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};

use super::StoreError;

/// Exact-match filter on a table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// Compares a JSON cell the way the data API compares query strings.
    pub fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Null) | None => self.value == "null",
            Some(other) => other.to_string() == self.value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    pub filters: Vec<Filter>,
    pub order_desc: Option<String>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order_desc = Some(column.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Blob storage plus table access on the hosted backend.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<(), StoreError>;

    /// Object names at the root of the bucket, at most `limit` of them.
    async fn list_objects(&self, bucket: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    async fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, StoreError>;

    async fn update(&self, table: &str, filters: &[Filter], patch: &Value)
        -> Result<(), StoreError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;
}

/// Talks to a Supabase project over its REST and storage endpoints.
pub struct SupabaseRemote {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseRemote {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
        filters
            .iter()
            .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
            .collect()
    }

    async fn check(operation: &str, response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Remote(format!(
            "{} returned {}: {}",
            operation, status, body
        )))
    }
}

#[async_trait]
impl RemoteApi for SupabaseRemote {
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path);
        let response = self
            .authorized(self.client.post(&url))
            .header("Content-Type", content_type)
            .header("Cache-Control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        Self::check("storage upload", response).await?;
        tracing::debug!(bucket, path, "uploaded object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, bucket, path
        )
    }

    async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<(), StoreError> {
        let url = format!("{}/storage/v1/object/{}", self.base_url, bucket);
        let response = self
            .authorized(self.client.delete(&url))
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        Self::check("storage remove", response).await?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, bucket);
        let response = self
            .authorized(self.client.post(&url))
            .json(&json!({ "prefix": "", "limit": limit }))
            .send()
            .await?;
        let entries = Self::check("storage list", response)
            .await?
            .json::<Vec<Value>>()
            .await?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, StoreError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(Self::filter_params(&query.filters));
        if let Some(column) = &query.order_desc {
            params.push(("order".to_string(), format!("{}.desc", column)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(&params)
            .send()
            .await?;
        let rows = Self::check("select", response).await?.json::<Vec<Value>>().await?;
        Ok(rows)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &Value,
    ) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.patch(self.table_url(table)))
            .query(&Self::filter_params(filters))
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await?;
        Self::check("update", response).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.delete(self.table_url(table)))
            .query(&Self::filter_params(filters))
            .send()
            .await?;
        Self::check("delete", response).await?;
        Ok(())
    }
}
