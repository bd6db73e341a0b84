//! In-memory stand-ins for the local store and the remote backend.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::kv::KeyValueStore;
use super::remote::{Filter, RemoteApi, RowQuery};
use super::StoreError;

/// Key-value store with an optional byte quota over keys plus values.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Remote backend held in memory. `set_offline(true)` makes every call fail.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    base_url: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    tables: Mutex<HashMap<String, Vec<Value>>>,
    offline: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            base_url: "memory://remote".to_string(),
            ..Default::default()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn insert_row(&self, table: &str, row: Value) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.entry(table.to_string()).or_default().push(row);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn object_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Remote("remote backend is offline".to_string()));
        }
        Ok(())
    }
}

fn object_key(bucket: &str, path: &str) -> String {
    format!("{}/{}", bucket, path)
}

fn matches_all(filters: &[Filter], row: &Value) -> bool {
    filters.iter().all(|f| f.matches(row))
}

fn sort_key(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl RemoteApi for MemoryRemote {
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut objects = self.objects.lock().map_err(|_| StoreError::LockPoisoned)?;
        let key = object_key(bucket, path);
        if objects.contains_key(&key) {
            return Err(StoreError::Remote(format!("object {} already exists", key)));
        }
        objects.insert(key, bytes);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/public/{}/{}", self.base_url, bucket, path)
    }

    async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut objects = self.objects.lock().map_err(|_| StoreError::LockPoisoned)?;
        for path in paths {
            objects.remove(&object_key(bucket, path));
        }
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        self.ensure_online()?;
        let prefix = object_key(bucket, "");
        let objects = self.objects.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut names: Vec<String> = objects
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        names.sort();
        names.truncate(limit);
        Ok(names)
    }

    async fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(&query.filters, row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(column) = &query.order_desc {
            rows.sort_by(|a, b| sort_key(b, column).cmp(&sort_key(a, column)));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &Value,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        let empty = Map::new();
        let patch = patch.as_object().unwrap_or(&empty);
        let mut tables = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches_all(filters, row)) {
                if let Some(fields) = row.as_object_mut() {
                    for (k, v) in patch {
                        fields.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !matches_all(filters, row));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quota_counts_replaced_value_once() {
        let store = MemoryKvStore::with_quota(10);
        store.set("k", "12345".to_string()).unwrap();
        store.set("k", "123456789".to_string()).unwrap();
        let err = store.set("k", "1234567890".to_string()).unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { needed: 11, quota: 10, .. }));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("123456789"));
    }

    #[tokio::test]
    async fn test_select_filters_and_orders() {
        let remote = MemoryRemote::new();
        remote.insert_row("t", json!({"user_id": "a", "upload_date": "2024-01-01T00:00:00Z"}));
        remote.insert_row("t", json!({"user_id": "a", "upload_date": "2024-03-01T00:00:00Z"}));
        remote.insert_row("t", json!({"user_id": "b", "upload_date": "2024-02-01T00:00:00Z"}));

        let rows = remote
            .select(
                "t",
                &RowQuery::new()
                    .filter(Filter::eq("user_id", "a"))
                    .order_desc("upload_date"),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["upload_date"], "2024-03-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_list_objects_is_per_bucket() {
        let remote = MemoryRemote::new();
        for (bucket, path) in [("user-photos", "b.jpg"), ("user-photos", "a.jpg"), ("cuisine-photos", "c.jpg")] {
            remote.upload_object(bucket, path, vec![0], "image/jpeg").await.unwrap();
        }
        assert_eq!(remote.list_objects("user-photos", 10).await.unwrap(), vec!["a.jpg", "b.jpg"]);
        assert_eq!(remote.list_objects("user-photos", 1).await.unwrap(), vec!["a.jpg"]);
        assert!(remote.list_objects("empty", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_rejects_calls() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        assert!(remote.select("t", &RowQuery::new()).await.is_err());
        assert!(remote.list_objects("b", 1).await.is_err());
        remote.set_offline(false);
        assert!(remote.select("t", &RowQuery::new()).await.unwrap().is_empty());
    }
}
