use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    UserProfiles,
    Templates,
    CallRecords,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::UserProfiles => "user_profiles",
            Collection::Templates => "call_templates",
            Collection::CallRecords => "call_records",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Equality filter on top-level fields plus an optional row limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Map<String, Value>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filter.insert(field.to_string(), value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, record: &Value) -> bool {
        self.filter
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

/// Managed record database holding profiles, templates and call history.
pub trait RecordStore: Send + Sync {
    /// Stores `record` and returns it as stored, with an `id` assigned when
    /// the caller did not provide one.
    fn create(
        &self,
        collection: Collection,
        record: Value,
    ) -> impl Future<Output = Result<Value>> + Send;

    /// Matching records in insertion order.
    fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;
}

pub async fn create_typed<S, T>(store: &S, collection: Collection, record: &T) -> Result<T>
where
    S: RecordStore,
    T: Serialize + DeserializeOwned,
{
    let value = serde_json::to_value(record)
        .with_context(|| format!("failed to encode {collection} record"))?;
    let stored = store.create(collection, value).await?;
    serde_json::from_value(stored).with_context(|| format!("failed to decode {collection} record"))
}

pub async fn list_typed<S, T>(
    store: &S,
    collection: Collection,
    query: &ListQuery,
) -> Result<Vec<T>>
where
    S: RecordStore,
    T: DeserializeOwned,
{
    store
        .list(collection, query)
        .await?
        .into_iter()
        .map(|value| {
            serde_json::from_value(value)
                .with_context(|| format!("failed to decode {collection} record"))
        })
        .collect()
}

/// In-process store for tests and the console.
#[derive(Default)]
pub struct MemoryRecordStore {
    collections: Mutex<HashMap<Collection, Vec<Value>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, collection: Collection) -> usize {
        self.collections
            .lock()
            .await
            .get(&collection)
            .map_or(0, Vec::len)
    }
}

impl RecordStore for MemoryRecordStore {
    async fn create(&self, collection: Collection, record: Value) -> Result<Value> {
        let Value::Object(mut fields) = record else {
            bail!("{collection} records must be JSON objects");
        };
        let needs_id = fields
            .get("id")
            .map_or(true, |id| id.is_null() || id.as_str().is_some_and(str::is_empty));
        if needs_id {
            fields.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }

        let stored = Value::Object(fields);
        let mut collections = self.collections.lock().await;
        let rows = collections.entry(collection).or_default();
        if let Some(id) = stored.get("id") {
            if rows.iter().any(|row| row.get("id") == Some(id)) {
                return Err(anyhow!("{collection} already contains a record with id {id}"));
            }
        }
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, collection: Collection, query: &ListQuery) -> Result<Vec<Value>> {
        let collections = self.collections.lock().await;
        let rows = collections.get(&collection).map(Vec::as_slice).unwrap_or(&[]);
        let matching = rows.iter().filter(|row| query.matches(row)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}
