//! Table storage

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Access denied: {principal} may not {mode:?} table {table}")]
    AccessDenied {
        table: String,
        principal: String,
        mode: crate::access::AccessMode,
    },
}

/// An item: a schemaless JSON object containing the table's partition key
pub type Item = serde_json::Map<String, Value>;

/// Billing mode declared on a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingMode {
    /// Request-driven capacity, no provisioning
    PayPerRequest,
    Provisioned,
}

/// What happens to the table when the stack is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

/// Declarative table specification
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub table_name: String,
    pub partition_key: String,
    pub billing_mode: BillingMode,
    pub removal_policy: RemovalPolicy,
}

impl TableSpec {
    pub fn new(table_name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            partition_key: partition_key.into(),
            billing_mode: BillingMode::PayPerRequest,
            removal_policy: RemovalPolicy::Destroy,
        }
    }
}

/// Table description returned from creation and lookups
#[derive(Debug, Clone, Serialize)]
pub struct TableDescription {
    pub table_name: String,
    pub table_id: String,
    pub partition_key: String,
    pub billing_mode: BillingMode,
    pub removal_policy: RemovalPolicy,
    pub created_date: DateTime<Utc>,
    pub item_count: usize,
}

/// A table with its items
struct Table {
    description: TableDescription,
    items: DashMap<String, Item>,
}

impl Table {
    fn new(spec: TableSpec) -> Self {
        let description = TableDescription {
            table_name: spec.table_name,
            table_id: uuid::Uuid::new_v4().to_string().replace('-', "")[..10].to_string(),
            partition_key: spec.partition_key,
            billing_mode: spec.billing_mode,
            removal_policy: spec.removal_policy,
            created_date: Utc::now(),
            item_count: 0,
        };
        Self {
            description,
            items: DashMap::new(),
        }
    }

    /// Extract the partition key value from an item
    fn item_key(&self, item: &Item) -> Result<String, StoreError> {
        let attr = item.get(&self.description.partition_key).ok_or_else(|| {
            StoreError::Validation(format!(
                "Missing key attribute: {}",
                self.description.partition_key
            ))
        })?;

        match attr {
            Value::String(s) if !s.is_empty() => Ok(s.clone()),
            Value::String(_) => Err(StoreError::Validation(format!(
                "Empty key attribute: {}",
                self.description.partition_key
            ))),
            _ => Err(StoreError::Validation(format!(
                "Key attribute {} must be a string",
                self.description.partition_key
            ))),
        }
    }
}

/// In-memory table storage
///
/// Single-key operations are atomic; there are no multi-key transactions
/// and no ordering guarantee across keys.
#[derive(Default)]
pub struct TableStorage {
    tables: DashMap<String, Table>,
}

impl TableStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table. A name collision is an error and aborts assembly.
    pub fn create_table(&self, spec: TableSpec) -> Result<TableDescription, StoreError> {
        if self.tables.contains_key(&spec.table_name) {
            return Err(StoreError::TableExists(spec.table_name));
        }

        let name = spec.table_name.clone();
        let table = Table::new(spec);
        let description = table.description.clone();
        self.tables.insert(name, table);
        Ok(description)
    }

    pub fn describe_table(&self, table_name: &str) -> Result<TableDescription, StoreError> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))?;

        let mut description = table.description.clone();
        description.item_count = table.items.len();
        Ok(description)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.key().clone()).collect()
    }

    /// Delete a table and all its items
    pub fn delete_table(&self, table_name: &str) -> Result<(), StoreError> {
        self.tables
            .remove(table_name)
            .map(|_| ())
            .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))
    }

    /// Tear down every table marked `RemovalPolicy::Destroy`
    pub fn drop_all(&self) {
        self.tables
            .retain(|_, t| t.description.removal_policy == RemovalPolicy::Retain);
    }

    /// Insert or overwrite an item by its partition key, returning the stored item
    pub fn put_item(&self, table_name: &str, item: Item) -> Result<Item, StoreError> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))?;

        let key = table.item_key(&item)?;
        table.items.insert(key, item.clone());
        Ok(item)
    }

    /// Fetch an item by key
    pub fn get_item(&self, table_name: &str, key: &str) -> Result<Option<Item>, StoreError> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))?;

        Ok(table.items.get(key).map(|i| i.clone()))
    }

    /// Remove an item by key. Deleting a missing key is not an error.
    pub fn delete_item(&self, table_name: &str, key: &str) -> Result<(), StoreError> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))?;

        table.items.remove(key);
        Ok(())
    }

    /// Return all items in a table, in no particular order
    pub fn scan(&self, table_name: &str) -> Result<Vec<Item>, StoreError> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))?;

        Ok(table.items.iter().map(|i| i.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn storage_with_table(name: &str) -> TableStorage {
        let storage = TableStorage::new();
        storage.create_table(TableSpec::new(name, "pk")).unwrap();
        storage
    }

    fn item(attrs: Value) -> Item {
        attrs.as_object().unwrap().clone()
    }

    #[test]
    fn test_create_table() {
        let storage = TableStorage::new();
        let description = storage.create_table(TableSpec::new("posts", "pk")).unwrap();

        assert_eq!(description.table_name, "posts");
        assert_eq!(description.partition_key, "pk");
        assert_eq!(description.billing_mode, BillingMode::PayPerRequest);
        assert!(!description.table_id.is_empty());
    }

    #[test]
    fn test_create_table_collision_is_fatal() {
        let storage = storage_with_table("posts");
        let err = storage.create_table(TableSpec::new("posts", "pk")).unwrap_err();
        assert!(matches!(err, StoreError::TableExists(name) if name == "posts"));
    }

    #[test]
    fn test_put_get_round_trip() {
        let storage = storage_with_table("posts");
        let stored = storage
            .put_item("posts", item(json!({"pk": "a", "text": "hi"})))
            .unwrap();

        let fetched = storage.get_item("posts", "a").unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched["text"], json!("hi"));
    }

    #[test]
    fn test_put_overwrites_by_key() {
        let storage = storage_with_table("posts");
        storage
            .put_item("posts", item(json!({"pk": "a", "text": "one"})))
            .unwrap();
        storage
            .put_item("posts", item(json!({"pk": "a", "text": "two"})))
            .unwrap();

        let fetched = storage.get_item("posts", "a").unwrap().unwrap();
        assert_eq!(fetched["text"], json!("two"));
        assert_eq!(storage.scan("posts").unwrap().len(), 1);
    }

    #[test]
    fn test_put_rejects_missing_or_non_string_key() {
        let storage = storage_with_table("posts");

        let err = storage
            .put_item("posts", item(json!({"text": "no key"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = storage
            .put_item("posts", item(json!({"pk": 42})))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let storage = storage_with_table("posts");
        storage
            .put_item("posts", item(json!({"pk": "a"})))
            .unwrap();

        storage.delete_item("posts", "a").unwrap();
        assert!(storage.get_item("posts", "a").unwrap().is_none());

        // A second delete of the same key succeeds the same way.
        storage.delete_item("posts", "a").unwrap();
        storage.delete_item("posts", "never-existed").unwrap();
    }

    #[test]
    fn test_unknown_table_errors() {
        let storage = TableStorage::new();
        let err = storage.get_item("ghost", "a").unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(_)));
    }

    #[test]
    fn test_drop_all_honors_removal_policy() {
        let storage = TableStorage::new();
        storage.create_table(TableSpec::new("ephemeral", "pk")).unwrap();

        let mut retained = TableSpec::new("kept", "pk");
        retained.removal_policy = RemovalPolicy::Retain;
        storage.create_table(retained).unwrap();

        storage.drop_all();
        assert_eq!(storage.list_tables(), vec!["kept".to_string()]);
    }
}
