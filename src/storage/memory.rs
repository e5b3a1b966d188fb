use super::Catalog;
use crate::core::{MockError, Record, Result, Schema, Value, generate_id, now_timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Build a stored record from validated input: fresh `Id` first, then the
/// supplied fields, then the system timestamps. Any `Id` in `fields` is ignored.
pub fn new_record(schema: &Schema, fields: &Record) -> Record {
    let now = now_timestamp();
    let mut record = Record::new();
    record.set("Id", Value::Text(generate_id(&schema.id_prefix)));
    for (name, value) in fields.iter().filter(|(name, _)| *name != "Id") {
        record.set(name, value.clone());
    }
    record.set("CreatedDate", Value::Text(now.clone()));
    record.set("LastModifiedDate", Value::Text(now.clone()));
    record.set("SystemModstamp", Value::Text(now));
    record
}

/// Merge `fields` into `record` and refresh its modification stamps.
pub fn apply_update(record: &mut Record, fields: &Record) {
    for (name, value) in fields.iter().filter(|(name, _)| *name != "Id") {
        record.set(name, value.clone());
    }
    let now = now_timestamp();
    record.set("LastModifiedDate", Value::Text(now.clone()));
    record.set("SystemModstamp", Value::Text(now));
}

/// One object's records, in insertion order.
#[derive(Debug, Default, Clone)]
pub struct Collection {
    records: Vec<Record>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn position_by_id(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id() == Some(id))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id() == Some(id))
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.id() == Some(id))
    }

    /// First record whose `field` string-equals `value`.
    pub fn find_by_field_mut(&mut self, field: &str, value: &str) -> Option<&mut Record> {
        self.records
            .iter_mut()
            .find(|r| r.get(field).is_some_and(|v| v.coerce_string() == value))
    }

    pub fn remove_by_id(&mut self, id: &str) -> Option<Record> {
        let pos = self.position_by_id(id)?;
        Some(self.records.remove(pos))
    }

    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }
}

/// Record store with a lock per object collection.
///
/// The set of collections is fixed by the catalog at construction, so the map
/// itself needs no lock; only each collection is guarded.
pub struct RecordStore {
    collections: HashMap<String, Arc<RwLock<Collection>>>,
    order: Vec<String>,
}

impl RecordStore {
    pub fn new(catalog: &Catalog) -> Self {
        let order: Vec<String> = catalog.names().map(str::to_string).collect();
        let collections = order
            .iter()
            .map(|name| (name.clone(), Arc::new(RwLock::new(Collection::new()))))
            .collect();
        Self { collections, order }
    }

    /// Handle on one collection for concurrent access.
    pub fn collection(&self, name: &str) -> Result<Arc<RwLock<Collection>>> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| MockError::not_supported(name))
    }

    /// Consistent copy of a collection, taken under its read lock.
    pub async fn snapshot(&self, name: &str) -> Result<Vec<Record>> {
        let handle = self.collection(name)?;
        let collection = handle.read().await;
        Ok(collection.records().to_vec())
    }

    pub async fn insert(&self, name: &str, record: Record) -> Result<()> {
        let handle = self.collection(name)?;
        handle.write().await.push(record);
        Ok(())
    }

    pub async fn count(&self, name: &str) -> Result<usize> {
        let handle = self.collection(name)?;
        let collection = handle.read().await;
        Ok(collection.len())
    }

    pub async fn total_records(&self) -> usize {
        let mut total = 0;
        for name in &self.order {
            if let Some(handle) = self.collections.get(name) {
                total += handle.read().await.len();
            }
        }
        total
    }

    /// Clear every collection, keeping the schemas. Returns the number of records removed.
    pub async fn reset(&self) -> usize {
        let mut cleared = 0;
        for name in &self.order {
            if let Some(handle) = self.collections.get(name) {
                cleared += handle.write().await.clear();
            }
        }
        cleared
    }

    pub fn object_names(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Schema, Value};

    fn store() -> RecordStore {
        let catalog = Catalog::new().with_schema(Schema::builder("Account", "001").build());
        RecordStore::new(&catalog)
    }

    fn record(id: &str, name: &str) -> Record {
        let mut r = Record::new();
        r.set("Id", Value::from(id));
        r.set("Name", Value::from(name));
        r
    }

    #[tokio::test]
    async fn test_insert_snapshot_reset() {
        let store = store();
        store.insert("Account", record("001A", "Acme")).await.unwrap();
        store.insert("Account", record("001B", "Globex")).await.unwrap();

        let snapshot = store.snapshot("Account").await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].id(), Some("001B"));

        assert_eq!(store.reset().await, 2);
        assert_eq!(store.count("Account").await.unwrap(), 0);
    }

    #[test]
    fn test_new_record_assigns_id_and_stamps() {
        let schema = Schema::builder("Account", "001").build();
        let mut input = Record::new();
        input.set("Id", Value::from("bogus"));
        input.set("Name", Value::from("Acme"));

        let mut stored = new_record(&schema, &input);
        let id = stored.id().unwrap().to_string();
        assert!(id.starts_with("001"));
        assert_eq!(id.len(), 18);
        let keys: Vec<_> = stored.keys().collect();
        assert_eq!(keys, vec!["Id", "Name", "CreatedDate", "LastModifiedDate", "SystemModstamp"]);

        let mut patch = Record::new();
        patch.set("Name", Value::from("Globex"));
        apply_update(&mut stored, &patch);
        assert_eq!(stored.id(), Some(id.as_str()));
        assert_eq!(stored.get("Name"), Some(&Value::from("Globex")));
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let store = store();
        assert!(store.snapshot("Contact").await.is_err());
    }

    #[tokio::test]
    async fn test_find_and_remove() {
        let store = store();
        store.insert("Account", record("001A", "Acme")).await.unwrap();

        let handle = store.collection("Account").unwrap();
        let mut collection = handle.write().await;
        assert!(collection.find_by_field_mut("Name", "Acme").is_some());
        assert!(collection.remove_by_id("001A").is_some());
        assert!(collection.remove_by_id("001A").is_none());
    }
}
