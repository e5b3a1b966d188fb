use crate::core::{MockError, Result, Schema};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Catalog holds object schemas only.
/// Immutable after construction, so clones are cheap and lock-free.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Copy-on-Write: `with_schema` builds a new map instead of mutating.
    schemas: Arc<HashMap<String, Schema>>,
    /// Registration order, used for listings and dumps.
    order: Arc<Vec<String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            schemas: Arc::new(HashMap::new()),
            order: Arc::new(Vec::new()),
        }
    }

    /// Register a schema, returning a NEW catalog. Re-registering a name replaces it.
    pub fn with_schema(self, schema: Schema) -> Self {
        let name = schema.name.clone();

        let mut schemas = (*self.schemas).clone();
        let mut order = (*self.order).clone();
        if schemas.insert(name.clone(), schema).is_none() {
            order.push(name);
        }

        Self {
            schemas: Arc::new(schemas),
            order: Arc::new(order),
        }
    }

    /// Load every `*.json` schema file in `dir`, sorted by file name.
    ///
    /// Files that cannot be read or parsed are skipped with a warning; a
    /// missing directory yields an empty catalog.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            warn!(path = %dir.display(), "schema directory not found, starting with no objects");
            return Ok(Self::new());
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut catalog = Self::new();
        for path in paths {
            match Self::load_file(&path) {
                Ok(schema) => {
                    info!(object = %schema.name, prefix = %schema.id_prefix, "loaded schema");
                    catalog = catalog.with_schema(schema);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "skipping schema file"),
            }
        }
        Ok(catalog)
    }

    fn load_file(path: &Path) -> Result<Schema> {
        let text = std::fs::read_to_string(path)?;
        let schema: Schema = serde_json::from_str(&text)
            .map_err(|e| MockError::InvalidField(format!("{}: {}", path.display(), e)))?;
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Like `get`, but an unknown object is the platform's NOT_FOUND.
    pub fn require(&self, name: &str) -> Result<&Schema> {
        self.get(name).ok_or_else(|| MockError::not_supported(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.order.iter().filter_map(|name| self.schemas.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
