use crate::error::{LinesDbError, Result};
use crate::store::{Database, Record};
use serde_json::{json, Map, Value};
use std::fmt;

/// A live wrapper around one record.
///
/// An instance holds a private copy of the record's fields taken at read
/// time: mutations stay invisible to the store (and to every other
/// instance) until an explicit `put`. The id is assigned by the store and
/// immutable once set.
///
/// Lifecycle: an instance starts unpersisted (no id), becomes persisted
/// through `put` or the handle's `create`, and ends with `remove`. There is
/// no way back from removal.
#[derive(Clone)]
pub struct ModelInstance<'a> {
    db: &'a Database,
    model: String,
    id: Option<u64>,
    data: Record,
}

impl<'a> ModelInstance<'a> {
    /// An unpersisted instance. `put` will insert it and assign an id.
    pub fn new(db: &'a Database, model: &str) -> Self {
        ModelInstance {
            db,
            model: model.to_string(),
            id: None,
            data: Map::new(),
        }
    }

    pub(crate) fn from_record(db: &'a Database, model: &str, id: u64, data: Record) -> Self {
        ModelInstance {
            db,
            model: model.to_string(),
            id: Some(id),
            data,
        }
    }

    /// The store-assigned id, or `None` while unpersisted.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// The model type name. Fixed at creation.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The instance's private field data.
    pub fn data(&self) -> &Record {
        &self.data
    }

    /// Read one field. Associations resolved by `with` live here too,
    /// memoized under their association name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Write one field on the private copy. The id is immutable: writing
    /// `"id"` is a validation error.
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        if field == "id" {
            return Err(LinesDbError::Validation(
                "The id of a record is immutable".into(),
            ));
        }
        self.data.insert(field.to_string(), value);
        Ok(())
    }

    /// Resolve a foreign-key association lazily and memoize it.
    ///
    /// The foreign-key field is `<name>Id`. The owning type must have a
    /// registered schema whose foreign-key map contains that field, and the
    /// record must carry a value for it. The target record is resolved
    /// through the store and memoized under `name` as an object of its id
    /// plus its fields, or `Null` when the referenced id does not resolve.
    /// Returns the instance to allow chaining.
    pub fn with(mut self, name: &str) -> Result<Self> {
        let key = format!("{name}Id");

        let descriptor = self.db.descriptor(&self.model).ok_or_else(|| {
            LinesDbError::Schema(format!("No schema declared for model '{}'", self.model))
        })?;
        let target = descriptor.foreign_keys.get(&key).ok_or_else(|| {
            LinesDbError::Schema(format!(
                "Model '{}' does not have a FK '{key}'",
                self.model
            ))
        })?;
        let fk_value = self.data.get(&key).ok_or_else(|| {
            LinesDbError::Validation(format!(
                "{} record does not carry a '{target}' reference",
                self.model
            ))
        })?;

        let resolved = fk_value
            .as_u64()
            .and_then(|id| self.db.find(target, id))
            .map(|instance| instance.to_association())
            .unwrap_or(Value::Null);
        self.data.insert(name.to_string(), resolved);

        Ok(self)
    }

    /// Persist the private copy: insert when unpersisted (adopting the
    /// assigned id and default-filled data), update otherwise (adopting the
    /// merged record).
    pub fn put(&mut self) -> Result<()> {
        match self.id {
            None => {
                let saved = self.db.insert(&self.model, &Value::Object(self.data.clone()))?;
                self.id = saved.id;
                self.data = saved.data;
            }
            Some(id) => {
                let saved = self
                    .db
                    .update(&self.model, id, &Value::Object(self.data.clone()))?;
                self.data = saved.data;
            }
        }
        Ok(())
    }

    /// Delete the backing record through the store. Consumes the instance;
    /// a removed record cannot come back.
    pub fn remove(self) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            LinesDbError::Validation(format!(
                "Cannot remove an unpersisted '{}' instance",
                self.model
            ))
        })?;
        self.db.delete(&self.model, id)
    }

    /// Serializable view of the instance: model name, id, and the visible
    /// field data. The store back-reference is not part of it.
    pub fn to_value(&self) -> Value {
        json!({
            "model": self.model,
            "id": self.id,
            "data": self.data,
        })
    }

    /// The flat `{id, fields...}` form used when this instance is memoized
    /// as another record's association.
    fn to_association(&self) -> Value {
        let mut obj = Map::new();
        if let Some(id) = self.id {
            obj.insert("id".to_string(), json!(id));
        }
        for (key, value) in &self.data {
            obj.insert(key.clone(), value.clone());
        }
        Value::Object(obj)
    }
}

impl fmt::Display for ModelInstance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl fmt::Debug for ModelInstance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInstance")
            .field("model", &self.model)
            .field("id", &self.id)
            .field("data", &self.data)
            .finish()
    }
}
