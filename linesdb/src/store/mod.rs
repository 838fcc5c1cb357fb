use crate::collection::Collection;
use crate::error::{LinesDbError, Result};
use crate::model::ModelInstance;
use crate::operators;
use crate::schema::{self, ModelDescriptor};
use regex::Regex;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

/// The stored field map for one (model type, id) pair.
pub type Record = Map<String, Value>;

/// The main entry point for LinesDb.
///
/// Keeps raw records partitioned by model type and numeric id, plus the
/// registered model descriptors, and provides schema-aware CRUD and
/// predicate queries over them. Partitions iterate in ascending id order,
/// which defines store iteration order for query results.
///
/// All operations take `&self`; the maps live behind `RefCell` and every
/// borrow is scoped to a single operation. The store assumes a single
/// logical thread of control; a multi-threaded host must add its own
/// synchronization around it.
#[derive(Debug)]
pub struct Database {
    models: RefCell<HashMap<String, ModelDescriptor>>,
    data: RefCell<HashMap<String, BTreeMap<u64, Record>>>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Create an empty store.
    pub fn new() -> Self {
        Database {
            models: RefCell::new(HashMap::new()),
            data: RefCell::new(HashMap::new()),
        }
    }

    /// Create a store and bulk-load the given records into it.
    pub fn from_records(records: &[Value]) -> Result<Self> {
        let db = Self::new();
        db.load(records)?;
        Ok(db)
    }

    // ── Model registration ─────────────────────────────────────────

    /// Register a model type with its schema declaration. Subsequent CRUD
    /// for the type becomes schema-aware.
    ///
    /// Errors on a malformed declaration, a name that breaks the model
    /// naming convention, or a duplicate registration.
    pub fn register_model(&self, name: &str, declaration: &Value) -> Result<()> {
        let descriptor = schema::normalize(name, declaration)?;

        let mut models = self.models.borrow_mut();
        if models.contains_key(name) {
            return Err(LinesDbError::Schema(format!(
                "Model '{name}' is already registered"
            )));
        }

        log::debug!(
            "registered model '{name}' ({} fields, {} foreign keys)",
            descriptor.fields.len(),
            descriptor.foreign_keys.len()
        );
        models.insert(name.to_string(), descriptor);
        Ok(())
    }

    /// Look up the registered descriptor for a model type, if any.
    pub fn descriptor(&self, model: &str) -> Option<ModelDescriptor> {
        self.models.borrow().get(model).cloned()
    }

    // ── Bulk load ──────────────────────────────────────────────────

    /// Raw ingestion path, distinct from `insert`: partitions records by
    /// type and id without schema validation.
    ///
    /// Each record must be a flat object carrying a string `model` and an
    /// id that is an integer or an integer-formatted string; anything else
    /// is a load error naming the offending index. The `model` and `id`
    /// attributes are stripped from the stored field map.
    pub fn load(&self, records: &[Value]) -> Result<()> {
        let id_format = Regex::new("^[0-9]+$")
            .map_err(|e| LinesDbError::Other(format!("Id pattern failed to compile: {e}")))?;

        let mut partitions = self.data.borrow_mut();
        for (index, value) in records.iter().enumerate() {
            let obj = value
                .as_object()
                .ok_or_else(|| load_error(index, "record is not an object"))?;

            let model = obj
                .get("model")
                .ok_or_else(|| load_error(index, "missing attribute 'model'"))?
                .as_str()
                .ok_or_else(|| load_error(index, "type mismatch for attribute 'model'"))?;

            let id = match obj.get("id") {
                Some(Value::Number(n)) => n
                    .as_u64()
                    .ok_or_else(|| load_error(index, "type mismatch for attribute 'id'"))?,
                Some(Value::String(s)) if id_format.is_match(s) => s
                    .parse()
                    .map_err(|_| load_error(index, "type mismatch for attribute 'id'"))?,
                Some(_) => return Err(load_error(index, "type mismatch for attribute 'id'")),
                None => return Err(load_error(index, "missing attribute 'id'")),
            };

            let mut fields = obj.clone();
            fields.remove("model");
            fields.remove("id");
            partitions
                .entry(model.to_string())
                .or_default()
                .insert(id, fields);
        }

        log::debug!("loaded {} records", records.len());
        Ok(())
    }

    // ── CRUD ───────────────────────────────────────────────────────

    /// Get a record by model type and id, wrapped as a fresh instance over
    /// a copy of the stored fields. `None` when the type or id is unknown.
    pub fn find(&self, model: &str, id: u64) -> Option<ModelInstance<'_>> {
        let record = self.data.borrow().get(model)?.get(&id).cloned()?;
        Some(ModelInstance::from_record(self, model, id, record))
    }

    /// Scan all records of a type and collect operator matches into a
    /// collection, preserving store iteration order. The operator token
    /// follows [`crate::operators::evaluate`]; `"="` is plain equality.
    ///
    /// Returns `Ok(None)`, not an empty collection, when the model type
    /// has no data partition at all. A record missing the queried field
    /// compares as `Null`.
    pub fn where_by(
        &self,
        model: &str,
        field: &str,
        value: &Value,
        operator: &str,
    ) -> Result<Option<Collection<'_>>> {
        let matched: Vec<u64> = {
            let data = self.data.borrow();
            let Some(partition) = data.get(model) else {
                return Ok(None);
            };

            let mut ids = Vec::new();
            for (id, record) in partition {
                let field_value = record.get(field).cloned().unwrap_or(Value::Null);
                if operators::evaluate(operator, &field_value, value)? {
                    ids.push(*id);
                }
            }
            ids
        };

        let items = matched
            .into_iter()
            .filter_map(|id| self.find(model, id))
            .collect();
        Ok(Some(Collection::new(items)))
    }

    /// Insert a new record. Ids are assigned by the store: one greater than
    /// the current maximum id of the type, so the first id is 1.
    ///
    /// This max+1 policy is deliberate: deleting the current maximum id
    /// makes that id reusable by the next insert, while deleting a
    /// non-maximal id never causes reuse.
    ///
    /// For a schema-bearing type, required-and-missing fields raise a
    /// validation error, missing optional fields take their default, and
    /// provided fields are copied verbatim, including fields outside the
    /// schema. A schema-less type stores the data as-is.
    pub fn insert(&self, model: &str, data: &Value) -> Result<ModelInstance<'_>> {
        let supplied = data
            .as_object()
            .ok_or_else(|| LinesDbError::Validation("Insert data must be an object".into()))?;

        if supplied.contains_key("id") {
            return Err(LinesDbError::Validation(format!(
                "Ids are assigned by the store; remove 'id' from the insert into '{model}'"
            )));
        }

        let record = match self.descriptor(model) {
            Some(descriptor) => prepare_insert(&descriptor, supplied)?,
            None => supplied.clone(),
        };

        let id = {
            let mut partitions = self.data.borrow_mut();
            let partition = partitions.entry(model.to_string()).or_default();
            let id = partition.keys().next_back().copied().unwrap_or(0) + 1;
            partition.insert(id, record.clone());
            id
        };

        log::debug!("inserted {model}/{id}");
        Ok(ModelInstance::from_record(self, model, id, record))
    }

    /// Replace a record's fields in place and return the refreshed instance.
    ///
    /// For a schema-bearing type only schema fields in `data` are
    /// considered: a supplied required field set to null or an empty string
    /// is a validation error, and unknown fields are silently ignored. A
    /// schema-less type takes a shallow merge of all supplied fields
    /// (except `id` and `model`, which are not record fields).
    pub fn update(&self, model: &str, id: u64, data: &Value) -> Result<ModelInstance<'_>> {
        let supplied = data
            .as_object()
            .ok_or_else(|| LinesDbError::Validation("Update data must be an object".into()))?;
        let descriptor = self.descriptor(model);

        let merged = {
            let mut partitions = self.data.borrow_mut();
            let existing = partitions
                .get_mut(model)
                .and_then(|partition| partition.get_mut(&id))
                .ok_or_else(|| not_found(model, id))?;

            let merged = match &descriptor {
                Some(descriptor) => prepare_update(descriptor, existing, supplied)?,
                None => {
                    let mut record = existing.clone();
                    for (key, value) in supplied {
                        if key == "id" || key == "model" {
                            continue;
                        }
                        record.insert(key.clone(), value.clone());
                    }
                    record
                }
            };
            *existing = merged.clone();
            merged
        };

        log::debug!("updated {model}/{id}");
        Ok(ModelInstance::from_record(self, model, id, merged))
    }

    /// Remove a record. Errors when no record exists at the type/id pair;
    /// a subsequent `find` for the id returns `None`.
    pub fn delete(&self, model: &str, id: u64) -> Result<()> {
        let mut partitions = self.data.borrow_mut();
        partitions
            .get_mut(model)
            .and_then(|partition| partition.remove(&id))
            .ok_or_else(|| not_found(model, id))?;

        log::debug!("deleted {model}/{id}");
        Ok(())
    }

    // ── Model facade ───────────────────────────────────────────────

    /// Get a type-level convenience handle bound to one model name.
    pub fn model(&self, name: &str) -> ModelHandle<'_> {
        ModelHandle {
            db: self,
            model: name.to_string(),
        }
    }
}

/// A type-level convenience handle bound to one model name.
///
/// This replaces a process-global "active database" binding: the database
/// context is passed exactly once, when the handle is created, and the
/// handle then offers the model-type static surface.
pub struct ModelHandle<'a> {
    db: &'a Database,
    model: String,
}

impl<'a> ModelHandle<'a> {
    /// Find a record of this type by id.
    pub fn find(&self, id: u64) -> Option<ModelInstance<'a>> {
        self.db.find(&self.model, id)
    }

    /// Query records of this type. See [`Database::where_by`].
    pub fn where_by(
        &self,
        field: &str,
        value: &Value,
        operator: &str,
    ) -> Result<Option<Collection<'a>>> {
        self.db.where_by(&self.model, field, value, operator)
    }

    /// Insert a new record of this type and return its instance.
    pub fn create(&self, data: &Value) -> Result<ModelInstance<'a>> {
        self.db.insert(&self.model, data)
    }

    /// An unpersisted instance of this type: set fields, then `put` it.
    pub fn new_instance(&self) -> ModelInstance<'a> {
        ModelInstance::new(self.db, &self.model)
    }
}

// ── Schema-aware validation ────────────────────────────────────────

/// Validate insert data against a descriptor and fill defaults for absent
/// optional fields. Provided values are copied verbatim.
fn prepare_insert(descriptor: &ModelDescriptor, supplied: &Record) -> Result<Record> {
    let mut record = supplied.clone();

    for (field_name, field) in &descriptor.fields {
        let present = record.get(field_name).is_some_and(|v| !v.is_null());
        if present {
            continue;
        }
        if field.required {
            return Err(LinesDbError::Validation(format!(
                "Required field '{field_name}' is missing on insert into '{}'",
                descriptor.name
            )));
        }
        record.insert(field_name.clone(), field.default.clone());
    }

    Ok(record)
}

/// Merge update data into an existing record under a descriptor. Only
/// schema fields are considered; a required field cannot be emptied.
fn prepare_update(
    descriptor: &ModelDescriptor,
    existing: &Record,
    supplied: &Record,
) -> Result<Record> {
    let mut record = existing.clone();

    for (field_name, field) in &descriptor.fields {
        let Some(value) = supplied.get(field_name) else {
            continue;
        };
        if field.required && is_empty(value) {
            return Err(LinesDbError::Validation(format!(
                "Required field '{field_name}' cannot be emptied on update of '{}'",
                descriptor.name
            )));
        }
        record.insert(field_name.clone(), value.clone());
    }

    Ok(record)
}

fn is_empty(value: &Value) -> bool {
    value.is_null() || value.as_str() == Some("")
}

fn not_found(model: &str, id: u64) -> LinesDbError {
    LinesDbError::NotFound {
        model: model.to_string(),
        id,
    }
}

fn load_error(index: usize, reason: &str) -> LinesDbError {
    LinesDbError::Load {
        index,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn seed() -> Vec<Value> {
        vec![
            json!({"model": "Person", "id": 1, "name": "John", "age": 32}),
            json!({"model": "Person", "id": 2, "name": "jack", "age": 16}),
            json!({"model": "Person", "id": 3, "name": "Jane", "age": 54}),
            json!({"model": "Pet", "id": 1, "ownerId": 1, "type": "dog", "name": "Pluto"}),
            json!({"model": "Pet", "id": 2, "ownerId": 1, "type": "dog", "name": "Bingo"}),
            json!({"model": "Pet", "id": 3, "ownerId": 2, "type": "cat", "name": "Ginger"}),
            json!({"model": "Pet", "id": 4, "ownerId": 2, "type": "dog", "name": "Rex"}),
            json!({"model": "Pet", "id": 5, "ownerId": 2, "type": "fish", "name": "Nemo"}),
            json!({"model": "Pet", "id": 6, "ownerId": 3, "type": "dog", "name": "Pluto"}),
        ]
    }

    fn seeded_db() -> Database {
        Database::from_records(&seed()).unwrap()
    }

    fn register_models(db: &Database) {
        db.register_model("Person", &json!({ "name": "string", "age": "integer" }))
            .unwrap();
        db.register_model(
            "Pet",
            &json!({
                "ownerId": { "type": "fk", "model": "Person" },
                "type": "string",
                "name": "string",
            }),
        )
        .unwrap();
    }

    #[test]
    fn test_load_partitions_by_model_and_id() {
        let db = seeded_db();

        let person = db.find("Person", 1).unwrap();
        assert_eq!(person.get("name"), Some(&json!("John")));
        // model/id attributes are stripped from the stored fields
        assert_eq!(person.get("model"), None);
        assert_eq!(person.get("id"), None);

        assert!(db.find("Pet", 6).is_some());
    }

    #[test]
    fn test_load_accepts_integer_formatted_string_ids() {
        let db =
            Database::from_records(&[json!({"model": "Person", "id": "7", "name": "Ann"})])
                .unwrap();
        assert!(db.find("Person", 7).is_some());
    }

    #[test]
    fn test_load_rejects_malformed_records() {
        let missing_model = Database::from_records(&[json!({"id": 1})]).unwrap_err();
        assert!(missing_model.to_string().contains("record 0"));

        let records = vec![
            json!({"model": "Person", "id": 1, "name": "ok"}),
            json!({"model": "Person", "name": "no id"}),
        ];
        let missing_id = Database::from_records(&records).unwrap_err();
        assert!(missing_id.to_string().contains("record 1"));

        for bad_id in [json!("x1"), json!(1.5), json!(true), json!(-3)] {
            let err = Database::from_records(&[json!({"model": "Person", "id": bad_id.clone()})])
                .unwrap_err();
            assert!(err.to_string().contains("'id'"), "accepted id {bad_id}");
        }

        let bad_model =
            Database::from_records(&[json!({"model": 9, "id": 1})]).unwrap_err();
        assert!(bad_model.to_string().contains("'model'"));
    }

    #[test]
    fn test_find_unknown_returns_none() {
        let db = seeded_db();
        assert!(db.find("Ghost", 1).is_none());
        assert!(db.find("Person", 99).is_none());
    }

    #[test]
    fn test_find_returns_independent_copies() {
        let db = seeded_db();
        let mut first = db.find("Person", 1).unwrap();
        let second = db.find("Person", 1).unwrap();

        first.set("name", json!("James")).unwrap();
        assert_eq!(second.get("name"), Some(&json!("John")));
        // The stored record is untouched until an explicit write
        assert_eq!(db.find("Person", 1).unwrap().get("name"), Some(&json!("John")));
    }

    #[test]
    fn test_where_by_equality_subset() {
        let db = seeded_db();
        let dogs = db.where_by("Pet", "type", &json!("dog"), "=").unwrap().unwrap();
        assert_eq!(dogs.len(), 4);
        for pet in dogs.iter() {
            assert_eq!(pet.get("type"), Some(&json!("dog")));
        }
        // Store iteration order is ascending id order
        assert_eq!(dogs.first().unwrap().id(), Some(1));
    }

    #[test]
    fn test_where_by_unknown_model_is_none() {
        let db = seeded_db();
        assert!(db.where_by("Ghost", "type", &json!("dog"), "=").unwrap().is_none());
    }

    #[test]
    fn test_where_by_missing_field_compares_as_null() {
        let db = seeded_db();
        let none = db.where_by("Pet", "color", &json!("brown"), "=").unwrap().unwrap();
        assert!(none.is_empty());
        let all = db.where_by("Pet", "color", &json!(null), "=").unwrap().unwrap();
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn test_where_by_propagates_operator_errors() {
        let db = seeded_db();
        assert!(db.where_by("Pet", "type", &json!("dog"), "<>").is_err());
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let db = Database::new();
        let a = db.insert("Project", &json!({"title": "a"})).unwrap();
        let b = db.insert("Project", &json!({"title": "b"})).unwrap();
        let c = db.insert("Project", &json!({"title": "c"})).unwrap();
        assert_eq!(a.id(), Some(1));
        assert_eq!(b.id(), Some(2));
        assert_eq!(c.id(), Some(3));
    }

    // The id-allocation policy is max+1 over the surviving records:
    // deleting the current maximum frees its id for the next insert, while
    // deleting a non-maximal record never causes reuse.
    #[test]
    fn test_id_reuse_policy() {
        let db = Database::new();
        for title in ["a", "b", "c"] {
            db.insert("Project", &json!({ "title": title })).unwrap();
        }

        db.delete("Project", 3).unwrap();
        let reused = db.insert("Project", &json!({"title": "d"})).unwrap();
        assert_eq!(reused.id(), Some(3));

        db.delete("Project", 1).unwrap();
        let fresh = db.insert("Project", &json!({"title": "e"})).unwrap();
        assert_eq!(fresh.id(), Some(4));
        assert!(db.find("Project", 1).is_none());
    }

    #[test]
    fn test_insert_rejects_caller_supplied_id() {
        let db = Database::new();
        let err = db.insert("Project", &json!({"id": 7, "title": "a"})).unwrap_err();
        assert!(err.to_string().contains("assigned by the store"));
    }

    #[test]
    fn test_insert_applies_schema_defaults() {
        let db = Database::new();
        db.register_model(
            "Person",
            &json!({
                "name": { "type": "string", "required": true },
                "age": "integer",
                "score": "float",
            }),
        )
        .unwrap();

        let inserted = db.insert("Person", &json!({"name": "Marc"})).unwrap();
        assert_eq!(inserted.get("age"), Some(&json!(0)));
        assert_eq!(inserted.get("score"), Some(&json!(0.0)));

        let found = db.find("Person", inserted.id().unwrap()).unwrap();
        assert_eq!(found.get("name"), Some(&json!("Marc")));
        assert_eq!(found.get("age"), Some(&json!(0)));
    }

    #[test]
    fn test_insert_missing_required_field_is_error() {
        let db = Database::new();
        db.register_model("Person", &json!({ "name": { "type": "string", "required": true } }))
            .unwrap();

        let err = db.insert("Person", &json!({})).unwrap_err();
        assert!(err.to_string().contains("name"));
        let err = db.insert("Person", &json!({ "name": null })).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_insert_keeps_fields_outside_schema() {
        let db = Database::new();
        db.register_model("Project", &json!({ "title": "string" })).unwrap();

        let inserted = db
            .insert("Project", &json!({"title": "you wish", "other": "non-schema param"}))
            .unwrap();
        assert_eq!(inserted.get("other"), Some(&json!("non-schema param")));
    }

    #[test]
    fn test_insert_without_schema_stores_as_is() {
        let db = Database::new();
        let inserted = db.insert("Note", &json!({"body": "hi", "pinned": true})).unwrap();
        assert_eq!(inserted.id(), Some(1));
        assert_eq!(
            db.find("Note", 1).unwrap().data(),
            inserted.data()
        );
    }

    #[test]
    fn test_update_merges_and_refreshes() {
        let db = seeded_db();
        register_models(&db);

        let updated = db.update("Person", 2, &json!({"age": 17})).unwrap();
        assert_eq!(updated.get("age"), Some(&json!(17)));
        assert_eq!(updated.get("name"), Some(&json!("jack")));

        assert_eq!(db.find("Person", 2).unwrap().get("age"), Some(&json!(17)));
    }

    #[test]
    fn test_update_ignores_unknown_fields_under_schema() {
        let db = seeded_db();
        register_models(&db);

        let updated = db
            .update("Person", 1, &json!({"age": 33, "nickname": "Johnny"}))
            .unwrap();
        assert_eq!(updated.get("age"), Some(&json!(33)));
        assert_eq!(updated.get("nickname"), None);
    }

    #[test]
    fn test_update_cannot_empty_required_field() {
        let db = seeded_db();
        db.register_model("Person", &json!({ "name": { "type": "string", "required": true } }))
            .unwrap();

        assert!(db.update("Person", 1, &json!({ "name": "" })).is_err());
        assert!(db.update("Person", 1, &json!({ "name": null })).is_err());
        // Omitting the field entirely is fine
        assert!(db.update("Person", 1, &json!({})).is_ok());
    }

    #[test]
    fn test_update_without_schema_merges_shallowly() {
        let db = Database::new();
        db.insert("Note", &json!({"body": "hi", "pinned": true})).unwrap();

        let updated = db
            .update("Note", 1, &json!({"body": "bye", "id": 9, "model": "Other"}))
            .unwrap();
        assert_eq!(updated.get("body"), Some(&json!("bye")));
        assert_eq!(updated.get("pinned"), Some(&json!(true)));
        assert_eq!(updated.get("id"), None);
        assert_eq!(updated.get("model"), None);
    }

    #[test]
    fn test_update_and_delete_unknown_pair_is_not_found() {
        let db = seeded_db();
        let err = db.update("Person", 99, &json!({"age": 1})).unwrap_err();
        assert!(matches!(err, LinesDbError::NotFound { .. }));

        let err = db.delete("Ghost", 1).unwrap_err();
        assert!(matches!(err, LinesDbError::NotFound { .. }));
    }

    #[test]
    fn test_find_after_delete_is_none() {
        let db = seeded_db();
        db.delete("Pet", 2).unwrap();
        assert!(db.find("Pet", 2).is_none());
        // The rest of the partition survives
        assert!(db.find("Pet", 1).is_some());
    }

    #[test]
    fn test_register_model_rejects_duplicates() {
        let db = Database::new();
        db.register_model("Person", &json!({ "name": "string" })).unwrap();
        let err = db.register_model("Person", &json!({ "name": "string" })).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_model_handle_surface() {
        let db = seeded_db();
        register_models(&db);
        let people = db.model("Person");

        let person = people.find(2).unwrap();
        assert_eq!(person.id(), Some(2));

        let created = people.create(&json!({"name": "Marc", "age": 10})).unwrap();
        let found = people
            .where_by("age", &json!(10), "<=")
            .unwrap()
            .unwrap();
        assert_eq!(found.first().unwrap().id(), created.id());

        let mut draft = people.new_instance();
        assert_eq!(draft.id(), None);
        draft.set("name", json!("Massov")).unwrap();
        draft.put().unwrap();
        assert!(draft.id().is_some());
        assert_eq!(
            db.find("Person", draft.id().unwrap()).unwrap().get("name"),
            Some(&json!("Massov"))
        );
    }

    // Seeded records, a registered fk, and a lazy association resolved
    // through the store.
    #[test]
    fn test_end_to_end_association() {
        let db = Database::from_records(&[
            json!({"model": "Project", "id": 1, "title": "A"}),
            json!({"model": "TimeEvent", "id": 1, "projectId": 1, "description": "d"}),
        ])
        .unwrap();
        db.register_model("Project", &json!({ "title": "string" })).unwrap();
        db.register_model(
            "TimeEvent",
            &json!({
                "projectId": { "type": "fk", "model": "Project" },
                "description": "string",
            }),
        )
        .unwrap();

        let event = db.find("TimeEvent", 1).unwrap().with("project").unwrap();
        let project = event.get("project").unwrap();
        assert_eq!(project["id"], json!(1));
        assert_eq!(project["title"], json!("A"));
    }
}
