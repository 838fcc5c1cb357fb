use crate::error::Result;
use crate::model::ModelInstance;
use crate::operators;
use serde_json::{json, Value};

/// An ordered, chain-filterable sequence of model instances.
///
/// Lookup methods (`find`, `first`) read without touching the contents;
/// `where_by` narrows the collection in place and returns it so filters can
/// be chained. Order is the store iteration order of the query that built
/// the collection.
pub struct Collection<'a> {
    items: Vec<ModelInstance<'a>>,
}

impl<'a> Collection<'a> {
    pub(crate) fn new(items: Vec<ModelInstance<'a>>) -> Self {
        Collection { items }
    }

    /// Linear scan for an element by id. Does not alter the collection.
    pub fn find(&self, id: u64) -> Option<&ModelInstance<'a>> {
        self.items.iter().find(|instance| instance.id() == Some(id))
    }

    /// The element at position 0, or `None` when the collection is empty.
    pub fn first(&self) -> Option<&ModelInstance<'a>> {
        self.items.first()
    }

    /// Re-evaluate the operator against every element and keep only the
    /// matches, in place. Returns the collection for chained narrowing.
    ///
    /// The special field `"id"` compares against the element id; any other
    /// field reads from the element's data, with a missing field comparing
    /// as `Null`.
    pub fn where_by(&mut self, field: &str, value: &Value, operator: &str) -> Result<&mut Self> {
        let mut keep = Vec::with_capacity(self.items.len());
        for instance in &self.items {
            let field_value = if field == "id" {
                instance.id().map_or(Value::Null, |id| json!(id))
            } else {
                instance.get(field).cloned().unwrap_or(Value::Null)
            };
            keep.push(operators::evaluate(operator, &field_value, value)?);
        }

        let mut flags = keep.into_iter();
        self.items.retain(|_| flags.next().unwrap_or(false));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModelInstance<'a>> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for Collection<'a> {
    type Item = ModelInstance<'a>;
    type IntoIter = std::vec::IntoIter<ModelInstance<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, 'b> IntoIterator for &'b Collection<'a> {
    type Item = &'b ModelInstance<'a>;
    type IntoIter = std::slice::Iter<'b, ModelInstance<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
