//! Object-world values held by a data proxy.
//!
//! [`FieldValue`] is the in-memory representation of one field. Composite values
//! are wrapped in tracked containers ([`TrackedList`], [`TrackedDict`],
//! [`EmbeddedDocument`]) that deserialize every element through the field they
//! belong to and record their own modifications.

use bson::{Bson, oid::ObjectId};
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult, ErrorMessages},
    field::Field,
    proxy::DataProxy,
    reference::Reference,
    schema::Schema,
    tracker::Tracked,
};

/// The object-world value of a single field.
///
/// `Missing` means the field holds no value at all and is omitted from storage
/// payloads, while `Null` is an explicit null.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldValue {
    /// No value.
    #[default]
    Missing,
    /// Explicit null.
    Null,
    /// A plain BSON value (string, number, date, object id, ...).
    Scalar(Bson),
    /// A tracked list.
    List(TrackedList),
    /// A tracked string-keyed map.
    Dict(TrackedDict),
    /// An embedded document.
    Embedded(EmbeddedDocument),
    /// A reference to another document.
    Reference(Reference),
}

impl FieldValue {
    /// Returns `true` for [`FieldValue::Missing`].
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// Returns `true` for [`FieldValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_bson(&self) -> Option<&Bson> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(Bson::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Scalar(Bson::Int32(value)) => Some(i64::from(*value)),
            FieldValue::Scalar(Bson::Int64(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Scalar(Bson::Double(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Scalar(Bson::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            FieldValue::Scalar(Bson::ObjectId(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&TrackedList> {
        match self {
            FieldValue::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut TrackedList> {
        match self {
            FieldValue::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&TrackedDict> {
        match self {
            FieldValue::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut TrackedDict> {
        match self {
            FieldValue::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_embedded(&self) -> Option<&EmbeddedDocument> {
        match self {
            FieldValue::Embedded(embedded) => Some(embedded),
            _ => None,
        }
    }

    pub fn as_embedded_mut(&mut self) -> Option<&mut EmbeddedDocument> {
        match self {
            FieldValue::Embedded(embedded) => Some(embedded),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            FieldValue::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// Converts the value to BSON without the help of a field.
    ///
    /// Used for untyped dict entries. Returns `None` for missing values.
    pub fn to_bson(&self) -> Option<Bson> {
        match self {
            FieldValue::Missing => None,
            FieldValue::Null => Some(Bson::Null),
            FieldValue::Scalar(value) => Some(value.clone()),
            FieldValue::List(list) => Some(Bson::Array(
                list.iter()
                    .map(|item| item.to_bson().unwrap_or(Bson::Null))
                    .collect(),
            )),
            FieldValue::Dict(dict) => Some(Bson::Document(
                dict.iter()
                    .filter_map(|(key, value)| value.to_bson().map(|value| (key.clone(), value)))
                    .collect(),
            )),
            FieldValue::Embedded(embedded) => Some(Bson::Document(embedded.to_storage())),
            FieldValue::Reference(reference) => Some(reference.pk().clone()),
        }
    }
}

impl Tracked for FieldValue {
    fn is_modified(&self) -> bool {
        match self {
            FieldValue::List(list) => list.is_modified(),
            FieldValue::Dict(dict) => dict.is_modified(),
            FieldValue::Embedded(embedded) => embedded.is_modified(),
            _ => false,
        }
    }

    fn clear_modified(&mut self) {
        match self {
            FieldValue::List(list) => list.clear_modified(),
            FieldValue::Dict(dict) => dict.clear_modified(),
            FieldValue::Embedded(embedded) => embedded.clear_modified(),
            _ => {}
        }
    }
}

impl From<Bson> for FieldValue {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Null => FieldValue::Null,
            value => FieldValue::Scalar(value),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(Bson::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Scalar(Bson::String(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Scalar(Bson::Int32(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Scalar(Bson::Int64(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Scalar(Bson::Double(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Scalar(Bson::Boolean(value))
    }
}

impl From<ObjectId> for FieldValue {
    fn from(value: ObjectId) -> Self {
        FieldValue::Scalar(Bson::ObjectId(value))
    }
}

impl From<bson::DateTime> for FieldValue {
    fn from(value: bson::DateTime) -> Self {
        FieldValue::Scalar(Bson::DateTime(value))
    }
}

impl From<bson::Document> for FieldValue {
    fn from(value: bson::Document) -> Self {
        FieldValue::Scalar(Bson::Document(value))
    }
}

impl From<Vec<Bson>> for FieldValue {
    fn from(value: Vec<Bson>) -> Self {
        FieldValue::Scalar(Bson::Array(value))
    }
}

impl From<Reference> for FieldValue {
    fn from(value: Reference) -> Self {
        FieldValue::Reference(value)
    }
}

impl From<EmbeddedDocument> for FieldValue {
    fn from(value: EmbeddedDocument) -> Self {
        FieldValue::Embedded(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// A list whose elements are validated by an inner field and whose mutations are recorded.
///
/// Besides the modified flag, the list remembers whether every change since the
/// last clear was an append. Bulk updates use that to push only the new elements.
#[derive(Debug, Clone)]
pub struct TrackedList {
    field: Arc<Field>,
    items: Vec<FieldValue>,
    modified: bool,
    appended_from: Option<usize>,
}

impl TrackedList {
    pub(crate) fn new(field: Arc<Field>, items: Vec<FieldValue>) -> Self {
        Self {
            field,
            items,
            modified: false,
            appended_from: Some(0),
        }
    }

    /// Returns the field every element is deserialized through.
    pub fn field(&self) -> &Arc<Field> {
        &self.field
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldValue> {
        self.items.iter()
    }

    pub fn contains(&self, value: &FieldValue) -> bool {
        self.items.contains(value)
    }

    /// Gives mutable access to an element.
    ///
    /// The list is marked modified up front since the element may be replaced
    /// in place. Use [`TrackedList::embedded_mut`] to edit an embedded element
    /// while keeping change tracking at the element level.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut FieldValue> {
        let item = self.items.get_mut(index)?;
        self.modified = true;
        self.appended_from = None;
        Some(item)
    }

    /// Gives mutable access to an embedded-document element without marking the list.
    pub fn embedded_mut(&mut self, index: usize) -> Option<&mut EmbeddedDocument> {
        self.items.get_mut(index).and_then(FieldValue::as_embedded_mut)
    }

    /// Replaces the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-usage error when `index` is out of bounds, or a
    /// validation error keyed by index when the inner field rejects `value`.
    pub fn set(&mut self, index: usize, value: impl Into<FieldValue>) -> DocumentStoreResult<()> {
        let len = self.items.len();

        if index >= len {
            return Err(DocumentStoreError::InvalidUsage(format!(
                "list index {index} out of range for length {len}"
            )));
        }

        let value = self.deserialize(index, value.into())?;
        self.items[index] = value;
        self.touch();
        Ok(())
    }

    /// Appends an element.
    pub fn push(&mut self, value: impl Into<FieldValue>) -> DocumentStoreResult<()> {
        let value = self.deserialize(self.items.len(), value.into())?;
        self.items.push(value);
        self.modified = true;
        Ok(())
    }

    /// Appends every element of `values`. Nothing is appended if any element is rejected.
    pub fn extend<I, V>(&mut self, values: I) -> DocumentStoreResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let start = self.items.len();
        let values = values
            .into_iter()
            .enumerate()
            .map(|(offset, value)| self.deserialize(start + offset, value.into()))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.items.extend(values);
        self.modified = true;
        Ok(())
    }

    /// Inserts an element at `index`, shifting later elements.
    pub fn insert(&mut self, index: usize, value: impl Into<FieldValue>) -> DocumentStoreResult<()> {
        let len = self.items.len();

        if index > len {
            return Err(DocumentStoreError::InvalidUsage(format!(
                "list insertion index {index} out of range for length {len}"
            )));
        }

        let value = self.deserialize(index, value.into())?;
        self.items.insert(index, value);
        self.touch();
        Ok(())
    }

    /// Removes and returns the element at `index`, or `None` if out of bounds.
    pub fn remove(&mut self, index: usize) -> Option<FieldValue> {
        if index >= self.items.len() {
            return None;
        }

        self.touch();
        Some(self.items.remove(index))
    }

    /// Removes the first element equal to `value`. Returns `false` if none matched.
    pub fn remove_value(&mut self, value: &FieldValue) -> bool {
        match self.items.iter().position(|item| item == value) {
            Some(index) => {
                self.items.remove(index);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<FieldValue> {
        let item = self.items.pop()?;
        self.touch();
        Some(item)
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
    }

    pub fn reverse(&mut self) {
        self.items.reverse();
        self.touch();
    }

    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&FieldValue, &FieldValue) -> std::cmp::Ordering,
    {
        self.items.sort_by(compare);
        self.touch();
    }

    /// Flags the list as modified, disabling append-only bulk pushes.
    pub fn mark_modified(&mut self) {
        self.touch();
    }

    /// Returns the elements appended since the last clear, if appends are the only
    /// change made to the list.
    pub fn appended(&self) -> Option<&[FieldValue]> {
        let from = self.appended_from?;

        if self.items[..from].iter().any(Tracked::is_modified) {
            return None;
        }

        Some(&self.items[from..])
    }

    pub fn into_items(self) -> Vec<FieldValue> {
        self.items
    }

    fn touch(&mut self) {
        self.modified = true;
        self.appended_from = None;
    }

    fn deserialize(&self, index: usize, value: FieldValue) -> DocumentStoreResult<FieldValue> {
        self.field
            .deserialize(value)
            .map_err(|errors| ErrorMessages::field(index.to_string(), errors).into())
    }
}

impl Tracked for TrackedList {
    fn is_modified(&self) -> bool {
        self.modified || self.items.iter().any(Tracked::is_modified)
    }

    fn clear_modified(&mut self) {
        self.modified = false;
        self.appended_from = Some(self.items.len());
        self.items.iter_mut().for_each(Tracked::clear_modified);
    }
}

impl PartialEq for TrackedList {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<'a> IntoIterator for &'a TrackedList {
    type Item = &'a FieldValue;
    type IntoIter = std::slice::Iter<'a, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A string-keyed map whose mutations are recorded.
///
/// When built from a dict field with a value field, every inserted value is
/// deserialized through it.
#[derive(Debug, Clone)]
pub struct TrackedDict {
    field: Option<Arc<Field>>,
    entries: BTreeMap<String, FieldValue>,
    modified: bool,
}

impl TrackedDict {
    pub(crate) fn new(field: Option<Arc<Field>>, entries: BTreeMap<String, FieldValue>) -> Self {
        Self {
            field,
            entries,
            modified: false,
        }
    }

    pub fn field(&self) -> Option<&Arc<Field>> {
        self.field.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, String, FieldValue> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Inserts `value` under `key`, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> DocumentStoreResult<Option<FieldValue>> {
        let key = key.into();
        let value = match &self.field {
            Some(field) => field
                .deserialize(value.into())
                .map_err(|errors| ErrorMessages::field(key.clone(), errors))?,
            None => value.into(),
        };

        self.modified = true;
        Ok(self.entries.insert(key, value))
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let removed = self.entries.remove(key)?;
        self.modified = true;
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.modified = true;
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn into_entries(self) -> BTreeMap<String, FieldValue> {
        self.entries
    }
}

impl Tracked for TrackedDict {
    fn is_modified(&self) -> bool {
        self.modified || self.entries.values().any(Tracked::is_modified)
    }

    fn clear_modified(&mut self) {
        self.modified = false;
        self.entries.values_mut().for_each(Tracked::clear_modified);
    }
}

impl PartialEq for TrackedDict {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// A document nested inside another document, stored inline.
///
/// It owns its own data proxy, so its fields are tracked independently and a
/// change to any of them marks the enclosing field modified.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedDocument {
    data: DataProxy,
}

impl EmbeddedDocument {
    /// Creates an embedded document holding only default values.
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            data: DataProxy::new(schema.clone()),
        }
    }

    /// Creates an embedded document from object-world data.
    pub fn load(schema: &Arc<Schema>, input: bson::Document) -> Result<Self, ErrorMessages> {
        let mut data = DataProxy::new(schema.clone());
        data.load_values(input)?;
        Ok(Self { data })
    }

    /// Decodes an embedded document from its stored form.
    pub fn from_storage(schema: &Arc<Schema>, stored: bson::Document) -> DocumentStoreResult<Self> {
        let mut data = DataProxy::new(schema.clone());
        data.from_storage(stored)?;
        Ok(Self { data })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.data.schema()
    }

    pub fn data(&self) -> &DataProxy {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataProxy {
        &mut self.data
    }

    pub fn get(&self, name: &str) -> DocumentStoreResult<&FieldValue> {
        self.data.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> DocumentStoreResult<()> {
        self.data.set(name, value)
    }

    pub fn delete(&mut self, name: &str) -> DocumentStoreResult<()> {
        self.data.delete(name)
    }

    pub fn to_storage(&self) -> bson::Document {
        self.data.to_storage()
    }

    pub fn dump(&self) -> bson::Document {
        self.data.dump()
    }

    pub(crate) fn required_errors(&self) -> Result<(), ErrorMessages> {
        self.data.required_errors()
    }
}

impl Tracked for EmbeddedDocument {
    fn is_modified(&self) -> bool {
        self.data.is_modified()
    }

    fn clear_modified(&mut self) {
        self.data.clear_modified();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn tags() -> TrackedList {
        TrackedList::new(Arc::new(Field::string("tag")), Vec::new())
    }

    #[test]
    fn push_is_validated_by_inner_field() {
        let mut list = tags();

        let err = list.push(12).unwrap_err();
        let messages = err.validation_messages().unwrap();

        assert!(messages.get("0").is_some());
        assert!(list.is_empty());
        assert!(!list.is_modified());
    }

    #[test]
    fn appends_are_reported_until_another_mutation() {
        let mut list = tags();
        list.push("a").unwrap();
        list.clear_modified();

        list.push("b").unwrap();
        assert_eq!(list.appended().unwrap(), [FieldValue::from("b")]);

        list.reverse();
        assert!(list.appended().is_none());
        assert!(list.is_modified());
    }

    #[test]
    fn extend_is_all_or_nothing() {
        let mut list = tags();

        assert!(list.extend([Bson::from("a"), Bson::Int32(2)]).is_err());
        assert!(list.is_empty());
    }

    #[test]
    fn dict_insert_and_remove_mark_modified() {
        let mut dict = TrackedDict::new(None, BTreeMap::new());
        dict.insert("a", 1).unwrap();
        dict.clear_modified();
        assert!(!dict.is_modified());

        assert!(dict.remove("missing").is_none());
        assert!(!dict.is_modified());

        dict.remove("a");
        assert!(dict.is_modified());
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(FieldValue::from(None::<i32>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some(3)), FieldValue::Scalar(Bson::Int32(3)));
    }
}
