//! The data proxy: the field-value container behind every document.
//!
//! A [`DataProxy`] holds one [`FieldValue`] per schema field, keeps a
//! [`ModificationTracker`] of the storage names written since the last clear,
//! and converts the whole record between object-world input, stored form and
//! the update payloads sent to the backend.
//!
//! All object-world access goes by field name (`name`), while stored records and
//! update payloads use storage names (`attribute`, falling back to `name`).

use bson::{Bson, doc};
use std::{collections::BTreeSet, sync::Arc};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult, ErrorCollector, ErrorMessages},
    field::{Field, MessageKey},
    schema::Schema,
    tracker::{ModificationTracker, Tracked},
    value::{EmbeddedDocument, FieldValue, TrackedDict, TrackedList},
};

/// Field values of one document, with change tracking.
#[derive(Debug, Clone)]
pub struct DataProxy {
    schema: Arc<Schema>,
    values: Vec<FieldValue>,
    tracker: ModificationTracker,
    extra: bson::Document,
}

impl PartialEq for DataProxy {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name()
            && self.values == other.values
            && self.extra == other.extra
    }
}

impl DataProxy {
    /// Creates a proxy holding only default values, with nothing marked modified.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema.fields().iter().map(|field| field.default_value()).collect();

        Self {
            schema,
            values,
            tracker: ModificationTracker::new(),
            extra: bson::Document::new(),
        }
    }

    /// Creates a proxy from object-world input, see [`DataProxy::load`].
    pub fn with_data<I, K, V>(schema: Arc<Schema>, input: I) -> DocumentStoreResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let mut proxy = Self::new(schema);
        proxy.load(input)?;
        Ok(proxy)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Replaces the whole content from object-world input.
    ///
    /// Fields absent from `input` take their default. Every field is marked
    /// modified afterwards, so a freshly loaded proxy writes all of its values.
    ///
    /// # Errors
    ///
    /// Returns a validation error keyed by field name if any value is rejected or
    /// any key is unknown. The proxy is left untouched in that case.
    pub fn load<I, K, V>(&mut self, input: I) -> DocumentStoreResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.load_values(input).map_err(Into::into)
    }

    pub(crate) fn load_values<I, K, V>(&mut self, input: I) -> Result<(), ErrorMessages>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let loaded = self.deserialize_input(input)?;
        let mut values = vec![FieldValue::Missing; self.values.len()];

        for (idx, value) in loaded {
            values[idx] = value;
        }

        self.backfill(&mut values);
        self.values = values;
        self.extra = bson::Document::new();
        self.tracker.clear(self.values.iter_mut());

        for field in self.schema.fields() {
            self.tracker.mark(field.storage_name());
        }

        Ok(())
    }

    /// Merges object-world input into the current content, marking each given field.
    ///
    /// # Errors
    ///
    /// Same as [`DataProxy::load`]; nothing is written if any value is rejected.
    pub fn update<I, K, V>(&mut self, input: I) -> DocumentStoreResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let loaded = self.deserialize_input(input)?;

        for (idx, value) in loaded {
            self.values[idx] = value;
            self.tracker.mark(self.schema.fields()[idx].storage_name());
        }

        Ok(())
    }

    fn deserialize_input<I, K, V>(&self, input: I) -> Result<Vec<(usize, FieldValue)>, ErrorMessages>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let mut errors = ErrorCollector::default();
        let mut loaded = Vec::new();

        for (key, value) in input {
            let key = key.into();

            let Some(idx) = self.schema.field_index(&key) else {
                errors.add(key, ErrorMessages::message("Unknown field."));
                continue;
            };

            match self.schema.fields()[idx].deserialize(value.into()) {
                Ok(value) => loaded.push((idx, value)),
                Err(messages) => errors.add(key, messages),
            }
        }

        errors.finish()?;
        Ok(loaded)
    }

    fn backfill(&self, values: &mut [FieldValue]) {
        for (field, value) in self.schema.fields().iter().zip(values.iter_mut()) {
            if value.is_missing() {
                *value = field.default_value();
            }
        }
    }

    /// Replaces the whole content from a stored record and clears all modifications.
    ///
    /// Keys are matched by storage name. Unknown keys are rejected by strict
    /// schemas and kept aside (and written back by [`DataProxy::to_storage`]) by
    /// non-strict ones.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownFieldInDb`] for an unknown key under a
    /// strict schema, or [`DocumentStoreError::InvalidDocument`] for a malformed value.
    pub fn from_storage(&mut self, stored: bson::Document) -> DocumentStoreResult<()> {
        let mut values = vec![FieldValue::Missing; self.values.len()];
        let mut extra = bson::Document::new();

        for (key, value) in stored {
            match self.schema.storage_index(&key) {
                Some(idx) => values[idx] = self.schema.fields()[idx].from_storage(value)?,
                None if self.schema.is_strict() => {
                    return Err(DocumentStoreError::UnknownFieldInDb {
                        document: self.schema.name().to_string(),
                        field: key,
                    });
                }
                None => {
                    extra.insert(key, value);
                }
            }
        }

        self.backfill(&mut values);
        self.values = values;
        self.extra = extra;
        self.tracker.clear(self.values.iter_mut());
        Ok(())
    }

    /// Encodes the full record, keyed by storage name. Missing values and empty
    /// lists or dicts are omitted.
    pub fn to_storage(&self) -> bson::Document {
        let mut stored = bson::Document::new();

        for (field, value) in self.fields() {
            if let Some(value) = field.to_storage(value) {
                stored.insert(field.storage_name(), value);
            }
        }

        for (key, value) in &self.extra {
            if !stored.contains_key(key) {
                stored.insert(key.clone(), value.clone());
            }
        }

        stored
    }

    /// Builds a partial update from the modified fields.
    ///
    /// Modified fields with a storable value go under `$set`; modified fields
    /// that are now absent go under `$unset` with an empty-string value. Returns
    /// `None` when nothing was modified.
    pub fn to_storage_update(&self) -> Option<bson::Document> {
        let mut set = bson::Document::new();
        let mut unset = bson::Document::new();

        for (field, value) in self.modified_fields() {
            match field.to_storage(value) {
                Some(value) => {
                    set.insert(field.storage_name(), value);
                }
                None => {
                    unset.insert(field.storage_name(), "");
                }
            }
        }

        let mut update = bson::Document::new();

        if !set.is_empty() {
            update.insert("$set", set);
        }

        if !unset.is_empty() {
            update.insert("$unset", unset);
        }

        (!update.is_empty()).then_some(update)
    }

    /// Builds an update suitable for applying the modified fields to many records.
    ///
    /// Map values are flattened into dotted `$set` paths so sibling keys of each
    /// record survive. List values are pushed (one element plainly, several with
    /// `$each`) unless `replace_arrays` is set, in which case they are `$set`.
    /// A list whose only changes since the last clear are appends pushes just the
    /// appended elements. Absent values go under `$unset`.
    pub fn to_storage_update_many(&self, replace_arrays: bool) -> Option<bson::Document> {
        let mut changes = FieldChanges::new(replace_arrays);

        for (field, value) in self.modified_fields() {
            let name = field.storage_name().to_string();

            match (value, field.to_storage(value)) {
                (_, None) => changes.unset(name),
                (FieldValue::List(list), Some(Bson::Array(all))) if !replace_arrays => {
                    match list.appended() {
                        Some(appended) => changes.set_list(
                            name,
                            appended
                                .iter()
                                .map(|item| list.field().to_storage(item).unwrap_or(Bson::Null))
                                .collect(),
                        ),
                        None => changes.set_list(name, all),
                    }
                }
                (_, Some(stored)) => changes.set_value(name, stored),
            }
        }

        changes.into_update()
    }

    fn index_of(&self, name: &str) -> DocumentStoreResult<usize> {
        self.schema.field_index(name).ok_or_else(|| {
            DocumentStoreError::InvalidUsage(format!(
                "{} has no field named `{name}`",
                self.schema.name()
            ))
        })
    }

    /// Returns the value of a field by object-world name.
    pub fn get(&self, name: &str) -> DocumentStoreResult<&FieldValue> {
        let idx = self.index_of(name)?;
        Ok(&self.values[idx])
    }

    /// Returns the tracked list held by a list field.
    ///
    /// The list records its own mutations; the field is not marked.
    pub fn list_mut(&mut self, name: &str) -> DocumentStoreResult<&mut TrackedList> {
        let idx = self.index_of(name)?;
        self.values[idx].as_list_mut().ok_or_else(|| {
            DocumentStoreError::InvalidUsage(format!("field `{name}` does not hold a list"))
        })
    }

    /// Returns the tracked dict held by a dict field.
    pub fn dict_mut(&mut self, name: &str) -> DocumentStoreResult<&mut TrackedDict> {
        let idx = self.index_of(name)?;
        self.values[idx].as_dict_mut().ok_or_else(|| {
            DocumentStoreError::InvalidUsage(format!("field `{name}` does not hold a dict"))
        })
    }

    /// Returns the embedded document held by an embedded field.
    pub fn embedded_mut(&mut self, name: &str) -> DocumentStoreResult<&mut EmbeddedDocument> {
        let idx = self.index_of(name)?;
        self.values[idx].as_embedded_mut().ok_or_else(|| {
            DocumentStoreError::InvalidUsage(format!("field `{name}` does not hold an embedded document"))
        })
    }

    /// Deserializes `value` through the field and stores it, marking the field.
    ///
    /// # Errors
    ///
    /// Returns a validation error keyed by `name` when the value is rejected,
    /// including null on a field that does not allow it.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> DocumentStoreResult<()> {
        let idx = self.index_of(name)?;
        let field = &self.schema.fields()[idx];
        let value = field
            .deserialize(value.into())
            .map_err(|errors| ErrorMessages::field(name, errors))?;

        self.tracker.mark(field.storage_name());
        self.values[idx] = value;
        Ok(())
    }

    /// Stores an already-trusted value without deserializing it, marking nothing.
    pub(crate) fn set_trusted(&mut self, idx: usize, value: FieldValue) {
        self.values[idx] = value;
    }

    /// Resets a field to its default and marks it.
    pub fn delete(&mut self, name: &str) -> DocumentStoreResult<()> {
        let idx = self.index_of(name)?;
        let field = &self.schema.fields()[idx];

        self.tracker.mark(field.storage_name());
        self.values[idx] = field.default_value();
        Ok(())
    }

    /// Checks that every required field has a value, recursing into embedded
    /// documents, lists and dicts.
    ///
    /// # Errors
    ///
    /// Returns a validation error keyed by field name.
    pub fn required_validate(&self) -> DocumentStoreResult<()> {
        self.required_errors().map_err(Into::into)
    }

    pub(crate) fn required_errors(&self) -> Result<(), ErrorMessages> {
        let mut errors = ErrorCollector::default();

        for (field, value) in self.fields() {
            match value {
                FieldValue::Missing if field.is_required() => {
                    errors.add(field.name(), ErrorMessages::message(field.message(MessageKey::Required)));
                }
                FieldValue::Missing | FieldValue::Null => {}
                value => {
                    if let Err(messages) = field.required_validate(value) {
                        errors.add(field.name(), messages);
                    }
                }
            }
        }

        errors.finish()
    }

    /// Storage names of the fields modified since the last clear, including
    /// composite values mutated in place.
    pub fn get_modified_fields(&self) -> BTreeSet<String> {
        self.modified_fields()
            .map(|(field, _)| field.storage_name().to_string())
            .collect()
    }

    fn modified_fields(&self) -> impl Iterator<Item = (&Arc<Field>, &FieldValue)> {
        self.fields()
            .filter(|(field, value)| self.tracker.is_marked(field.storage_name()) || value.is_modified())
    }

    pub fn is_modified(&self) -> bool {
        self.tracker.is_modified(self.values.iter())
    }

    /// Forgets every modification, including those inside composite values.
    pub fn clear_modified(&mut self) {
        self.tracker.clear(self.values.iter_mut());
    }

    /// Iterates over fields and their values in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&Arc<Field>, &FieldValue)> {
        self.schema.fields().iter().zip(self.values.iter())
    }

    /// Iterates over object-world names and values.
    pub fn items(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields().map(|(field, value)| (field.name(), value))
    }

    /// Stored keys no field maps to, kept by non-strict schemas.
    pub fn extra_data(&self) -> &bson::Document {
        &self.extra
    }

    /// Renders the content keyed by object-world name. Missing values are omitted.
    pub fn dump(&self) -> bson::Document {
        self.fields()
            .filter_map(|(field, value)| field.dump(value).map(|value| (field.name().to_string(), value)))
            .collect()
    }

    /// Renders the content as JSON. Non-JSON BSON types use their extended JSON form.
    pub fn dump_json(&self) -> DocumentStoreResult<serde_json::Value> {
        Ok(serde_json::to_value(Bson::Document(self.dump()))?)
    }
}

impl Tracked for DataProxy {
    fn is_modified(&self) -> bool {
        DataProxy::is_modified(self)
    }

    fn clear_modified(&mut self) {
        DataProxy::clear_modified(self);
    }
}

/// Accumulates the operators of a bulk update.
struct FieldChanges {
    replace_arrays: bool,
    set: bson::Document,
    push: bson::Document,
    unset: bson::Document,
}

impl FieldChanges {
    fn new(replace_arrays: bool) -> Self {
        Self {
            replace_arrays,
            set: bson::Document::new(),
            push: bson::Document::new(),
            unset: bson::Document::new(),
        }
    }

    fn set_value(&mut self, name: String, value: Bson) {
        match value {
            Bson::Array(items) => self.set_list(name, items),
            Bson::Document(entries) => {
                for (key, value) in entries {
                    self.set_value(format!("{name}.{key}"), value);
                }
            }
            value => {
                self.set.insert(name, value);
            }
        }
    }

    fn set_list(&mut self, name: String, mut items: Vec<Bson>) {
        if self.replace_arrays {
            self.set.insert(name, items);
        } else if items.len() == 1 {
            self.push.insert(name, items.remove(0));
        } else if !items.is_empty() {
            self.push.insert(name, doc! { "$each": items });
        }
    }

    fn unset(&mut self, name: String) {
        self.unset.insert(name, "");
    }

    fn into_update(self) -> Option<bson::Document> {
        let mut update = bson::Document::new();

        for (operator, changes) in [("$set", self.set), ("$push", self.push), ("$unset", self.unset)] {
            if !changes.is_empty() {
                update.insert(operator, changes);
            }
        }

        (!update.is_empty()).then_some(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use bson::oid::ObjectId;

    fn user_schema() -> Arc<Schema> {
        let name = Schema::embedded("Name")
            .field(Field::string("first").attribute("f"))
            .field(Field::string("last").attribute("l"))
            .build()
            .unwrap();

        Schema::document("User", "user")
            .field(Field::string("nick").required())
            .field(Field::string("password").required())
            .field(Field::integer("age"))
            .field(Field::embedded("name", &name).attribute("n"))
            .field(Field::list("tags", Field::string("tag")))
            .field(Field::dict("meta"))
            .build()
            .unwrap()
    }

    #[test]
    fn required_fields_are_reported_by_name() {
        let proxy = DataProxy::new(user_schema());
        let err = proxy.required_validate().unwrap_err();
        let messages = err.validation_messages().unwrap();

        assert_eq!(messages.get("nick").unwrap().messages(), ["Missing data for required field."]);
        assert_eq!(messages.get("password").unwrap().messages(), ["Missing data for required field."]);
        assert!(messages.get("age").is_none());
    }

    #[test]
    fn nested_required_errors_are_nested() {
        let name = Schema::embedded("Name")
            .field(Field::string("first").required())
            .build()
            .unwrap();
        let schema = Schema::embedded("Holder")
            .field(Field::embedded("name", &name))
            .build()
            .unwrap();
        let proxy = DataProxy::with_data(schema, [("name", bson::doc! {})]).unwrap();

        let err = proxy.required_errors().unwrap_err();
        assert!(err.get("name").unwrap().get("first").is_some());
    }

    #[test]
    fn failed_load_leaves_proxy_untouched() {
        let mut proxy = DataProxy::with_data(user_schema(), [("nick", "bob")]).unwrap();
        proxy.clear_modified();

        let err = proxy.load([("nick", Bson::from("ann")), ("age", Bson::from("old"))]).unwrap_err();
        assert!(err.validation_messages().unwrap().get("age").is_some());
        assert_eq!(proxy.get("nick").unwrap().as_str(), Some("bob"));
        assert!(!proxy.is_modified());
    }

    #[test]
    fn unknown_input_key_is_a_validation_error() {
        let err = DataProxy::with_data(user_schema(), [("nope", 1)]).unwrap_err();

        assert_eq!(
            err.validation_messages().unwrap().get("nope").unwrap().messages(),
            ["Unknown field."]
        );
    }

    #[test]
    fn load_marks_every_field() {
        let proxy = DataProxy::with_data(user_schema(), [("nick", "bob")]).unwrap();

        assert_eq!(
            proxy.get_modified_fields(),
            ["_id", "meta", "n", "nick", "age", "password", "tags"]
                .into_iter()
                .map(String::from)
                .collect()
        );
    }

    #[test]
    fn set_marks_field_once() {
        let mut proxy = DataProxy::new(user_schema());

        proxy.set("nick", "bob").unwrap();
        proxy.set("nick", "ann").unwrap();

        assert_eq!(proxy.get_modified_fields(), BTreeSet::from(["nick".to_string()]));
    }

    #[test]
    fn set_null_on_non_nullable_is_keyed() {
        let mut proxy = DataProxy::new(user_schema());
        let err = proxy.set("age", FieldValue::Null).unwrap_err();

        assert_eq!(
            err.validation_messages().unwrap().get("age").unwrap().messages(),
            ["Field may not be null."]
        );
        assert!(!proxy.is_modified());
    }

    #[test]
    fn storage_roundtrip_is_clean() {
        let id = ObjectId::new();
        let stored = doc! {
            "_id": id,
            "nick": "bob",
            "password": "secret",
            "n": { "f": "Bob", "l": "Smith" },
            "tags": ["a", "b"],
        };

        let mut proxy = DataProxy::new(user_schema());
        proxy.from_storage(stored.clone()).unwrap();

        assert!(!proxy.is_modified());
        assert_eq!(proxy.to_storage(), stored);
        assert_eq!(proxy.to_storage_update(), None);
    }

    #[test]
    fn strict_schema_rejects_unknown_stored_keys() {
        let mut proxy = DataProxy::new(user_schema());
        let err = proxy.from_storage(doc! { "nick": "bob", "zzz": 1 }).unwrap_err();

        assert_eq!(err.to_string(), r#"User: unknown "zzz" field found in DB."#);
    }

    #[test]
    fn non_strict_schema_keeps_unknown_stored_keys() {
        let schema = Schema::document("Loose", "loose")
            .strict(false)
            .field(Field::string("nick"))
            .build()
            .unwrap();
        let mut proxy = DataProxy::new(schema);
        proxy.from_storage(doc! { "nick": "bob", "zzz": 1 }).unwrap();

        assert_eq!(proxy.extra_data(), &doc! { "zzz": 1 });
        assert_eq!(proxy.to_storage(), doc! { "nick": "bob", "zzz": 1 });
    }

    #[test]
    fn update_payload_sets_and_unsets() {
        let mut proxy = DataProxy::new(user_schema());
        proxy
            .from_storage(doc! { "nick": "bob", "age": 3, "tags": ["a"] })
            .unwrap();

        proxy.set("nick", "ann").unwrap();
        proxy.delete("age").unwrap();
        proxy.list_mut("tags").unwrap().clear();

        assert_eq!(
            proxy.to_storage_update(),
            Some(doc! {
                "$set": { "nick": "ann" },
                "$unset": { "age": "", "tags": "" },
            })
        );
    }

    #[test]
    fn in_place_embedded_edit_is_tracked() {
        let mut proxy = DataProxy::new(user_schema());
        proxy.from_storage(doc! { "n": { "f": "Bob" } }).unwrap();

        proxy.embedded_mut("name").unwrap().set("last", "Smith").unwrap();

        assert!(proxy.is_modified());
        assert_eq!(
            proxy.to_storage_update(),
            Some(doc! { "$set": { "n": { "f": "Bob", "l": "Smith" } } })
        );
    }

    #[test]
    fn bulk_update_pushes_single_append_plainly() {
        let mut proxy = DataProxy::new(user_schema());
        proxy.from_storage(doc! { "tags": ["a"] }).unwrap();

        proxy.list_mut("tags").unwrap().push("b").unwrap();
        assert_eq!(
            proxy.to_storage_update_many(false),
            Some(doc! { "$push": { "tags": "b" } })
        );

        proxy.list_mut("tags").unwrap().push("c").unwrap();
        assert_eq!(
            proxy.to_storage_update_many(false),
            Some(doc! { "$push": { "tags": { "$each": ["b", "c"] } } })
        );
    }

    #[test]
    fn bulk_update_pushes_several_appends_with_each() {
        let mut proxy = DataProxy::new(user_schema());
        proxy.from_storage(doc! { "tags": ["a"] }).unwrap();

        proxy.list_mut("tags").unwrap().extend(["b", "c"]).unwrap();

        assert_eq!(
            proxy.to_storage_update_many(false),
            Some(doc! { "$push": { "tags": { "$each": ["b", "c"] } } })
        );
    }

    // Every element is inspected, not only the first one.
    #[test]
    fn in_place_change_of_a_later_element_is_seen() {
        let comment = Schema::embedded("Comment")
            .field(Field::string("body").attribute("b"))
            .build()
            .unwrap();
        let schema = Schema::document("Post", "post")
            .field(Field::list("comments", Field::embedded("comment", &comment)).attribute("c"))
            .build()
            .unwrap();

        let mut proxy = DataProxy::new(schema);
        proxy
            .from_storage(doc! { "c": [{ "b": "one" }, { "b": "two" }, { "b": "three" }] })
            .unwrap();
        assert!(!proxy.is_modified());

        proxy
            .list_mut("comments")
            .unwrap()
            .embedded_mut(2)
            .unwrap()
            .set("body", "edited")
            .unwrap();

        assert!(proxy.is_modified());
        assert_eq!(proxy.get_modified_fields(), BTreeSet::from(["c".to_string()]));
        assert_eq!(
            proxy.to_storage_update(),
            Some(doc! { "$set": { "c": [{ "b": "one" }, { "b": "two" }, { "b": "edited" }] } })
        );

        proxy.clear_modified();
        assert!(!proxy.is_modified());
        assert_eq!(proxy.to_storage_update(), None);
    }

    #[test]
    fn bulk_update_can_replace_arrays() {
        let mut proxy = DataProxy::new(user_schema());
        proxy.update([("tags", vec![Bson::from("x"), Bson::from("y")])]).unwrap();

        assert_eq!(
            proxy.to_storage_update_many(true),
            Some(doc! { "$set": { "tags": ["x", "y"] } })
        );
    }

    #[test]
    fn bulk_update_flattens_maps() {
        let mut proxy = DataProxy::new(user_schema());
        proxy
            .update([
                ("meta", FieldValue::from(doc! { "a": 1, "b": { "c": 2 } })),
                ("name", FieldValue::from(doc! { "first": "Ann" })),
            ])
            .unwrap();

        assert_eq!(
            proxy.to_storage_update_many(false),
            Some(doc! { "$set": { "meta.a": 1, "meta.b.c": 2, "n.f": "Ann" } })
        );
    }

    #[test]
    fn clear_modified_is_idempotent() {
        let mut proxy = DataProxy::with_data(user_schema(), [("nick", "bob")]).unwrap();

        proxy.clear_modified();
        assert!(!proxy.is_modified());
        proxy.clear_modified();
        assert!(!proxy.is_modified());
        assert!(proxy.get_modified_fields().is_empty());
    }

    #[test]
    fn dump_uses_object_names() {
        let proxy = DataProxy::with_data(
            user_schema(),
            [("nick", FieldValue::from("bob")), ("name", FieldValue::from(doc! { "first": "Bob" }))],
        )
        .unwrap();

        assert_eq!(
            proxy.dump(),
            doc! { "nick": "bob", "name": { "first": "Bob" }, "tags": [], "meta": {} }
        );
        assert_eq!(
            proxy.dump_json().unwrap(),
            serde_json::json!({ "nick": "bob", "name": { "first": "Bob" }, "tags": [], "meta": {} })
        );
    }
}
