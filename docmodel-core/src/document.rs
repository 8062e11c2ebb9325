//! Documents and their persistence lifecycle.
//!
//! A [`Document`] pairs a [`DataProxy`] with a lifecycle state and drives the
//! commit pipeline: hooks, required-field validation, io validation, the storage
//! command, and the mapping of storage failures back to field errors.
//!
//! # Lifecycle
//!
//! ```text
//! NotCreated --commit--> Created --delete--> Deleted
//!                          |  ^
//!                          +--+ commit / reload
//! ```
//!
//! A deleted document is terminal: committing, deleting or reloading it fails
//! with [`DocumentStoreError::NotCreated`].
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{document::{CommitOptions, Document}, bson::doc};
//!
//! let mut user = Document::with_data(user_schema, doc! { "nick": "bob", "password": "secret" })?;
//! user.commit(&store, CommitOptions::default()).await?;
//!
//! user.set("nick", "robert")?;
//! user.commit(&store, CommitOptions::default()).await?;
//! ```

use bson::Bson;
use std::sync::Arc;
use tracing::debug;

use crate::{
    backend::{DeleteResult, InsertOneResult, StoreBackend, UpdateResult},
    error::{DocumentStoreError, DocumentStoreResult, ErrorMessages},
    field::MessageKey,
    proxy::DataProxy,
    query_mapper::map_document,
    reference::Reference,
    schema::{PK_STORAGE_NAME, Schema},
    store::DocumentStore,
    validate::{IoContext, validate_proxy},
    value::FieldValue,
};

/// Callbacks run around the storage commands of a schema.
///
/// Pre-hooks may mutate the data (insert and update) or contribute an extra
/// filter in object-world names (update and delete) that the record must also
/// match. An error returned by a pre-hook aborts the operation before anything
/// is sent to the store.
#[allow(unused_variables)]
pub trait DocumentHooks: Send + Sync {
    fn pre_insert(&self, data: &mut DataProxy) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn pre_update(&self, data: &mut DataProxy) -> DocumentStoreResult<Option<bson::Document>> {
        Ok(None)
    }

    fn pre_delete(&self, data: &DataProxy) -> DocumentStoreResult<Option<bson::Document>> {
        Ok(None)
    }

    fn post_insert(&self, data: &DataProxy, result: &InsertOneResult) {}

    fn post_update(&self, data: &DataProxy, result: &UpdateResult) {}

    fn post_delete(&self, data: &DataProxy, result: &DeleteResult) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl DocumentHooks for NoHooks {}

/// Where a document stands relative to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// Never written.
    NotCreated,
    /// Written and not deleted.
    Created,
    /// Deleted through this instance.
    Deleted,
}

/// Options of [`Document::commit`].
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Run io validation on every field instead of only the modified ones.
    /// Inserts always validate every field.
    pub io_validate_all: bool,
    /// Extra filter, in object-world names, the stored record must match for an
    /// update to apply. Only valid on created documents.
    pub conditions: Option<bson::Document>,
    /// Replace the whole record instead of sending a partial update. Commits
    /// even when nothing was modified.
    pub replace: bool,
}

impl CommitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn io_validate_all(mut self, io_validate_all: bool) -> Self {
        self.io_validate_all = io_validate_all;
        self
    }

    pub fn conditions(mut self, conditions: bson::Document) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }
}

/// The outcome of a commit that reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitResult {
    Inserted(InsertOneResult),
    Updated(UpdateResult),
    Replaced(UpdateResult),
}

/// A top-level document bound to a document schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    data: DataProxy,
    state: DocumentState,
}

impl Document {
    /// Creates an unsaved document holding default values.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidUsage`] for embedded schemas.
    pub fn new(schema: Arc<Schema>) -> DocumentStoreResult<Self> {
        schema.require_collection()?;

        Ok(Self {
            data: DataProxy::new(schema),
            state: DocumentState::NotCreated,
        })
    }

    /// Creates an unsaved document from object-world data.
    pub fn with_data<I, K, V>(schema: Arc<Schema>, input: I) -> DocumentStoreResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let mut document = Self::new(schema)?;
        document.data.load(input)?;
        Ok(document)
    }

    /// Rebuilds a created document from a stored record.
    pub fn build_from_storage(schema: Arc<Schema>, stored: bson::Document) -> DocumentStoreResult<Self> {
        let mut document = Self::new(schema)?;
        document.data.from_storage(stored)?;
        document.state = DocumentState::Created;
        Ok(document)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.data.schema()
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn is_created(&self) -> bool {
        self.state == DocumentState::Created
    }

    /// The primary key, once one is set.
    pub fn pk(&self) -> Option<&Bson> {
        let idx = self.schema().pk_index()?;

        match self.data.fields().nth(idx) {
            Some((_, FieldValue::Scalar(pk))) => Some(pk),
            _ => None,
        }
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

    /// Loads the document referenced by field `name`.
    ///
    /// A missing target is reported with the field's not-found message.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidUsage`] if the field holds no reference
    /// - the errors of [`Reference::fetch`]
    pub async fn fetch_reference<B: StoreBackend>(
        &self,
        name: &str,
        store: &DocumentStore<B>,
    ) -> DocumentStoreResult<Document> {
        let field = self.schema().field(name).ok_or_else(|| {
            DocumentStoreError::InvalidUsage(format!("{} has no field named `{name}`", self.schema().name()))
        })?;
        let reference = self.data.get(name)?.as_reference().ok_or_else(|| {
            DocumentStoreError::InvalidUsage(format!("field `{name}` does not hold a reference"))
        })?;

        reference.fetch_for(field, store).await
    }

    pub fn delete_field(&mut self, name: &str) -> DocumentStoreResult<()> {
        self.data.delete(name)
    }

    /// Merges object-world data, marking each given field.
    pub fn update<I, K, V>(&mut self, input: I) -> DocumentStoreResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.data.update(input)
    }

    pub fn is_modified(&self) -> bool {
        self.data.is_modified()
    }

    pub fn clear_modified(&mut self) {
        self.data.clear_modified();
    }

    pub fn to_storage(&self) -> bson::Document {
        self.data.to_storage()
    }

    pub fn dump(&self) -> bson::Document {
        self.data.dump()
    }

    /// A reference to this document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotCreated`] if the document has no primary key yet.
    pub fn to_reference(&self) -> DocumentStoreResult<Reference> {
        let pk = self.created_pk()?;
        let schema = self.schema();

        Ok(Reference::new(
            schema.name(),
            schema.collection().map(str::to_string),
            pk,
        ))
    }

    pub fn required_validate(&self) -> DocumentStoreResult<()> {
        self.data.required_validate()
    }

    /// Runs io validation against the store.
    ///
    /// When `validate_all` is false only the modified fields are checked.
    pub async fn io_validate<B: StoreBackend>(
        &self,
        store: &DocumentStore<B>,
        validate_all: bool,
    ) -> DocumentStoreResult<()> {
        let ctx = IoContext {
            backend: store.backend(),
            registry: store.registry(),
        };

        if validate_all {
            validate_proxy(ctx, &self.data, None).await
        } else {
            let modified = self.data.get_modified_fields();
            validate_proxy(ctx, &self.data, Some(&modified)).await
        }
    }

    /// Persists the document.
    ///
    /// A document never written is inserted with its full content. A created
    /// document sends a partial update of its modified fields, or its full
    /// content when [`CommitOptions::replace`] is set. A created document with
    /// nothing modified is left alone and `Ok(None)` is returned.
    ///
    /// Modification tracking is cleared only after the store accepted the
    /// command.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::Validation`] for missing required fields, failed
    ///   io validation, or a violated unique index (keyed by field name)
    /// - [`DocumentStoreError::Update`] if the update matched no record, e.g.
    ///   because the conditions no longer hold
    /// - [`DocumentStoreError::InvalidUsage`] if conditions are given for an
    ///   unsaved document
    /// - [`DocumentStoreError::NotCreated`] for a deleted document
    pub async fn commit<B: StoreBackend>(
        &mut self,
        store: &DocumentStore<B>,
        options: CommitOptions,
    ) -> DocumentStoreResult<Option<CommitResult>> {
        let result = match self.state {
            DocumentState::Deleted => {
                return Err(DocumentStoreError::NotCreated(
                    "Document has been deleted".to_string(),
                ));
            }
            DocumentState::Created => self.commit_update(store, &options).await,
            DocumentState::NotCreated => {
                if options.conditions.is_some() {
                    return Err(DocumentStoreError::InvalidUsage(
                        "Document must already exist in database to use `conditions`.".to_string(),
                    ));
                }

                self.commit_insert(store).await.map(Some)
            }
        };

        let result = result.map_err(|err| self.translate_duplicate_key(err))?;

        if result.is_some() {
            self.data.clear_modified();
        }

        Ok(result)
    }

    async fn commit_insert<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<CommitResult> {
        let schema = self.schema().clone();
        let collection = schema.require_collection()?;

        schema.hooks().pre_insert(&mut self.data)?;
        self.data.required_validate()?;
        self.io_validate(store, true).await?;

        let payload = self.data.to_storage();
        debug!(document = %schema.name(), collection, "inserting document");

        let result = store.backend().insert_one(collection, payload).await?;

        if let Some(idx) = schema.pk_index() {
            self.data
                .set_trusted(idx, FieldValue::from(result.inserted_id.clone()));
        }

        self.state = DocumentState::Created;
        schema.hooks().post_insert(&self.data, &result);
        Ok(CommitResult::Inserted(result))
    }

    async fn commit_update<B: StoreBackend>(
        &mut self,
        store: &DocumentStore<B>,
        options: &CommitOptions,
    ) -> DocumentStoreResult<Option<CommitResult>> {
        if !options.replace && !self.data.is_modified() {
            debug!(document = %self.schema().name(), "nothing modified, skipping commit");
            return Ok(None);
        }

        let schema = self.schema().clone();
        let collection = schema.require_collection()?;

        let mut filter = match &options.conditions {
            Some(conditions) => map_document(conditions, &schema),
            None => bson::Document::new(),
        };
        filter.insert(PK_STORAGE_NAME, self.created_pk()?.clone());

        if let Some(extra) = schema.hooks().pre_update(&mut self.data)? {
            for (key, value) in map_document(&extra, &schema) {
                filter.insert(key, value);
            }
        }

        self.data.required_validate()?;
        self.io_validate(store, options.io_validate_all).await?;

        let result = if options.replace {
            let payload = self.data.to_storage();
            debug!(document = %schema.name(), collection, "replacing document");
            store.backend().replace_one(collection, filter, payload).await?
        } else {
            let Some(payload) = self.data.to_storage_update() else {
                return Ok(None);
            };
            debug!(document = %schema.name(), collection, "updating document");
            store.backend().update_one(collection, filter, payload).await?
        };

        if result.matched_count != 1 {
            return Err(DocumentStoreError::Update {
                collection: collection.to_string(),
                matched: result.matched_count,
            });
        }

        schema.hooks().post_update(&self.data, &result);

        Ok(Some(if options.replace {
            CommitResult::Replaced(result)
        } else {
            CommitResult::Updated(result)
        }))
    }

    /// Removes the document from the store.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::NotCreated`] if the document was never written or
    ///   is already deleted
    /// - [`DocumentStoreError::Delete`] if no record matched, e.g. because the
    ///   conditions no longer hold
    pub async fn delete<B: StoreBackend>(
        &mut self,
        store: &DocumentStore<B>,
        conditions: Option<bson::Document>,
    ) -> DocumentStoreResult<DeleteResult> {
        let pk = self.created_pk()?.clone();
        let schema = self.schema().clone();
        let collection = schema.require_collection()?;

        let mut filter = match conditions {
            Some(conditions) => map_document(&conditions, &schema),
            None => bson::Document::new(),
        };
        filter.insert(PK_STORAGE_NAME, pk);

        if let Some(extra) = schema.hooks().pre_delete(&self.data)? {
            for (key, value) in map_document(&extra, &schema) {
                filter.insert(key, value);
            }
        }

        debug!(document = %schema.name(), collection, "deleting document");
        let result = store.backend().delete_one(collection, filter).await?;

        if result.deleted_count != 1 {
            return Err(DocumentStoreError::Delete {
                collection: collection.to_string(),
                deleted: result.deleted_count,
            });
        }

        self.state = DocumentState::Deleted;
        schema.hooks().post_delete(&self.data, &result);
        Ok(result)
    }

    /// Replaces the content with the stored record, discarding local changes.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotCreated`] if the document was never
    /// written, is deleted, or no longer exists in the store.
    pub async fn reload<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()> {
        let pk = self.created_pk()?.clone();
        let schema = self.schema().clone();
        let collection = schema.require_collection()?;

        let mut filter = bson::Document::new();
        filter.insert(PK_STORAGE_NAME, pk);

        let stored = store
            .backend()
            .find_one(collection, filter, None)
            .await?
            .ok_or_else(|| DocumentStoreError::NotCreated("Document doesn't exists in database".to_string()))?;

        let mut data = DataProxy::new(schema);
        data.from_storage(stored)?;
        self.data = data;
        Ok(())
    }

    fn created_pk(&self) -> DocumentStoreResult<&Bson> {
        if self.state != DocumentState::Created {
            return Err(DocumentStoreError::NotCreated(
                "Document doesn't exists in database".to_string(),
            ));
        }

        self.pk()
            .ok_or_else(|| DocumentStoreError::NotCreated("Document has no primary key".to_string()))
    }

    /// Turns a unique-index violation into a validation error on the fields of
    /// the index. Violations on keys the schema does not know are returned as is.
    fn translate_duplicate_key(&self, err: DocumentStoreError) -> DocumentStoreError {
        let (key_pattern, message) = match err {
            DocumentStoreError::DuplicateKey { key_pattern, message } => (key_pattern, message),
            other => return other,
        };

        let mut keys = key_pattern.clone();
        keys.sort();

        let fields: Option<Vec<_>> = keys
            .iter()
            .map(|key| self.schema().field_by_storage(key))
            .collect();

        let fields = match fields {
            Some(fields) if !fields.is_empty() => fields,
            _ => return DocumentStoreError::DuplicateKey { key_pattern, message },
        };

        debug!(document = %self.schema().name(), keys = ?keys, "unique index violated");

        let errors = if let [field] = fields.as_slice() {
            ErrorMessages::field(field.name(), ErrorMessages::message(field.message(MessageKey::Unique)))
        } else {
            let names: Vec<&str> = fields.iter().map(|field| field.name()).collect();
            let mut errors = ErrorMessages::Fields(Default::default());

            for field in &fields {
                let message = field
                    .message(MessageKey::UniqueCompound)
                    .replace("{fields}", &format!("{names:?}"));
                errors.merge(ErrorMessages::field(field.name(), ErrorMessages::message(message)));
            }

            errors
        };

        DocumentStoreError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn user_schema() -> Arc<Schema> {
        Schema::document("User", "user")
            .field(Field::string("nick").required().unique())
            .field(Field::string("first"))
            .field(Field::string("last"))
            .unique_together(["first", "last"])
            .build()
            .unwrap()
    }

    #[test]
    fn embedded_schema_cannot_back_a_document() {
        let schema = Schema::embedded("Name").build().unwrap();

        assert!(matches!(Document::new(schema), Err(DocumentStoreError::InvalidUsage(_))));
    }

    #[test]
    fn unsaved_document_has_no_reference() {
        let document = Document::with_data(user_schema(), [("nick", "bob")]).unwrap();

        assert!(matches!(document.to_reference(), Err(DocumentStoreError::NotCreated(_))));
        assert_eq!(document.pk(), None);
    }

    #[test]
    fn duplicate_key_on_single_field_is_keyed_by_name() {
        let document = Document::new(user_schema()).unwrap();
        let err = document.translate_duplicate_key(DocumentStoreError::DuplicateKey {
            key_pattern: vec!["nick".to_string()],
            message: "E11000".to_string(),
        });

        assert_eq!(
            err.validation_messages().unwrap(),
            &ErrorMessages::field("nick", ErrorMessages::message("Field value must be unique."))
        );
    }

    #[test]
    fn duplicate_key_on_compound_index_names_every_field() {
        let document = Document::new(user_schema()).unwrap();
        let err = document.translate_duplicate_key(DocumentStoreError::DuplicateKey {
            key_pattern: vec!["last".to_string(), "first".to_string()],
            message: "E11000".to_string(),
        });

        let messages = err.validation_messages().unwrap();
        let expected = r#"Values of fields ["first", "last"] must be unique together."#;
        assert_eq!(messages.get("first").unwrap().messages(), [expected]);
        assert_eq!(messages.get("last").unwrap().messages(), [expected]);
    }

    #[test]
    fn duplicate_key_on_unknown_index_is_kept() {
        let document = Document::new(user_schema()).unwrap();
        let err = document.translate_duplicate_key(DocumentStoreError::DuplicateKey {
            key_pattern: vec!["zzz".to_string()],
            message: "E11000".to_string(),
        });

        assert!(matches!(err, DocumentStoreError::DuplicateKey { .. }));
    }
}
