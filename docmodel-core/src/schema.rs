//! Schemas and the schema registry.
//!
//! A [`Schema`] is the frozen, ordered set of fields of a document or embedded
//! document, together with its storage settings (collection, strictness,
//! indexes, hooks). Schemas are built once with [`SchemaBuilder`] and shared as
//! `Arc<Schema>`.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{field::Field, schema::Schema};
//!
//! let user = Schema::document("User", "user")
//!     .field(Field::string("nick").required().unique())
//!     .field(Field::string("password").required())
//!     .build()?;
//!
//! // An `id` field stored as `_id` is added automatically.
//! assert_eq!(user.pk_field().unwrap().storage_name(), "_id");
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use crate::{
    backend::IndexModel,
    document::{DocumentHooks, NoHooks},
    error::{DocumentStoreError, DocumentStoreResult},
    field::{DefaultValue, Field, FieldKind},
    value::FieldValue,
};

/// Storage name of the primary key of every document schema.
pub const PK_STORAGE_NAME: &str = "_id";

/// The field set and storage settings of a document or embedded document.
pub struct Schema {
    name: String,
    collection: Option<String>,
    strict: bool,
    fields: Vec<Arc<Field>>,
    by_name: HashMap<String, usize>,
    by_storage: HashMap<String, usize>,
    pk: Option<usize>,
    indexes: Vec<IndexModel>,
    hooks: Arc<dyn DocumentHooks>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("strict", &self.strict)
            .field("fields", &self.fields)
            .field("indexes", &self.indexes)
            .finish_non_exhaustive()
    }
}

impl Schema {
    /// Starts a schema for top-level documents stored in `collection`.
    pub fn document(name: impl Into<String>, collection: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name.into(), Some(collection.into()))
    }

    /// Starts a schema for documents embedded inside other documents.
    pub fn embedded(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name.into(), None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection of a document schema, `None` for embedded schemas.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Whether unknown stored keys are rejected (`true`) or preserved (`false`).
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    /// Looks up a field by object-world name.
    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.by_name.get(name).map(|idx| &self.fields[*idx])
    }

    /// Looks up a field by storage name.
    pub fn field_by_storage(&self, storage_name: &str) -> Option<&Arc<Field>> {
        self.by_storage.get(storage_name).map(|idx| &self.fields[*idx])
    }

    pub(crate) fn field_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn storage_index(&self, storage_name: &str) -> Option<usize> {
        self.by_storage.get(storage_name).copied()
    }

    /// The primary-key field of a document schema.
    pub fn pk_field(&self) -> Option<&Arc<Field>> {
        self.pk.map(|idx| &self.fields[idx])
    }

    pub(crate) fn pk_index(&self) -> Option<usize> {
        self.pk
    }

    pub fn indexes(&self) -> &[IndexModel] {
        &self.indexes
    }

    pub fn hooks(&self) -> &Arc<dyn DocumentHooks> {
        &self.hooks
    }

    pub fn is_document(&self) -> bool {
        self.collection.is_some()
    }

    pub(crate) fn require_collection(&self) -> DocumentStoreResult<&str> {
        self.collection.as_deref().ok_or_else(|| {
            DocumentStoreError::InvalidUsage(format!(
                "`{}` is an embedded schema and has no collection",
                self.name
            ))
        })
    }
}

/// Builder for [`Schema`].
pub struct SchemaBuilder {
    name: String,
    collection: Option<String>,
    strict: bool,
    fields: Vec<Field>,
    unique_together: Vec<Vec<String>>,
    indexes: Vec<IndexModel>,
    hooks: Option<Arc<dyn DocumentHooks>>,
}

impl SchemaBuilder {
    fn new(name: String, collection: Option<String>) -> Self {
        Self {
            name,
            collection,
            strict: true,
            fields: Vec::new(),
            unique_together: Vec::new(),
            indexes: Vec::new(),
            hooks: None,
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Sets whether unknown stored keys are rejected. Schemas are strict by default.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Declares a compound unique index over the given object-world field names.
    pub fn unique_together<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_together
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Declares an index over storage names.
    pub fn index(mut self, index: IndexModel) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn hooks(mut self, hooks: impl DocumentHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Freezes the schema.
    ///
    /// Document schemas without a field stored as `_id` get an `id` object-id
    /// field prepended. Unique fields and `unique_together` groups become
    /// unique indexes.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] when two fields share an
    /// object-world or storage name, when a fixed default is rejected by its
    /// field, or when a compound index names an unknown field.
    pub fn build(self) -> DocumentStoreResult<Arc<Schema>> {
        let mut fields = self.fields;

        if self.collection.is_some()
            && !fields.iter().any(|field| field.storage_name() == PK_STORAGE_NAME)
        {
            fields.insert(0, Field::object_id("id").attribute(PK_STORAGE_NAME));
        }

        let mut by_name = HashMap::new();
        let mut by_storage = HashMap::new();

        for (idx, field) in fields.iter().enumerate() {
            if by_name.insert(field.name().to_string(), idx).is_some() {
                return Err(DocumentStoreError::Initialization(format!(
                    "{}: field `{}` declared twice",
                    self.name,
                    field.name()
                )));
            }

            if by_storage.insert(field.storage_name().to_string(), idx).is_some() {
                return Err(DocumentStoreError::Initialization(format!(
                    "{}: storage name `{}` used by more than one field",
                    self.name,
                    field.storage_name()
                )));
            }

            if let Some(DefaultValue::Value(value)) = field.default_spec() {
                field.deserialize(FieldValue::from(value.clone())).map_err(|errors| {
                    DocumentStoreError::Initialization(format!(
                        "{}: invalid default for `{}`: {errors}",
                        self.name,
                        field.name()
                    ))
                })?;
            }
        }

        let pk = if self.collection.is_some() {
            by_storage.get(PK_STORAGE_NAME).copied()
        } else {
            None
        };

        let mut indexes: Vec<IndexModel> = fields
            .iter()
            .filter(|field| field.is_unique())
            .map(|field| IndexModel::unique([field.storage_name()]))
            .collect();

        for group in &self.unique_together {
            let keys = group
                .iter()
                .map(|name| {
                    by_name
                        .get(name)
                        .map(|idx: &usize| fields[*idx].storage_name().to_string())
                        .ok_or_else(|| {
                            DocumentStoreError::Initialization(format!(
                                "{}: unique index on unknown field `{name}`",
                                self.name
                            ))
                        })
                })
                .collect::<DocumentStoreResult<Vec<_>>>()?;

            indexes.push(IndexModel::unique(keys));
        }

        indexes.extend(self.indexes);

        let mut seen = HashSet::new();
        indexes.retain(|index| seen.insert(index.keys.clone()));

        Ok(Arc::new(Schema {
            name: self.name,
            collection: self.collection,
            strict: self.strict,
            fields: fields.into_iter().map(Arc::new).collect(),
            by_name,
            by_storage,
            pk,
            indexes,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoHooks)),
        }))
    }
}

/// A type that owns a schema, usually through a `LazyLock`.
///
/// # Example
///
/// ```ignore
/// use std::sync::{Arc, LazyLock};
/// use docmodel::{field::Field, schema::{Model, Schema}};
///
/// struct User;
///
/// static USER: LazyLock<Arc<Schema>> = LazyLock::new(|| {
///     Schema::document("User", "user")
///         .field(Field::string("nick").required())
///         .build()
///         .expect("valid schema")
/// });
///
/// impl Model for User {
///     fn schema() -> Arc<Schema> {
///         USER.clone()
///     }
/// }
/// ```
pub trait Model {
    fn schema() -> Arc<Schema>;
}

/// Maps schema names to schemas, used to resolve references by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema along with every embedded schema it reaches.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] if a different schema is
    /// already registered under the same name.
    pub fn register(&mut self, schema: Arc<Schema>) -> DocumentStoreResult<()> {
        if let Some(existing) = self.schemas.get(schema.name()) {
            if Arc::ptr_eq(existing, &schema) {
                return Ok(());
            }

            return Err(DocumentStoreError::Initialization(format!(
                "a schema named `{}` is already registered",
                schema.name()
            )));
        }

        self.schemas.insert(schema.name().to_string(), schema.clone());

        for field in schema.fields() {
            if let Some(nested) = field.nested_schema() {
                self.register(nested.clone())?;
            }

            if let FieldKind::Dict(Some(value_field)) = field.kind() {
                if let Some(nested) = value_field.nested_schema() {
                    self.register(nested.clone())?;
                }
            }
        }

        Ok(())
    }

    /// Builder-style [`SchemaRegistry::register`].
    pub fn with(mut self, schema: Arc<Schema>) -> DocumentStoreResult<Self> {
        self.register(schema)?;
        Ok(self)
    }

    /// Looks up a schema by name.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotRegistered`] for unknown names.
    pub fn get(&self, name: &str) -> DocumentStoreResult<&Arc<Schema>> {
        self.schemas
            .get(name)
            .ok_or_else(|| DocumentStoreError::NotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Iterates over the registered document schemas, skipping embedded ones.
    pub fn documents(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values().filter(|schema| schema.is_document())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_schema_gets_an_id_field() {
        let schema = Schema::document("User", "user")
            .field(Field::string("nick"))
            .build()
            .unwrap();

        assert_eq!(schema.fields()[0].name(), "id");
        assert_eq!(schema.pk_field().unwrap().storage_name(), "_id");
        assert!(schema.field_by_storage("_id").is_some());
    }

    #[test]
    fn embedded_schema_has_no_pk() {
        let schema = Schema::embedded("Name").field(Field::string("first")).build().unwrap();

        assert!(schema.pk_field().is_none());
        assert!(schema.require_collection().is_err());
    }

    #[test]
    fn duplicate_storage_names_are_rejected() {
        let result = Schema::document("User", "user")
            .field(Field::string("name").attribute("n"))
            .field(Field::string("nick").attribute("n"))
            .build();

        assert!(matches!(result, Err(DocumentStoreError::Initialization(_))));
    }

    #[test]
    fn unique_fields_become_indexes() {
        let schema = Schema::document("User", "user")
            .field(Field::string("nick").unique().attribute("k"))
            .field(Field::string("first"))
            .field(Field::string("last"))
            .unique_together(["first", "last"])
            .build()
            .unwrap();

        let keys: Vec<_> = schema.indexes().iter().map(|index| index.keys.clone()).collect();
        assert_eq!(keys, vec![vec!["k".to_string()], vec!["first".to_string(), "last".to_string()]]);
    }

    #[test]
    fn registry_reaches_embedded_schemas() {
        let name = Schema::embedded("Name").field(Field::string("first")).build().unwrap();
        let user = Schema::document("User", "user")
            .field(Field::embedded("name", &name))
            .build()
            .unwrap();

        let registry = SchemaRegistry::new().with(user).unwrap();

        assert!(registry.contains("Name"));
        assert_eq!(registry.documents().count(), 1);
        assert!(matches!(registry.get("Nope"), Err(DocumentStoreError::NotRegistered(_))));
    }
}
