//! Field descriptors.
//!
//! A [`Field`] describes one attribute of a schema and converts its values
//! between the three worlds the crate deals with:
//!
//! - **input**: loosely typed values handed in by callers, checked and normalized
//!   by [`Field::deserialize`]
//! - **object**: the in-memory [`FieldValue`] held by a data proxy
//! - **storage**: the BSON written to and read from the backend, produced by
//!   [`Field::to_storage`] and decoded by [`Field::from_storage`]
//!
//! Fields are built with a small builder API and frozen into a
//! [`Schema`](crate::schema::Schema).
//!
//! # Example
//!
//! ```ignore
//! use docmodel::field::Field;
//!
//! let nick = Field::string("nick").required().unique();
//! let name = Field::string("name").attribute("n");
//! let tags = Field::list("tags", Field::string("tag"));
//! ```

use bson::{Bson, doc, oid::ObjectId, spec::BinarySubtype};
use chrono::{DateTime as ChronoDateTime, Utc};
use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult, ErrorCollector, ErrorMessages},
    reference::Reference,
    schema::Schema,
    validate::IoValidator,
    value::{EmbeddedDocument, FieldValue, TrackedDict, TrackedList},
};

/// A synchronous validator run after a value is deserialized.
pub(crate) const NOT_FOUND_MESSAGE: &str = "Reference not found for document {document}.";

pub type Validator = Arc<dyn Fn(&FieldValue) -> Result<(), ErrorMessages> + Send + Sync>;

/// Where a field takes its value from when none was provided.
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed input value.
    Value(Bson),
    /// A factory called each time a default is needed.
    Factory(Arc<dyn Fn() -> Bson + Send + Sync>),
}

/// Keys of the overridable error messages of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageKey {
    /// A required field has no value.
    Required,
    /// A non-nullable field was given null.
    Null,
    /// The value has the wrong type or format.
    Invalid,
    /// A single-field uniqueness constraint was violated.
    Unique,
    /// A compound uniqueness constraint was violated. `{fields}` is replaced by the field names.
    UniqueCompound,
    /// A referenced document does not exist. `{document}` is replaced by the schema name.
    NotFound,
}

/// The kind of value a field holds.
#[derive(Clone)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    /// Stored as a BSON datetime. RFC 3339 strings are accepted as input.
    DateTime,
    /// Stored as a BSON object id. 24-character hex strings are accepted as input.
    ObjectId,
    /// Stored as binary subtype 4. Hyphenated strings are accepted as input.
    Uuid,
    /// Any BSON value, stored as is.
    Raw,
    /// A list of values of the inner field.
    List(Arc<Field>),
    /// A string-keyed map, optionally typed by a value field.
    Dict(Option<Arc<Field>>),
    /// A nested document of the given schema.
    Embedded(Arc<Schema>),
    /// A reference to a document of a single schema, stored as its primary key.
    Reference {
        document: String,
        collection: Option<String>,
    },
    /// A reference to a document of any schema, stored as `{_id, _cls}`.
    GenericReference,
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::List(inner) => f.debug_tuple("List").field(inner).finish(),
            FieldKind::Dict(value) => f.debug_tuple("Dict").field(value).finish(),
            FieldKind::Embedded(schema) => f.debug_tuple("Embedded").field(&schema.name()).finish(),
            FieldKind::Reference {
                document,
                collection,
            } => f
                .debug_struct("Reference")
                .field("document", document)
                .field("collection", collection)
                .finish(),
            scalar => f.write_str(match scalar {
                FieldKind::String => "String",
                FieldKind::Integer => "Integer",
                FieldKind::Float => "Float",
                FieldKind::Boolean => "Boolean",
                FieldKind::DateTime => "DateTime",
                FieldKind::ObjectId => "ObjectId",
                FieldKind::Uuid => "Uuid",
                FieldKind::Raw => "Raw",
                _ => "GenericReference",
            }),
        }
    }
}

/// Describes one attribute of a schema.
#[derive(Clone)]
pub struct Field {
    name: String,
    attribute: Option<String>,
    kind: FieldKind,
    required: bool,
    allow_none: bool,
    unique: bool,
    default: Option<DefaultValue>,
    validators: Vec<Validator>,
    io_validators: Vec<Arc<dyn IoValidator>>,
    messages: BTreeMap<MessageKey, String>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("attribute", &self.attribute)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("allow_none", &self.allow_none)
            .field("unique", &self.unique)
            .finish_non_exhaustive()
    }
}

impl Field {
    /// Creates a field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            attribute: None,
            kind,
            required: false,
            allow_none: false,
            unique: false,
            default: None,
            validators: Vec::new(),
            io_validators: Vec::new(),
            messages: BTreeMap::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn object_id(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ObjectId)
    }

    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Uuid)
    }

    pub fn raw(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Raw)
    }

    /// A list whose elements are deserialized through `inner`.
    pub fn list(name: impl Into<String>, inner: Field) -> Self {
        Self::new(name, FieldKind::List(Arc::new(inner)))
    }

    /// An untyped string-keyed map.
    pub fn dict(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Dict(None))
    }

    /// A string-keyed map whose values are deserialized through `value`.
    pub fn dict_of(name: impl Into<String>, value: Field) -> Self {
        Self::new(name, FieldKind::Dict(Some(Arc::new(value))))
    }

    pub fn embedded(name: impl Into<String>, schema: &Arc<Schema>) -> Self {
        Self::new(name, FieldKind::Embedded(schema.clone()))
    }

    /// A reference to documents of `schema`.
    pub fn reference(name: impl Into<String>, schema: &Arc<Schema>) -> Self {
        Self::new(
            name,
            FieldKind::Reference {
                document: schema.name().to_string(),
                collection: schema.collection().map(str::to_string),
            },
        )
    }

    /// A reference to documents of a schema known only by name, resolved through
    /// the registry when dereferenced.
    pub fn reference_to(name: impl Into<String>, document: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Reference {
                document: document.into(),
                collection: None,
            },
        )
    }

    pub fn generic_reference(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::GenericReference)
    }

    /// Stores the field under `attribute` instead of its object-world name.
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn allow_none(mut self) -> Self {
        self.allow_none = true;
        self
    }

    /// Declares a single-field unique index.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Bson + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    /// Adds a validator run on every deserialized, non-null value.
    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&FieldValue) -> Result<(), ErrorMessages> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Adds a validator run against the store before the document is committed.
    pub fn io_validate(mut self, validator: impl IoValidator + 'static) -> Self {
        self.io_validators.push(Arc::new(validator));
        self
    }

    /// Overrides one of the field's error messages.
    pub fn error_message(mut self, key: MessageKey, message: impl Into<String>) -> Self {
        self.messages.insert(key, message.into());
        self
    }

    /// Object-world name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name under which the value is stored.
    pub fn storage_name(&self) -> &str {
        self.attribute.as_deref().unwrap_or(&self.name)
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn allows_none(&self) -> bool {
        self.allow_none
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub(crate) fn default_spec(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn io_validators(&self) -> &[Arc<dyn IoValidator>] {
        &self.io_validators
    }

    /// Returns the schema a nested field set descends into, for embedded fields
    /// and lists of embedded fields.
    pub fn nested_schema(&self) -> Option<&Arc<Schema>> {
        match &self.kind {
            FieldKind::Embedded(schema) => Some(schema),
            FieldKind::List(inner) => inner.nested_schema(),
            _ => None,
        }
    }

    /// Returns the message for `key`, honoring overrides.
    pub fn message(&self, key: MessageKey) -> String {
        if let Some(message) = self.messages.get(&key) {
            return message.clone();
        }

        match key {
            MessageKey::Required => "Missing data for required field.".to_string(),
            MessageKey::Null => "Field may not be null.".to_string(),
            MessageKey::Unique => "Field value must be unique.".to_string(),
            MessageKey::UniqueCompound => "Values of fields {fields} must be unique together.".to_string(),
            MessageKey::NotFound => NOT_FOUND_MESSAGE.to_string(),
            MessageKey::Invalid => match &self.kind {
                FieldKind::String => "Not a valid string.".to_string(),
                FieldKind::Integer => "Not a valid integer.".to_string(),
                FieldKind::Float => "Not a valid number.".to_string(),
                FieldKind::Boolean => "Not a valid boolean.".to_string(),
                FieldKind::DateTime => "Not a valid datetime.".to_string(),
                FieldKind::ObjectId => "Invalid ObjectId.".to_string(),
                FieldKind::Uuid => "Not a valid UUID.".to_string(),
                FieldKind::Raw => "Invalid value.".to_string(),
                FieldKind::List(_) => "Not a valid list.".to_string(),
                FieldKind::Dict(_) => "Not a valid mapping type.".to_string(),
                FieldKind::Embedded(schema) => format!("dict or {} expected.", schema.name()),
                FieldKind::Reference { document, .. } => format!("`{document}` reference expected."),
                FieldKind::GenericReference => "Invalid value for generic reference field.".to_string(),
            },
        }
    }

    /// The message reporting that a document referenced through this field is missing.
    pub fn not_found_message(&self, document: &str) -> String {
        self.message(MessageKey::NotFound).replace("{document}", document)
    }

    fn messages_for(&self, key: MessageKey) -> ErrorMessages {
        ErrorMessages::message(self.message(key))
    }

    /// Checks and normalizes an input value into its object-world form.
    ///
    /// `Missing` passes through untouched. Null is accepted only if the field
    /// allows it. Every other value is converted according to the field kind and
    /// then run through the field's validators.
    ///
    /// # Errors
    ///
    /// Returns the structured messages describing why the value was rejected.
    /// Errors of list elements and dict entries are keyed by index or key.
    pub fn deserialize(&self, value: FieldValue) -> Result<FieldValue, ErrorMessages> {
        let value = match value {
            FieldValue::Missing => return Ok(FieldValue::Missing),
            FieldValue::Null | FieldValue::Scalar(Bson::Null) => {
                return if self.allow_none {
                    Ok(FieldValue::Null)
                } else {
                    Err(self.messages_for(MessageKey::Null))
                };
            }
            value => self.convert(value)?,
        };

        let mut errors: Option<ErrorMessages> = None;

        for validator in &self.validators {
            if let Err(messages) = validator(&value) {
                match errors.as_mut() {
                    Some(errors) => errors.merge(messages),
                    None => errors = Some(messages),
                }
            }
        }

        match errors {
            Some(errors) => Err(errors),
            None => Ok(value),
        }
    }

    fn convert(&self, value: FieldValue) -> Result<FieldValue, ErrorMessages> {
        match &self.kind {
            FieldKind::List(inner) => self.convert_list(inner, value),
            FieldKind::Dict(value_field) => self.convert_dict(value_field.as_ref(), value),
            FieldKind::Embedded(schema) => match value {
                FieldValue::Embedded(embedded) if embedded.schema().name() == schema.name() => {
                    Ok(FieldValue::Embedded(embedded))
                }
                FieldValue::Scalar(Bson::Document(input)) => {
                    EmbeddedDocument::load(schema, input).map(FieldValue::Embedded)
                }
                _ => Err(self.messages_for(MessageKey::Invalid)),
            },
            FieldKind::Reference {
                document,
                collection,
            } => match value {
                FieldValue::Reference(reference) if reference.document() == document => {
                    Ok(FieldValue::Reference(reference))
                }
                FieldValue::Scalar(Bson::String(hex)) => ObjectId::parse_str(&hex)
                    .map(|pk| {
                        FieldValue::Reference(Reference::new(document.clone(), collection.clone(), pk))
                    })
                    .map_err(|_| ErrorMessages::message("Invalid ObjectId.")),
                FieldValue::Scalar(Bson::Document(_) | Bson::Array(_)) => {
                    Err(self.messages_for(MessageKey::Invalid))
                }
                FieldValue::Scalar(pk) => Ok(FieldValue::Reference(Reference::new(
                    document.clone(),
                    collection.clone(),
                    pk,
                ))),
                _ => Err(self.messages_for(MessageKey::Invalid)),
            },
            FieldKind::GenericReference => match value {
                FieldValue::Reference(reference) => Ok(FieldValue::Reference(reference)),
                FieldValue::Scalar(Bson::Document(input)) => Self::convert_generic_reference(input),
                _ => Err(self.messages_for(MessageKey::Invalid)),
            },
            _ => match value {
                FieldValue::Scalar(value) => self.convert_scalar(value).map(FieldValue::Scalar),
                _ => Err(self.messages_for(MessageKey::Invalid)),
            },
        }
    }

    fn convert_scalar(&self, value: Bson) -> Result<Bson, ErrorMessages> {
        let converted = match (&self.kind, value) {
            (FieldKind::Raw, value) => Some(value),
            (FieldKind::String, Bson::String(value)) => Some(Bson::String(value)),
            (FieldKind::Integer, value @ (Bson::Int32(_) | Bson::Int64(_))) => Some(value),
            (FieldKind::Integer, Bson::Double(value))
                if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 =>
            {
                Some(Bson::Int64(value as i64))
            }
            (FieldKind::Integer, Bson::String(value)) => value.trim().parse::<i64>().ok().map(Bson::Int64),
            (FieldKind::Float, Bson::Double(value)) => Some(Bson::Double(value)),
            (FieldKind::Float, Bson::Int32(value)) => Some(Bson::Double(f64::from(value))),
            (FieldKind::Float, Bson::Int64(value)) => Some(Bson::Double(value as f64)),
            (FieldKind::Float, Bson::String(value)) => value.trim().parse::<f64>().ok().map(Bson::Double),
            (FieldKind::Boolean, Bson::Boolean(value)) => Some(Bson::Boolean(value)),
            (FieldKind::Boolean, Bson::Int32(value)) if value == 0 || value == 1 => {
                Some(Bson::Boolean(value == 1))
            }
            (FieldKind::Boolean, Bson::Int64(value)) if value == 0 || value == 1 => {
                Some(Bson::Boolean(value == 1))
            }
            (FieldKind::Boolean, Bson::String(value)) => parse_bool(&value).map(Bson::Boolean),
            (FieldKind::DateTime, value @ Bson::DateTime(_)) => Some(value),
            (FieldKind::DateTime, Bson::String(value)) => ChronoDateTime::parse_from_rfc3339(&value)
                .ok()
                .map(|parsed| Bson::DateTime(bson::DateTime::from_chrono(parsed.with_timezone(&Utc)))),
            (FieldKind::ObjectId, value @ Bson::ObjectId(_)) => Some(value),
            (FieldKind::ObjectId, Bson::String(value)) => ObjectId::parse_str(&value).ok().map(Bson::ObjectId),
            (FieldKind::Uuid, Bson::Binary(binary)) if binary.subtype == BinarySubtype::Uuid => {
                Some(Bson::Binary(binary))
            }
            (FieldKind::Uuid, Bson::String(value)) => uuid::Uuid::parse_str(&value)
                .ok()
                .map(|parsed| Bson::from(bson::Uuid::from(parsed))),
            _ => None,
        };

        converted.ok_or_else(|| self.messages_for(MessageKey::Invalid))
    }

    fn convert_list(&self, inner: &Arc<Field>, value: FieldValue) -> Result<FieldValue, ErrorMessages> {
        let items = match value {
            FieldValue::Scalar(Bson::Array(items)) => items.into_iter().map(FieldValue::from).collect(),
            FieldValue::List(list) => list.into_items(),
            _ => return Err(self.messages_for(MessageKey::Invalid)),
        };

        let mut errors = ErrorCollector::default();
        let mut converted = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            match inner.deserialize(item) {
                Ok(item) => converted.push(item),
                Err(messages) => errors.add(index.to_string(), messages),
            }
        }

        errors.finish()?;
        Ok(FieldValue::List(TrackedList::new(inner.clone(), converted)))
    }

    fn convert_dict(&self, value_field: Option<&Arc<Field>>, value: FieldValue) -> Result<FieldValue, ErrorMessages> {
        let entries: Vec<(String, FieldValue)> = match value {
            FieldValue::Scalar(Bson::Document(input)) => input
                .into_iter()
                .map(|(key, value)| (key, FieldValue::from(value)))
                .collect(),
            FieldValue::Dict(dict) => dict.into_entries().into_iter().collect(),
            _ => return Err(self.messages_for(MessageKey::Invalid)),
        };

        let Some(value_field) = value_field else {
            return Ok(FieldValue::Dict(TrackedDict::new(None, entries.into_iter().collect())));
        };

        let mut errors = ErrorCollector::default();
        let mut converted = BTreeMap::new();

        for (key, value) in entries {
            match value_field.deserialize(value) {
                Ok(value) => {
                    converted.insert(key, value);
                }
                Err(messages) => errors.add(key, messages),
            }
        }

        errors.finish()?;
        Ok(FieldValue::Dict(TrackedDict::new(Some(value_field.clone()), converted)))
    }

    fn convert_generic_reference(input: bson::Document) -> Result<FieldValue, ErrorMessages> {
        if input.len() != 2 || !input.contains_key("id") || !input.contains_key("cls") {
            return Err(ErrorMessages::message(
                "Generic reference must have `id` and `cls` fields.",
            ));
        }

        let document = match input.get("cls") {
            Some(Bson::String(cls)) => cls.clone(),
            _ => return Err(ErrorMessages::message("Invalid `cls` field.")),
        };

        let pk = match input.get("id") {
            Some(Bson::ObjectId(id)) => Bson::ObjectId(*id),
            Some(Bson::String(id)) => ObjectId::parse_str(id)
                .map(Bson::ObjectId)
                .map_err(|_| ErrorMessages::message("Invalid `id` field."))?,
            _ => return Err(ErrorMessages::message("Invalid `id` field.")),
        };

        Ok(FieldValue::Reference(Reference::generic(document, pk)))
    }

    /// Decodes a stored value into its object-world form.
    ///
    /// Stored data is trusted: scalars are kept as they are and composite
    /// values are rebuilt as clean tracked containers.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] when a composite field
    /// holds a value of the wrong shape, or the error of a nested strict schema.
    pub fn from_storage(&self, value: Bson) -> DocumentStoreResult<FieldValue> {
        match (&self.kind, value) {
            (_, Bson::Null) => Ok(FieldValue::Null),
            (FieldKind::List(inner), Bson::Array(items)) => {
                let items = items
                    .into_iter()
                    .map(|item| inner.from_storage(item))
                    .collect::<DocumentStoreResult<Vec<_>>>()?;

                Ok(FieldValue::List(TrackedList::new(inner.clone(), items)))
            }
            (FieldKind::Dict(value_field), Bson::Document(stored)) => {
                let entries = stored
                    .into_iter()
                    .map(|(key, value)| -> DocumentStoreResult<(String, FieldValue)> {
                        let value = match value_field {
                            Some(value_field) => value_field.from_storage(value)?,
                            None => FieldValue::from(value),
                        };
                        Ok((key, value))
                    })
                    .collect::<DocumentStoreResult<BTreeMap<_, _>>>()?;

                Ok(FieldValue::Dict(TrackedDict::new(value_field.clone(), entries)))
            }
            (FieldKind::Embedded(schema), Bson::Document(stored)) => {
                EmbeddedDocument::from_storage(schema, stored).map(FieldValue::Embedded)
            }
            (
                FieldKind::Reference {
                    document,
                    collection,
                },
                pk,
            ) => Ok(FieldValue::Reference(Reference::new(
                document.clone(),
                collection.clone(),
                pk,
            ))),
            (FieldKind::GenericReference, Bson::Document(stored)) => {
                let pk = stored.get("_id").cloned().ok_or_else(|| {
                    DocumentStoreError::InvalidDocument(format!(
                        "field `{}`: generic reference without `_id`",
                        self.storage_name()
                    ))
                })?;
                let document = match stored.get("_cls") {
                    Some(Bson::String(cls)) => cls.clone(),
                    _ => {
                        return Err(DocumentStoreError::InvalidDocument(format!(
                            "field `{}`: generic reference without `_cls`",
                            self.storage_name()
                        )));
                    }
                };

                Ok(FieldValue::Reference(Reference::generic(document, pk)))
            }
            (
                FieldKind::List(_) | FieldKind::Dict(_) | FieldKind::Embedded(_) | FieldKind::GenericReference,
                other,
            ) => Err(DocumentStoreError::InvalidDocument(format!(
                "field `{}`: unexpected stored value {other}",
                self.storage_name()
            ))),
            (_, value) => Ok(FieldValue::Scalar(value)),
        }
    }

    /// Encodes an object-world value for storage.
    ///
    /// Returns `None` when the value must be absent from the stored record:
    /// missing values and empty lists or dicts.
    pub fn to_storage(&self, value: &FieldValue) -> Option<Bson> {
        match value {
            FieldValue::Missing => None,
            FieldValue::Null => Some(Bson::Null),
            FieldValue::Scalar(value) => Some(value.clone()),
            FieldValue::List(list) if list.is_empty() => None,
            FieldValue::List(list) => Some(Bson::Array(
                list.iter()
                    .map(|item| list.field().to_storage(item).unwrap_or(Bson::Null))
                    .collect(),
            )),
            FieldValue::Dict(dict) if dict.is_empty() => None,
            FieldValue::Dict(dict) => Some(Bson::Document(
                dict.iter()
                    .filter_map(|(key, value)| {
                        let stored = match dict.field() {
                            Some(field) => field.to_storage(value),
                            None => value.to_bson(),
                        };
                        stored.map(|stored| (key.clone(), stored))
                    })
                    .collect(),
            )),
            FieldValue::Embedded(embedded) => Some(Bson::Document(embedded.to_storage())),
            FieldValue::Reference(reference) => match self.kind {
                FieldKind::GenericReference => Some(Bson::Document(doc! {
                    "_id": reference.pk().clone(),
                    "_cls": reference.document(),
                })),
                _ => Some(reference.pk().clone()),
            },
        }
    }

    /// Renders an object-world value as plain BSON keyed by object-world names.
    pub fn dump(&self, value: &FieldValue) -> Option<Bson> {
        match value {
            FieldValue::Missing => None,
            FieldValue::Null => Some(Bson::Null),
            FieldValue::Scalar(value) => Some(value.clone()),
            FieldValue::List(list) => Some(Bson::Array(
                list.iter()
                    .map(|item| list.field().dump(item).unwrap_or(Bson::Null))
                    .collect(),
            )),
            FieldValue::Dict(dict) => Some(Bson::Document(
                dict.iter()
                    .filter_map(|(key, value)| {
                        let dumped = match dict.field() {
                            Some(field) => field.dump(value),
                            None => value.to_bson(),
                        };
                        dumped.map(|dumped| (key.clone(), dumped))
                    })
                    .collect(),
            )),
            FieldValue::Embedded(embedded) => Some(Bson::Document(embedded.dump())),
            FieldValue::Reference(reference) => match self.kind {
                FieldKind::GenericReference => Some(Bson::Document(doc! {
                    "id": reference.pk().clone(),
                    "cls": reference.document(),
                })),
                _ => Some(reference.pk().clone()),
            },
        }
    }

    /// Returns the value a field takes when none was provided.
    ///
    /// Lists and dicts without an explicit default start empty. A default the
    /// field itself rejects is logged and treated as missing.
    pub fn default_value(&self) -> FieldValue {
        let input = match &self.default {
            Some(DefaultValue::Value(value)) => value.clone(),
            Some(DefaultValue::Factory(factory)) => factory(),
            None => {
                return match &self.kind {
                    FieldKind::List(inner) => FieldValue::List(TrackedList::new(inner.clone(), Vec::new())),
                    FieldKind::Dict(value_field) => {
                        FieldValue::Dict(TrackedDict::new(value_field.clone(), BTreeMap::new()))
                    }
                    _ => FieldValue::Missing,
                };
            }
        };

        match self.deserialize(FieldValue::from(input)) {
            Ok(value) => value,
            Err(errors) => {
                tracing::warn!(field = %self.name, %errors, "default value rejected by its field");
                FieldValue::Missing
            }
        }
    }

    /// Checks required fields inside a present composite value.
    ///
    /// The presence of this field's own value is checked by the enclosing proxy.
    pub fn required_validate(&self, value: &FieldValue) -> Result<(), ErrorMessages> {
        match (&self.kind, value) {
            (FieldKind::List(inner), FieldValue::List(list)) => {
                let mut errors = ErrorCollector::default();

                for (index, item) in list.iter().enumerate() {
                    if let Err(messages) = inner.required_validate(item) {
                        errors.add(index.to_string(), messages);
                    }
                }

                errors.finish()
            }
            (FieldKind::Dict(Some(value_field)), FieldValue::Dict(dict)) => {
                let mut errors = ErrorCollector::default();

                for (key, item) in dict.iter() {
                    if let Err(messages) = value_field.required_validate(item) {
                        errors.add(key.clone(), messages);
                    }
                }

                errors.finish()
            }
            (FieldKind::Embedded(_), FieldValue::Embedded(embedded)) => embedded.required_errors(),
            _ => Ok(()),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_rejects_other_types() {
        let field = Field::string("nick");

        assert_eq!(
            field.deserialize(FieldValue::from(12)).unwrap_err(),
            ErrorMessages::message("Not a valid string.")
        );
        assert_eq!(field.deserialize("bob".into()).unwrap(), FieldValue::from("bob"));
    }

    #[test]
    fn null_requires_allow_none() {
        assert_eq!(
            Field::integer("age").deserialize(FieldValue::Null).unwrap_err(),
            ErrorMessages::message("Field may not be null.")
        );
        assert_eq!(
            Field::integer("age").allow_none().deserialize(FieldValue::Null).unwrap(),
            FieldValue::Null
        );
    }

    #[test]
    fn integer_accepts_numeric_strings_and_whole_floats() {
        let field = Field::integer("age");

        assert_eq!(field.deserialize("42".into()).unwrap().as_i64(), Some(42));
        assert_eq!(field.deserialize(3.0.into()).unwrap().as_i64(), Some(3));
        assert!(field.deserialize(3.5.into()).is_err());
    }

    #[test]
    fn integer_rejects_floats_out_of_range() {
        let field = Field::integer("age");

        assert_eq!(
            field.deserialize(1e20.into()).unwrap_err(),
            ErrorMessages::message("Not a valid integer.")
        );
        assert!(field.deserialize((-1e20).into()).is_err());
        assert!(field.deserialize(f64::INFINITY.into()).is_err());
    }

    #[test]
    fn datetime_parses_rfc3339() {
        let value = Field::datetime("at")
            .deserialize("2024-01-02T03:04:05Z".into())
            .unwrap();

        match value {
            FieldValue::Scalar(Bson::DateTime(at)) => assert_eq!(at.timestamp_millis(), 1_704_164_645_000),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn object_id_parses_hex() {
        let id = ObjectId::new();
        let value = Field::object_id("id").deserialize(id.to_hex().into()).unwrap();

        assert_eq!(value.as_object_id(), Some(id));
        assert!(Field::object_id("id").deserialize("nope".into()).is_err());
    }

    #[test]
    fn list_errors_are_keyed_by_index() {
        let field = Field::list("tags", Field::string("tag"));
        let err = field
            .deserialize(FieldValue::from(vec![Bson::from("a"), Bson::Int32(1)]))
            .unwrap_err();

        assert!(err.get("0").is_none());
        assert_eq!(err.get("1").unwrap().messages(), ["Not a valid string."]);
    }

    #[test]
    fn empty_list_is_absent_from_storage() {
        let field = Field::list("tags", Field::string("tag"));

        assert_eq!(field.to_storage(&field.default_value()), None);
        assert_eq!(field.to_storage(&FieldValue::Missing), None);
    }

    #[test]
    fn validators_run_after_conversion() {
        let field = Field::integer("age").validate(|value| match value.as_i64() {
            Some(age) if age < 0 => Err(ErrorMessages::message("Must be positive.")),
            _ => Ok(()),
        });

        assert!(field.deserialize("-1".into()).is_err());
        assert!(field.deserialize(1.into()).is_ok());
    }

    #[test]
    fn rejected_default_is_missing() {
        let field = Field::integer("age").default("old");

        assert_eq!(field.default_value(), FieldValue::Missing);
    }

    #[test]
    fn generic_reference_roundtrips_cls() {
        let field = Field::generic_reference("target");
        let id = ObjectId::new();
        let value = field
            .deserialize(FieldValue::from(doc! { "id": id, "cls": "User" }))
            .unwrap();

        let stored = field.to_storage(&value).unwrap();
        assert_eq!(stored, Bson::Document(doc! { "_id": id, "_cls": "User" }));
        assert_eq!(field.from_storage(stored).unwrap(), value);
    }

    #[test]
    fn message_override_wins() {
        let field = Field::string("nick").error_message(MessageKey::Unique, "Nick taken.");

        assert_eq!(field.message(MessageKey::Unique), "Nick taken.");
        assert_eq!(field.message(MessageKey::Required), "Missing data for required field.");
    }
}
