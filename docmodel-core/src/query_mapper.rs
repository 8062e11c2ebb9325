//! Translation of object-world queries into storage-world queries.
//!
//! Callers write filters, projections and sort keys with object-world field
//! names. Before anything reaches a backend, every key is split on `.` and each
//! segment is renamed to the storage name of the field it designates, descending
//! into embedded schemas (and lists of embedded documents) as it goes. Keys that
//! do not name a known field, such as operators or list indexes, pass through
//! unchanged. Document and embedded-document operands are replaced by their
//! storage form.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::query_mapper::map_document;
//! use bson::doc;
//!
//! // `name` is stored as `n`, its `first` field as `f`.
//! assert_eq!(map_document(&doc! { "name.first": "Ann" }, &user), doc! { "n.f": "Ann" });
//! ```

use bson::{Bson, oid::ObjectId};
use std::sync::Arc;

use crate::{
    document::Document,
    query::{Expr, Sort},
    reference::Reference,
    schema::Schema,
    value::EmbeddedDocument,
};

/// A query operand in object-world terms.
///
/// Plain BSON covers most filters; the other variants carry values that need
/// converting to their stored form.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// A BSON value. Nested documents are mapped key by key.
    Value(Bson),
    /// An ordered map of keys to operands.
    Map(Vec<(String, QueryValue)>),
    /// A list of operands.
    List(Vec<QueryValue>),
    /// Matched by primary key.
    Reference(Reference),
    /// Matched by primary key.
    Document(Box<Document>),
    /// Matched by its full stored form.
    Embedded(EmbeddedDocument),
}

impl QueryValue {
    /// Builds a map operand from key/value pairs.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryValue>,
    {
        entries.into_iter().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryValue
where
    K: Into<String>,
    V: Into<QueryValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        QueryValue::Map(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl From<Bson> for QueryValue {
    fn from(value: Bson) -> Self {
        QueryValue::Value(value)
    }
}

impl From<bson::Document> for QueryValue {
    fn from(value: bson::Document) -> Self {
        QueryValue::Value(Bson::Document(value))
    }
}

impl From<Expr> for QueryValue {
    fn from(value: Expr) -> Self {
        QueryValue::Value(Bson::Document(value.to_document()))
    }
}

impl From<Reference> for QueryValue {
    fn from(value: Reference) -> Self {
        QueryValue::Reference(value)
    }
}

impl From<&Document> for QueryValue {
    fn from(value: &Document) -> Self {
        QueryValue::Document(Box::new(value.clone()))
    }
}

impl From<EmbeddedDocument> for QueryValue {
    fn from(value: EmbeddedDocument) -> Self {
        QueryValue::Embedded(value)
    }
}

impl From<Vec<QueryValue>> for QueryValue {
    fn from(value: Vec<QueryValue>) -> Self {
        QueryValue::List(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Value(Bson::String(value.to_string()))
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Value(Bson::String(value))
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Value(Bson::Int32(value))
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Value(Bson::Int64(value))
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Value(Bson::Double(value))
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Value(Bson::Boolean(value))
    }
}

impl From<ObjectId> for QueryValue {
    fn from(value: ObjectId) -> Self {
        QueryValue::Value(Bson::ObjectId(value))
    }
}

/// Maps a query operand against `schema`, returning its storage form.
pub fn map_query(query: &QueryValue, schema: &Schema) -> Bson {
    map_value(query, Some(schema))
}

/// Maps a filter document against `schema`.
pub fn map_document(filter: &bson::Document, schema: &Schema) -> bson::Document {
    map_entries(filter.iter(), Some(schema), map_bson)
}

/// Maps a dotted object-world path to its dotted storage path.
pub fn map_path(path: &str, schema: &Schema) -> String {
    map_key(path, Some(schema)).0
}

/// Builds an inclusion projection over the storage names of `fields`.
pub fn map_projection<S: AsRef<str>>(fields: &[S], schema: &Schema) -> bson::Document {
    fields
        .iter()
        .map(|field| (map_path(field.as_ref(), schema), Bson::Int32(1)))
        .collect()
}

/// Maps the key of a sort specification.
pub fn map_sort(sort: &Sort, schema: &Schema) -> Sort {
    Sort {
        field: map_path(&sort.field, schema),
        direction: sort.direction,
    }
}

fn map_value(value: &QueryValue, fields: Option<&Schema>) -> Bson {
    match value {
        QueryValue::Value(value) => map_bson(value, fields),
        QueryValue::Map(entries) => Bson::Document(map_entries(
            entries.iter().map(|(key, value)| (key, value)),
            fields,
            map_value,
        )),
        QueryValue::List(items) => Bson::Array(items.iter().map(|item| map_value(item, fields)).collect()),
        QueryValue::Reference(reference) => reference.pk().clone(),
        QueryValue::Document(document) => document.pk().cloned().unwrap_or(Bson::Null),
        QueryValue::Embedded(embedded) => Bson::Document(embedded.to_storage()),
    }
}

fn map_bson(value: &Bson, fields: Option<&Schema>) -> Bson {
    match value {
        Bson::Document(entries) => Bson::Document(map_entries(entries.iter(), fields, map_bson)),
        Bson::Array(items) => Bson::Array(items.iter().map(|item| map_bson(item, fields)).collect()),
        value => value.clone(),
    }
}

fn map_entries<'a, 'v, T: 'v>(
    entries: impl Iterator<Item = (&'v String, &'v T)>,
    fields: Option<&'a Schema>,
    map: fn(&T, Option<&Schema>) -> Bson,
) -> bson::Document {
    entries
        .map(|(key, value)| {
            let (key, nested) = map_key(key, fields);
            (key, map(value, nested))
        })
        .collect()
}

/// Renames each segment of `key`, returning the mapped key and the field set
/// its value is to be mapped against.
///
/// A known field moves the lookup into its nested schema, or to no schema at
/// all for non-embedded fields. An unknown segment keeps the current schema so
/// operators and indexes can sit between a field and its nested keys.
fn map_key<'a>(key: &str, fields: Option<&'a Schema>) -> (String, Option<&'a Schema>) {
    let mut current = fields;
    let mut mapped = Vec::new();

    for segment in key.split('.') {
        match current.and_then(|schema| schema.field(segment)) {
            Some(field) => {
                mapped.push(field.storage_name().to_string());
                current = field.nested_schema().map(Arc::as_ref);
            }
            None => mapped.push(segment.to_string()),
        }
    }

    (mapped.join("."), current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{field::Field, query::SortDirection};
    use bson::doc;

    fn user_schema() -> Arc<Schema> {
        let name = Schema::embedded("Name")
            .field(Field::string("first").attribute("f"))
            .field(Field::string("last").attribute("l"))
            .build()
            .unwrap();
        let comment = Schema::embedded("Comment")
            .field(Field::string("author").attribute("a"))
            .build()
            .unwrap();

        Schema::document("User", "user")
            .field(Field::string("nick").attribute("k"))
            .field(Field::embedded("name", &name).attribute("n"))
            .field(Field::list("comments", Field::embedded("comment", &comment)).attribute("c"))
            .field(Field::list("tags", Field::string("tag")))
            .build()
            .unwrap()
    }

    #[test]
    fn maps_dotted_paths_through_embedded_fields() {
        let schema = user_schema();

        assert_eq!(
            map_document(&doc! { "name.first": "Ann" }, &schema),
            doc! { "n.f": "Ann" }
        );
        assert_eq!(
            map_document(&doc! { "name": { "first": "Ann" } }, &schema),
            doc! { "n": { "f": "Ann" } }
        );
    }

    #[test]
    fn descends_into_lists_of_embedded_documents() {
        let schema = user_schema();

        assert_eq!(
            map_document(&doc! { "comments": { "$elemMatch": { "author": "bob" } } }, &schema),
            doc! { "c": { "$elemMatch": { "a": "bob" } } }
        );
        assert_eq!(map_path("comments.0.author", &schema), "c.0.a");
    }

    #[test]
    fn operators_and_unknown_keys_pass_through() {
        let schema = user_schema();

        assert_eq!(
            map_document(
                &doc! { "$or": [ { "nick": "bob" }, { "other": { "nick": 1 } } ], "tags": { "$in": ["x"] } },
                &schema
            ),
            doc! { "$or": [ { "k": "bob" }, { "other": { "k": 1 } } ], "tags": { "$in": ["x"] } }
        );
    }

    #[test]
    fn non_embedded_fields_stop_the_descent() {
        let schema = user_schema();

        assert_eq!(map_path("tags.nick", &schema), "tags.nick");
    }

    #[test]
    fn operands_are_converted_to_storage_form() {
        let schema = user_schema();
        let name = EmbeddedDocument::load(
            schema.field("name").unwrap().nested_schema().unwrap(),
            doc! { "first": "Ann" },
        )
        .unwrap();
        let id = ObjectId::new();

        let query = QueryValue::map([
            ("name", QueryValue::from(name)),
            ("nick", QueryValue::from(Reference::generic("User", id))),
        ]);

        assert_eq!(
            map_query(&query, &schema),
            Bson::Document(doc! { "n": { "f": "Ann" }, "k": id })
        );
    }

    #[test]
    fn maps_projection_and_sort() {
        let schema = user_schema();

        assert_eq!(map_projection(&["nick", "name.last"], &schema), doc! { "k": 1, "n.l": 1 });
        assert_eq!(
            map_sort(
                &Sort {
                    field: "name.first".to_string(),
                    direction: SortDirection::Desc,
                },
                &schema
            ),
            Sort {
                field: "n.f".to_string(),
                direction: SortDirection::Desc,
            }
        );
    }
}
