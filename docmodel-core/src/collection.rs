//! Collection-level operations for a document schema.
//!
//! A [`DocumentCollection`] reads documents of one schema and applies bulk
//! updates. Every filter, sort key and projection is written with object-world
//! names and goes through the [query mapper](crate::query_mapper) before it
//! reaches the backend.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{query::{Filter, Query, SortDirection}, bson::doc};
//!
//! let users = store.collection(&user_schema)?;
//!
//! let ann = users.find_one(doc! { "name.first": "Ann" }).await?;
//! let page = users
//!     .find(
//!         Query::builder()
//!             .filter(Filter::gte("age", 18))
//!             .sort("name.last", SortDirection::Asc)
//!             .limit(20)
//!             .build(),
//!     )
//!     .await?;
//! ```

use bson::Bson;
use std::sync::Arc;
use tracing::debug;

use crate::{
    backend::{FindOptions, StoreBackend, UpdateResult},
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    proxy::DataProxy,
    query::Query,
    query_mapper::{QueryValue, map_projection, map_query, map_sort},
    schema::Schema,
    store::DocumentStore,
};

/// The collection backing a document schema.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the store reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct DocumentCollection<'a, B: StoreBackend> {
    schema: Arc<Schema>,
    name: String,
    store: &'a DocumentStore<B>,
}

impl<'a, B: StoreBackend> DocumentCollection<'a, B> {
    pub(crate) fn new(schema: Arc<Schema>, store: &'a DocumentStore<B>) -> DocumentStoreResult<Self> {
        let name = schema.require_collection()?.to_string();

        Ok(Self { schema, name, store })
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the first document matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `filter` - A filter in object-world names
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidUsage`] if the filter is not a map
    /// - [`DocumentStoreError::UnknownFieldInDb`] if a strict schema meets an unknown stored key
    pub async fn find_one(&self, filter: impl Into<QueryValue>) -> DocumentStoreResult<Option<Document>> {
        let filter = self.map_filter(Some(&filter.into()))?;

        self.store
            .backend()
            .find_one(&self.name, filter, None)
            .await?
            .map(|stored| Document::build_from_storage(self.schema.clone(), stored))
            .transpose()
    }

    /// Returns the documents matching a query.
    ///
    /// Fields left out by the query's projection hold their defaults.
    ///
    /// # Arguments
    ///
    /// * `query` - The query specification, in object-world names
    pub async fn find(&self, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let filter = self.map_filter(query.filter.as_ref())?;
        let options = FindOptions {
            limit: query.limit,
            skip: query.offset,
            sort: query.sort.as_ref().map(|sort| map_sort(sort, &self.schema)),
            projection: query
                .projection
                .as_deref()
                .map(|fields| map_projection(fields, &self.schema)),
        };

        self.store
            .backend()
            .find(&self.name, filter, options)
            .await?
            .into_iter()
            .map(|stored| Document::build_from_storage(self.schema.clone(), stored))
            .collect()
    }

    /// Counts the documents matching `filter`.
    pub async fn count_documents(&self, filter: impl Into<QueryValue>) -> DocumentStoreResult<u64> {
        let filter = self.map_filter(Some(&filter.into()))?;

        self.store
            .backend()
            .count_documents(&self.name, filter)
            .await
    }

    /// Applies the modified fields of `changes` to every document matching `filter`.
    ///
    /// Build `changes` with [`DataProxy::new`] and [`DataProxy::update`] so only
    /// the intended fields are marked. Appended list elements are pushed unless
    /// `replace_arrays` is set, in which case lists are overwritten.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidUsage`] if `changes` has nothing modified
    ///   or belongs to another schema
    pub async fn update_many(
        &self,
        filter: impl Into<QueryValue>,
        changes: &DataProxy,
        replace_arrays: bool,
    ) -> DocumentStoreResult<UpdateResult> {
        if changes.schema().name() != self.schema.name() {
            return Err(DocumentStoreError::InvalidUsage(format!(
                "Changes for `{}` cannot be applied to `{}`.",
                changes.schema().name(),
                self.schema.name()
            )));
        }

        let filter = self.map_filter(Some(&filter.into()))?;
        let update = changes
            .to_storage_update_many(replace_arrays)
            .ok_or_else(|| DocumentStoreError::InvalidUsage("No modified fields to update.".to_string()))?;

        debug!(collection = %self.name, update = %update, "updating documents");

        self.store
            .backend()
            .update_many(&self.name, filter, update)
            .await
    }

    /// Creates the indexes declared by the schema.
    pub async fn ensure_indexes(&self) -> DocumentStoreResult<()> {
        for index in self.schema.indexes() {
            debug!(collection = %self.name, index = %index.name(), "ensuring index");

            self.store
                .backend()
                .create_index(&self.name, index.clone())
                .await?;
        }

        Ok(())
    }

    /// Drops the collection and all of its records.
    pub async fn drop(&self) -> DocumentStoreResult<()> {
        self.store.backend().drop_collection(&self.name).await
    }

    fn map_filter(&self, filter: Option<&QueryValue>) -> DocumentStoreResult<bson::Document> {
        match filter.map(|filter| map_query(filter, &self.schema)) {
            None => Ok(bson::Document::new()),
            Some(Bson::Document(filter)) => Ok(filter),
            Some(other) => Err(DocumentStoreError::InvalidUsage(format!(
                "Filter must be a document, got `{other}`."
            ))),
        }
    }
}
