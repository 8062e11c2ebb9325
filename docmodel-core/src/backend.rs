//! Storage backend abstraction.
//!
//! This module defines the traits that abstract over storage implementations, so
//! documents can be persisted to MongoDB, kept in memory for tests, or written
//! anywhere else that speaks a document-oriented command set.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait is a narrow async interface over single-record
//! commands (insert, replace, update, delete), reads (find, count) and index
//! management. Every command works on storage-world data: keys are storage
//! names and update payloads use the `$set` / `$unset` / `$push` operators.
//!
//! Implementations are required to be thread-safe (`Send + Sync`). The trait is
//! object safe, so `&dyn StoreBackend` can be handed to validators.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docmodel::backend::StoreBackend;
//! use bson::doc;
//!
//! let result = backend.insert_one("user", doc! { "nick": "bob" }).await?;
//! let stored = backend
//!     .find_one("user", doc! { "_id": result.inserted_id }, None)
//!     .await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::{error::DocumentStoreResult, query::Sort};

/// Outcome of an insert command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertOneResult {
    /// Primary key of the new record, generated by the backend if the payload had none.
    pub inserted_id: Bson,
}

/// Outcome of an update or replace command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    /// Number of records the filter matched.
    pub matched_count: u64,
    /// Number of records actually changed.
    pub modified_count: u64,
}

/// Outcome of a delete command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    /// Number of records removed.
    pub deleted_count: u64,
}

/// An index over one or more storage names, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexModel {
    /// Storage names composing the index.
    pub keys: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

impl IndexModel {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unique: true,
            ..Self::new(keys)
        }
    }

    /// The conventional index name, e.g. `first_1_last_1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|key| format!("{key}_1"))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// The index keys as a `{key: 1}` document.
    pub fn keys_document(&self) -> Document {
        self.keys.iter().map(|key| (key.clone(), Bson::Int32(1))).collect()
    }
}

/// Options of a multi-record read, in storage names.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Number of matching records to skip.
    pub skip: Option<usize>,
    /// Ordering of the results.
    pub sort: Option<Sort>,
    /// Inclusion projection, e.g. `{nick: 1}`.
    pub projection: Option<Document>,
}

/// Abstract interface for document storage backends.
///
/// Implementers provide the storage commands the persistence layer issues.
/// Filters and payloads are already expressed in storage names; backends never
/// see object-world field names.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from
/// multiple async tasks.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// A violated unique index must be reported as
/// [`DocumentStoreError::DuplicateKey`](crate::error::DocumentStoreError::DuplicateKey)
/// carrying the storage names of the index, so the caller can attribute the
/// failure to fields.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a record.
    ///
    /// # Arguments
    ///
    /// * `collection` - The name of the collection. Created automatically if it doesn't exist.
    /// * `document` - The record to insert. A primary key is generated if `_id` is absent.
    ///
    /// # Returns
    ///
    /// Returns the primary key of the inserted record.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult>;

    /// Replaces the first record matching `filter`, keeping its primary key.
    ///
    /// # Arguments
    ///
    /// * `collection` - The name of the collection
    /// * `filter` - The selection filter
    /// * `replacement` - The new content of the record
    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Applies an operator update to the first record matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `collection` - The name of the collection
    /// * `filter` - The selection filter
    /// * `update` - An update document made of `$set`, `$unset` and `$push` operators
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Applies an operator update to every record matching `filter`.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Deletes the first record matching `filter`.
    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<DeleteResult>;

    /// Returns the first record matching `filter`, if any.
    ///
    /// # Arguments
    ///
    /// * `collection` - The name of the collection
    /// * `filter` - The selection filter
    /// * `projection` - Optional inclusion projection
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Returns every record matching `filter`, honoring sort, skip and limit.
    ///
    /// # See Also
    ///
    /// - [`FindOptions`] for the supported options
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Counts the records matching `filter`.
    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Creates an index. Creating an index that already exists is a no-op.
    ///
    /// # Note
    ///
    /// If `index.unique` is true and existing records violate the constraint,
    /// the backend returns an error.
    async fn create_index(&self, collection: &str, index: IndexModel) -> DocumentStoreResult<()>;

    /// Drops a collection and all of its records.
    ///
    /// # Warning
    ///
    /// This operation is irreversible.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external
    /// connections should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult> {
        (*self).insert_one(collection, document).await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        (*self)
            .replace_one(collection, filter, replacement)
            .await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        (*self)
            .update_one(collection, filter, update)
            .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        (*self)
            .update_many(collection, filter, update)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<DeleteResult> {
        (*self).delete_one(collection, filter).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DocumentStoreResult<Option<Document>> {
        (*self)
            .find_one(collection, filter, projection)
            .await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        (*self).find(collection, filter, options).await
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        (*self).count_documents(collection, filter).await
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> DocumentStoreResult<()> {
        (*self).create_index(collection, index).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (*self).drop_collection(name).await
    }
}

/// Factory trait for asynchronously creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_name_joins_keys() {
        let index = IndexModel::unique(["first", "last"]);

        assert_eq!(index.name(), "first_1_last_1");
        assert_eq!(index.keys_document(), bson::doc! { "first": 1, "last": 1 });
        assert!(index.unique);
    }
}
