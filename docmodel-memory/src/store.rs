//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that keeps records as BSON
//! documents per collection behind an async-safe read-write lock, and enforces
//! unique indexes the way MongoDB does.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::trace;

use docmodel_core::{
    backend::{
        DeleteResult, FindOptions, IndexModel, InsertOneResult, StoreBackend, StoreBackendBuilder, UpdateResult,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    query::SortDirection,
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, lookup},
    update::{apply_projection, apply_replacement, apply_update},
};

#[derive(Debug, Default)]
struct CollectionData {
    records: Vec<Document>,
    indexes: Vec<IndexModel>,
}

impl CollectionData {
    /// Positions of the records matching `filter`, in insertion order.
    fn matching(&self, filter: &Document) -> DocumentStoreResult<Vec<usize>> {
        let mut positions = Vec::new();

        for (position, record) in self.records.iter().enumerate() {
            if DocumentEvaluator::matches(record, filter)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    fn first_matching(&self, filter: &Document) -> DocumentStoreResult<Option<usize>> {
        for (position, record) in self.records.iter().enumerate() {
            if DocumentEvaluator::matches(record, filter)? {
                return Ok(Some(position));
            }
        }

        Ok(None)
    }

    /// Checks `candidate` against every unique index, ignoring the records at `skip`.
    ///
    /// `_id` is always unique.
    fn check_unique(&self, collection: &str, candidate: &Document, skip: &[usize]) -> DocumentStoreResult<()> {
        let primary = IndexModel::unique(["_id"]);
        let indexes = std::iter::once(&primary).chain(self.indexes.iter().filter(|index| index.unique));

        for index in indexes {
            let key = index_key(candidate, index);

            let taken = self
                .records
                .iter()
                .enumerate()
                .filter(|(position, _)| !skip.contains(position))
                .any(|(_, record)| keys_equal(&index_key(record, index), &key));

            if taken {
                return Err(duplicate_key(collection, index, &key));
            }
        }

        Ok(())
    }
}

/// The values of a record under an index, null for missing paths.
fn index_key(record: &Document, index: &IndexModel) -> Vec<Bson> {
    index
        .keys
        .iter()
        .map(|key| {
            lookup(record, key)
                .first()
                .map(|value| (*value).clone())
                .unwrap_or(Bson::Null)
        })
        .collect()
}

fn keys_equal(left: &[Bson], right: &[Bson]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(left, right)| Comparable::from(left) == Comparable::from(right))
}

fn duplicate_key(collection: &str, index: &IndexModel, key: &[Bson]) -> DocumentStoreError {
    let values = index
        .keys
        .iter()
        .zip(key)
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join(", ");

    DocumentStoreError::DuplicateKey {
        key_pattern: index.keys.clone(),
        message: format!(
            "E11000 duplicate key error collection: {collection} index: {} dup key: {{ {values} }}",
            index.name()
        ),
    }
}

type StoreMap = HashMap<String, CollectionData>;

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait to provide a fully functional
/// document store that operates entirely in memory using async-aware read-write locks.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries and uniqueness checks scan every record of the collection. This is
/// meant for tests and small data sets.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let result = store.insert_one("user", doc! { "nick": "bob" }).await?;
///
/// let found = store
///     .find_one("user", doc! { "_id": result.inserted_id }, None)
///     .await?;
/// assert!(found.is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> records and indexes
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docmodel_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Names of the collections holding records or indexes.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// A snapshot of the raw records of a collection, in insertion order.
    pub async fn records(&self, collection: &str) -> Vec<Document> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|data| data.records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult> {
        trace!(collection, "insert_one");

        let mut store = self.store.write().await;
        let data = store.entry(collection.to_string()).or_default();

        let record = match document.get("_id") {
            Some(_) => document,
            None => {
                let mut record = Document::new();
                record.insert("_id", ObjectId::new());
                for (key, value) in document {
                    record.insert(key, value);
                }
                record
            }
        };

        data.check_unique(collection, &record, &[])?;

        let inserted_id = record.get("_id").cloned().unwrap_or(Bson::Null);
        data.records.push(record);

        Ok(InsertOneResult { inserted_id })
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        trace!(collection, filter = %filter, "replace_one");

        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };
        let Some(position) = data.first_matching(&filter)? else {
            return Ok(UpdateResult::default());
        };

        let replaced = apply_replacement(&data.records[position], &replacement);
        data.check_unique(collection, &replaced, &[position])?;

        let modified = replaced != data.records[position];
        data.records[position] = replaced;

        Ok(UpdateResult {
            matched_count: 1,
            modified_count: modified as u64,
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        trace!(collection, filter = %filter, update = %update, "update_one");

        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };
        let Some(position) = data.first_matching(&filter)? else {
            return Ok(UpdateResult::default());
        };

        let updated = apply_update(&data.records[position], &update)?;
        data.check_unique(collection, &updated, &[position])?;

        let modified = updated != data.records[position];
        data.records[position] = updated;

        Ok(UpdateResult {
            matched_count: 1,
            modified_count: modified as u64,
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        trace!(collection, filter = %filter, update = %update, "update_many");

        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };

        let positions = data.matching(&filter)?;
        let mut result = UpdateResult::default();

        for position in positions {
            let updated = apply_update(&data.records[position], &update)?;
            data.check_unique(collection, &updated, &[position])?;

            result.matched_count += 1;

            if updated != data.records[position] {
                result.modified_count += 1;
                data.records[position] = updated;
            }
        }

        Ok(result)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<DeleteResult> {
        trace!(collection, filter = %filter, "delete_one");

        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };

        match data.first_matching(&filter)? {
            Some(position) => {
                data.records.remove(position);
                Ok(DeleteResult { deleted_count: 1 })
            }
            None => Ok(DeleteResult::default()),
        }
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DocumentStoreResult<Option<Document>> {
        trace!(collection, filter = %filter, "find_one");

        let store = self.store.read().await;
        let Some(data) = store.get(collection) else {
            return Ok(None);
        };

        Ok(data.first_matching(&filter)?.map(|position| {
            let record = &data.records[position];

            match &projection {
                Some(projection) => apply_projection(record, projection),
                None => record.clone(),
            }
        }))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        trace!(collection, filter = %filter, "find");

        let store = self.store.read().await;
        let Some(data) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut records: Vec<&Document> = data
            .matching(&filter)?
            .into_iter()
            .map(|position| &data.records[position])
            .collect();

        if let Some(sort) = &options.sort {
            records.sort_by(|a, b| {
                let left = lookup(a, &sort.field)
                    .first()
                    .map(|value| Comparable::from(*value))
                    .unwrap_or(Comparable::Null);
                let right = lookup(b, &sort.field)
                    .first()
                    .map(|value| Comparable::from(*value))
                    .unwrap_or(Comparable::Null);

                match sort.direction {
                    SortDirection::Asc => left.sort_cmp(&right),
                    SortDirection::Desc => right.sort_cmp(&left),
                }
            });
        }

        Ok(records
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|record| match &options.projection {
                Some(projection) => apply_projection(record, projection),
                None => record.clone(),
            })
            .collect())
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        trace!(collection, filter = %filter, "count_documents");

        let store = self.store.read().await;

        match store.get(collection) {
            Some(data) => Ok(data.matching(&filter)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> DocumentStoreResult<()> {
        trace!(collection, index = %index.name(), "create_index");

        let mut store = self.store.write().await;
        let data = store.entry(collection.to_string()).or_default();

        if data.indexes.iter().any(|existing| existing.keys == index.keys) {
            return Ok(());
        }

        if index.unique {
            let keys: Vec<Vec<Bson>> = data.records.iter().map(|record| index_key(record, &index)).collect();

            for (position, key) in keys.iter().enumerate() {
                if keys[..position].iter().any(|other| keys_equal(other, key)) {
                    return Err(duplicate_key(collection, &index, key));
                }
            }
        }

        data.indexes.push(index);
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        trace!(collection = name, "drop_collection");

        self.store.write().await.remove(name);
        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::query::Sort;

    #[tokio::test]
    async fn insert_generates_a_leading_primary_key() {
        let store = InMemoryStore::new();
        let result = store.insert_one("user", doc! { "k": "bob" }).await.unwrap();

        assert!(matches!(result.inserted_id, Bson::ObjectId(_)));

        let records = store.records("user").await;
        assert_eq!(records[0].keys().next().map(String::as_str), Some("_id"));
    }

    #[tokio::test]
    async fn unique_indexes_report_the_key_pattern() {
        let store = InMemoryStore::new();
        store
            .create_index("user", IndexModel::unique(["f", "l"]))
            .await
            .unwrap();
        store.insert_one("user", doc! { "f": "Ann", "l": "Smith" }).await.unwrap();
        store.insert_one("user", doc! { "f": "Ann", "l": "Jones" }).await.unwrap();

        let err = store
            .insert_one("user", doc! { "f": "Ann", "l": "Smith" })
            .await
            .unwrap_err();

        match err {
            DocumentStoreError::DuplicateKey { key_pattern, message } => {
                assert_eq!(key_pattern, vec!["f".to_string(), "l".to_string()]);
                assert!(message.contains("f_1_l_1"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = store
            .update_one("user", doc! { "l": "Jones" }, doc! { "$set": { "l": "Smith" } })
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn primary_keys_are_unique() {
        let store = InMemoryStore::new();
        store.insert_one("user", doc! { "_id": 1 }).await.unwrap();

        let err = store.insert_one("user", doc! { "_id": 1 }).await.unwrap_err();

        match err {
            DocumentStoreError::DuplicateKey { key_pattern, .. } => assert_eq!(key_pattern, vec!["_id".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn creating_a_unique_index_checks_existing_records() {
        let store = InMemoryStore::new();
        store.insert_one("user", doc! { "k": "bob" }).await.unwrap();
        store.insert_one("user", doc! { "k": "bob" }).await.unwrap();

        assert!(store.create_index("user", IndexModel::unique(["k"])).await.is_err());
    }

    #[tokio::test]
    async fn update_and_replace_report_matches() {
        let store = InMemoryStore::new();
        store.insert_one("user", doc! { "_id": 1, "k": "bob", "t": ["a"] }).await.unwrap();

        let result = store
            .update_one("user", doc! { "_id": 1 }, doc! { "$set": { "k": "joe" }, "$push": { "t": "b" } })
            .await
            .unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1 });

        let result = store
            .update_one("user", doc! { "_id": 2 }, doc! { "$set": { "k": "joe" } })
            .await
            .unwrap();
        assert_eq!(result.matched_count, 0);

        let result = store
            .replace_one("user", doc! { "_id": 1 }, doc! { "k": "sue" })
            .await
            .unwrap();
        assert_eq!(result.matched_count, 1);
        assert_eq!(store.records("user").await, vec![doc! { "_id": 1, "k": "sue" }]);
    }

    #[tokio::test]
    async fn update_many_touches_every_match() {
        let store = InMemoryStore::new();
        for age in [10, 20, 30] {
            store.insert_one("user", doc! { "a": age }).await.unwrap();
        }

        let result = store
            .update_many("user", doc! { "a": { "$gte": 20 } }, doc! { "$set": { "old": true } })
            .await
            .unwrap();

        assert_eq!(result.matched_count, 2);
        assert_eq!(store.count_documents("user", doc! { "old": true }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn find_sorts_pages_and_projects() {
        let store = InMemoryStore::new();
        for (nick, age) in [("c", 3), ("a", 1), ("b", 2)] {
            store.insert_one("user", doc! { "k": nick, "a": age }).await.unwrap();
        }

        let found = store
            .find(
                "user",
                doc! {},
                FindOptions {
                    sort: Some(Sort {
                        field: "a".to_string(),
                        direction: SortDirection::Desc,
                    }),
                    skip: Some(1),
                    limit: Some(1),
                    projection: Some(doc! { "_id": 0, "k": 1 }),
                },
            )
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "k": "b" }]);
    }

    #[tokio::test]
    async fn delete_removes_first_match() {
        let store = InMemoryStore::new();
        store.insert_one("user", doc! { "k": "bob" }).await.unwrap();

        assert_eq!(store.delete_one("user", doc! { "k": "bob" }).await.unwrap().deleted_count, 1);
        assert_eq!(store.delete_one("user", doc! { "k": "bob" }).await.unwrap().deleted_count, 0);
        assert_eq!(store.count_documents("user", doc! {}).await.unwrap(), 0);
    }
}
