//! Main document store interface.
//!
//! A [`DocumentStore`] binds a storage backend to the [`SchemaRegistry`] used to
//! resolve references, and hands out [`DocumentCollection`]s for schemas.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{store::DocumentStore, schema::SchemaRegistry};
//!
//! let registry = SchemaRegistry::new().with(user_schema.clone())?;
//! let store = DocumentStore::new(backend, registry);
//! let users = store.collection(&user_schema)?;
//! ```

use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    collection::DocumentCollection,
    error::DocumentStoreResult,
    schema::{Model, Schema, SchemaRegistry},
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
///
/// # Example
///
/// ```ignore
/// let store = DocumentStore::new(my_backend, registry);
/// let users = store.typed_collection::<User>()?;
/// ```
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    registry: Arc<SchemaRegistry>,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend and schema registry.
    pub fn new(backend: B, registry: impl Into<Arc<SchemaRegistry>>) -> Self {
        Self {
            backend,
            registry: registry.into(),
        }
    }

    /// Creates a store over another backend sharing this store's registry.
    ///
    /// Used to run documents against a session-scoped backend handle.
    pub fn with_backend<C: StoreBackend>(&self, backend: C) -> DocumentStore<C> {
        DocumentStore {
            backend,
            registry: self.registry.clone(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Gets the collection of a document schema.
    ///
    /// # Arguments
    ///
    /// * `schema` - A document schema
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidUsage`](crate::error::DocumentStoreError::InvalidUsage)
    /// for embedded schemas.
    pub fn collection<'a>(&'a self, schema: &Arc<Schema>) -> DocumentStoreResult<DocumentCollection<'a, B>> {
        DocumentCollection::new(schema.clone(), self)
    }

    /// Gets the collection of a model's schema.
    pub fn typed_collection<'a, M: Model>(&'a self) -> DocumentStoreResult<DocumentCollection<'a, B>> {
        DocumentCollection::new(M::schema(), self)
    }

    /// Creates the indexes of every document schema in the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if an index cannot be created, e.g. because existing
    /// records violate a unique constraint.
    pub async fn ensure_indexes(&self) -> DocumentStoreResult<()> {
        for schema in self.registry.documents() {
            self.collection(schema)?.ensure_indexes().await?;
        }

        Ok(())
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// This consumes the store and should be called when no longer needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown operation fails.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}
