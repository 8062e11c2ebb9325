//! References between documents.
//!
//! A [`Reference`] is the stored identity of another document: its schema name and
//! primary key. It can be compared cheaply by identity and resolved against a
//! store on demand. Nothing is cached; every [`Reference::fetch`] hits the backend.

use bson::{Bson, doc};

use crate::{
    backend::StoreBackend,
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult, ErrorMessages},
    field::{Field, NOT_FOUND_MESSAGE},
    schema::SchemaRegistry,
    store::DocumentStore,
};

/// A pointer to a document of a given schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    document: String,
    collection: Option<String>,
    pk: Bson,
}

impl Reference {
    /// Creates a reference to the document of schema `document` with primary key `pk`.
    ///
    /// When `collection` is `None` the collection is resolved through the schema
    /// registry at fetch time.
    pub fn new(document: impl Into<String>, collection: Option<String>, pk: impl Into<Bson>) -> Self {
        Self {
            document: document.into(),
            collection,
            pk: pk.into(),
        }
    }

    /// Creates a reference whose collection is only known through the registry.
    pub fn generic(document: impl Into<String>, pk: impl Into<Bson>) -> Self {
        Self::new(document, None, pk)
    }

    /// Name of the referenced schema.
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Primary key of the referenced document.
    pub fn pk(&self) -> &Bson {
        &self.pk
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// The identity used to compare references and documents.
    pub fn identity(&self) -> (&str, &Bson) {
        (&self.document, &self.pk)
    }

    /// Loads the referenced document.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::NoneReference`] if the primary key is null
    /// - [`DocumentStoreError::Validation`] if no such document exists
    /// - [`DocumentStoreError::NotRegistered`] if the schema is not in the store's registry
    pub async fn fetch<B: StoreBackend>(&self, store: &DocumentStore<B>) -> DocumentStoreResult<Document> {
        self.fetch_or(store, || NOT_FOUND_MESSAGE.replace("{document}", &self.document))
            .await
    }

    /// Loads the referenced document, reporting a missing one with the
    /// not-found message of `field`.
    pub async fn fetch_for<B: StoreBackend>(
        &self,
        field: &Field,
        store: &DocumentStore<B>,
    ) -> DocumentStoreResult<Document> {
        self.fetch_or(store, || field.not_found_message(&self.document))
            .await
    }

    async fn fetch_or<B, F>(&self, store: &DocumentStore<B>, not_found: F) -> DocumentStoreResult<Document>
    where
        B: StoreBackend,
        F: FnOnce() -> String,
    {
        if self.pk == Bson::Null {
            return Err(DocumentStoreError::NoneReference);
        }

        let schema = store.registry().get(&self.document)?.clone();
        let collection = match &self.collection {
            Some(collection) => collection.clone(),
            None => schema.require_collection()?.to_string(),
        };

        match store
            .backend()
            .find_one(&collection, doc! { "_id": self.pk.clone() }, None)
            .await?
        {
            Some(stored) => Document::build_from_storage(schema, stored),
            None => Err(ErrorMessages::message(not_found()).into()),
        }
    }

    /// Checks whether the referenced document exists.
    pub async fn exists<B: StoreBackend>(&self, store: &DocumentStore<B>) -> DocumentStoreResult<bool> {
        self.exists_in(store.backend(), store.registry()).await
    }

    pub(crate) async fn exists_in(
        &self,
        backend: &dyn StoreBackend,
        registry: &SchemaRegistry,
    ) -> DocumentStoreResult<bool> {
        if self.pk == Bson::Null {
            return Err(DocumentStoreError::NoneReference);
        }

        let collection = match &self.collection {
            Some(collection) => collection.clone(),
            None => registry.get(&self.document)?.require_collection()?.to_string(),
        };

        let found = backend
            .find_one(
                &collection,
                doc! { "_id": self.pk.clone() },
                Some(doc! { "_id": 1 }),
            )
            .await?;

        Ok(found.is_some())
    }
}

impl PartialEq<Document> for Reference {
    fn eq(&self, other: &Document) -> bool {
        other.schema().name() == self.document && other.pk() == Some(&self.pk)
    }
}

impl PartialEq<Reference> for Document {
    fn eq(&self, other: &Reference) -> bool {
        other == self
    }
}
