//! MongoDB implementation of the storage backend.

use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use mea::mutex::Mutex;
use mongodb::{
    Client, ClientSession, Collection as MongoCollection, IndexModel as MongoIndexModel,
    options::{ClientOptions, FindOneOptions, FindOptions as MongoFindOptions, IndexOptions},
};
use std::{fmt, sync::Arc};
use tracing::trace;

use docmodel_core::{
    backend::{
        DeleteResult, FindOptions, IndexModel, InsertOneResult, StoreBackend, StoreBackendBuilder, UpdateResult,
    },
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::error::backend_error;

/// A MongoDB storage backend.
///
/// A store obtained from [`MongoDbStore::start_session`] runs every command in
/// that session, so transactions can be driven explicitly through it. Plain
/// stores run each command on its own.
#[derive(Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
    session: Option<Arc<Mutex<ClientSession>>>,
}

impl fmt::Debug for MongoDbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbStore")
            .field("database", &self.database)
            .field("in_session", &self.session.is_some())
            .finish()
    }
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self {
            client,
            database,
            session: None,
        }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    /// Starts a session and returns a store whose commands all run in it.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let session = backend.start_session().await?;
    /// session.start_transaction().await?;
    ///
    /// let scoped = store.with_backend(session.clone());
    /// user.commit(&scoped, CommitOptions::default()).await?;
    ///
    /// session.commit_transaction().await?;
    /// ```
    pub async fn start_session(&self) -> DocumentStoreResult<MongoDbStore> {
        let session = self
            .client
            .start_session()
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(Self {
            client: self.client.clone(),
            database: self.database.clone(),
            session: Some(Arc::new(Mutex::new(session))),
        })
    }

    pub fn in_session(&self) -> bool {
        self.session.is_some()
    }

    fn require_session(&self) -> DocumentStoreResult<&Arc<Mutex<ClientSession>>> {
        self.session.as_ref().ok_or_else(|| {
            DocumentStoreError::InvalidUsage("Transactions require a store obtained from `start_session`.".to_string())
        })
    }

    /// Starts a transaction on this store's session.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidUsage`] if the store has no session.
    pub async fn start_transaction(&self) -> DocumentStoreResult<()> {
        let mut session = self.require_session()?.lock().await;

        session
            .start_transaction()
            .await
            .map_err(backend_error)
    }

    /// Commits the transaction running on this store's session.
    pub async fn commit_transaction(&self) -> DocumentStoreResult<()> {
        let mut session = self.require_session()?.lock().await;

        session
            .commit_transaction()
            .await
            .map_err(backend_error)
    }

    /// Aborts the transaction running on this store's session.
    pub async fn abort_transaction(&self) -> DocumentStoreResult<()> {
        let mut session = self.require_session()?.lock().await;

        session
            .abort_transaction()
            .await
            .map_err(backend_error)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<InsertOneResult> {
        trace!(collection, "insert_one");

        let coll = self.get_collection(collection);
        let action = coll.insert_one(document);
        let result = match &self.session {
            Some(session) => action.session(&mut *session.lock().await).await,
            None => action.await,
        }
        .map_err(backend_error)?;

        Ok(InsertOneResult {
            inserted_id: result.inserted_id,
        })
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        trace!(collection, filter = %filter, "replace_one");

        let coll = self.get_collection(collection);
        let action = coll
            .replace_one(filter, replacement);
        let result = match &self.session {
            Some(session) => action.session(&mut *session.lock().await).await,
            None => action.await,
        }
        .map_err(backend_error)?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        trace!(collection, filter = %filter, update = %update, "update_one");

        let coll = self.get_collection(collection);
        let action = coll
            .update_one(filter, update);
        let result = match &self.session {
            Some(session) => action.session(&mut *session.lock().await).await,
            None => action.await,
        }
        .map_err(backend_error)?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        trace!(collection, filter = %filter, update = %update, "update_many");

        let coll = self.get_collection(collection);
        let action = coll
            .update_many(filter, update);
        let result = match &self.session {
            Some(session) => action.session(&mut *session.lock().await).await,
            None => action.await,
        }
        .map_err(backend_error)?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<DeleteResult> {
        trace!(collection, filter = %filter, "delete_one");

        let coll = self.get_collection(collection);
        let action = coll.delete_one(filter);
        let result = match &self.session {
            Some(session) => action.session(&mut *session.lock().await).await,
            None => action.await,
        }
        .map_err(backend_error)?;

        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DocumentStoreResult<Option<Document>> {
        trace!(collection, filter = %filter, "find_one");

        let mut options = FindOneOptions::default();
        options.projection = projection;

        let coll = self.get_collection(collection);
        let action = coll
            .find_one(filter)
            .with_options(options);

        match &self.session {
            Some(session) => action.session(&mut *session.lock().await).await,
            None => action.await,
        }
        .map_err(backend_error)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        trace!(collection, filter = %filter, "find");

        let mut find_options = MongoFindOptions::default();

        if let Some(limit) = options.limit {
            find_options.limit = Some(limit as i64);
        }
        if let Some(skip) = options.skip {
            find_options.skip = Some(skip as u64);
        }
        if let Some(sort) = &options.sort {
            let mut sort_document = Document::new();
            sort_document.insert(sort.field.clone(), sort.direction.as_i32());
            find_options.sort = Some(sort_document);
        }
        find_options.projection = options.projection;

        let coll = self.get_collection(collection);
        let action = coll
            .find(filter)
            .with_options(find_options);

        match &self.session {
            Some(session) => {
                let mut session = session.lock().await;
                let mut cursor = action
                    .session(&mut *session)
                    .await
                    .map_err(backend_error)?;

                cursor
                    .stream(&mut *session)
                    .try_collect::<Vec<Document>>()
                    .await
                    .map_err(backend_error)
            }
            None => action
                .await
                .map_err(backend_error)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(backend_error),
        }
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        trace!(collection, filter = %filter, "count_documents");

        let coll = self.get_collection(collection);
        let action = coll.count_documents(filter);

        match &self.session {
            Some(session) => action.session(&mut *session.lock().await).await,
            None => action.await,
        }
        .map_err(backend_error)
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> DocumentStoreResult<()> {
        trace!(collection, index = %index.name(), "create_index");

        self.get_collection(collection)
            .create_index(
                MongoIndexModel::builder()
                    .keys(index.keys_document())
                    .options(
                        IndexOptions::builder()
                            .name(index.name())
                            .unique(index.unique)
                            .build(),
                    )
                    .build(),
            )
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        trace!(collection = name, "drop_collection");

        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

/// Builder for [`MongoDbStore`] from a connection string and a database name.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
