//! Main docmodel crate providing a typed object-document mapper.
//!
//! This crate is the primary entry point for users of the docmodel framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! convenient access to the storage backends.
//!
//! # Features
//!
//! - **Declarative schemas** - Ordered field tables with storage names, defaults and validators
//! - **Change tracking** - Only modified fields are sent on update, down to list appends
//! - **Object/storage mapping** - Filters, sorts and projections are written with object names
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore, bson::doc};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let name = Schema::embedded("Name")
//!         .field(Field::string("first").attribute("f"))
//!         .field(Field::string("last").attribute("l"))
//!         .build()?;
//!     let user = Schema::document("User", "user")
//!         .field(Field::string("nick").required().unique())
//!         .field(Field::embedded("name", &name).attribute("n"))
//!         .field(Field::list("tags", Field::string("tag")))
//!         .build()?;
//!
//!     let store = DocumentStore::new(
//!         InMemoryStore::builder().build().await?,
//!         SchemaRegistry::new().with(user.clone())?,
//!     );
//!     store.ensure_indexes().await?;
//!
//!     // Insert
//!     let mut bob = Document::with_data(user.clone(), [("nick", "bob")])?;
//!     bob.commit(&store, CommitOptions::default()).await?;
//!
//!     // Partial update: only `tags` is sent, as a `$set`
//!     bob.data_mut().list_mut("tags")?.push("admin")?;
//!     bob.commit(&store, CommitOptions::default()).await?;
//!
//!     // Query with object-world names
//!     let found = store
//!         .collection(&user)?
//!         .find_one(doc! { "name.first": "Bob" })
//!         .await?;
//!
//!     println!("Found: {:?}", found.map(|user| user.dump()));
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    backend, collection, document, error, field, proxy, query, query_mapper, reference, schema, store, tracker,
    validate, value,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
