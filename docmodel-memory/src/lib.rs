//! In-memory document storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **MongoDB-style filters** - Dotted paths, array traversal and the comparison operators
//! - **Update operators** - `$set`, `$unset` and `$push` with `$each`
//! - **Unique indexes** - Violations are reported with the offending key pattern
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let user = Schema::document("User", "user")
//!         .field(Field::string("nick").required().unique())
//!         .build()?;
//!
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend, SchemaRegistry::new().with(user.clone())?);
//!     store.ensure_indexes().await?;
//!
//!     let mut bob = Document::with_data(user, [("nick", "bob")])?;
//!     bob.commit(&store, CommitOptions::default()).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

pub mod evaluator;
pub mod store;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
