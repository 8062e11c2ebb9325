//! A typed object-document mapper with field-level change tracking.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Schemas and fields** ([`schema`], [`field`]) - Declarative field tables and the value conversions between object and storage worlds
//! - **Field values** ([`value`], [`reference`]) - Tracked lists and dicts, embedded documents and references
//! - **Data proxy** ([`proxy`]) - Per-document field storage, modification tracking and update payload synthesis
//! - **Documents** ([`document`]) - The commit, delete and reload lifecycle with hooks
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing different storage backends
//! - **Query and filtering API** ([`query`], [`query_mapper`]) - Typed filters and object-to-storage name mapping
//! - **Collections interface** ([`collection`]) - Reads and bulk updates per schema
//! - **Document store** ([`store`]) - Binds a backend to a schema registry
//! - **Validation** ([`validate`]) - Validators that query the store
//! - **Error handling** ([`error`]) - Error types and structured validation messages
//!
//! # Example
//!
//! ```ignore
//! use docmodel_core::{document::{CommitOptions, Document}, field::Field, schema::Schema};
//!
//! let user = Schema::document("User", "user")
//!     .field(Field::string("nick").required().unique())
//!     .field(Field::string("email").attribute("em"))
//!     .build()?;
//!
//! let mut bob = Document::with_data(user, [("nick", "bob")])?;
//! bob.commit(&store, CommitOptions::default()).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod field;
pub mod proxy;
pub mod query;
pub mod query_mapper;
pub mod reference;
pub mod schema;
pub mod store;
pub mod tracker;
pub mod validate;
pub mod value;
