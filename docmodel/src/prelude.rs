//! Convenient re-exports of commonly used types from docmodel.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```
//!
//! This provides access to:
//! - Schemas, fields and field values
//! - Documents, their hooks and commit options
//! - Store backends and builders
//! - Query construction and filtering
//! - Error types

pub use docmodel_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::DocumentCollection,
    document::{CommitOptions, CommitResult, Document, DocumentHooks, DocumentState},
    error::{DocumentStoreError, DocumentStoreResult, ErrorMessages},
    field::{Field, FieldKind, MessageKey},
    proxy::DataProxy,
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    query_mapper::QueryValue,
    reference::Reference,
    schema::{Model, Schema, SchemaRegistry},
    store::DocumentStore,
    tracker::Tracked,
    validate::{IoContext, IoValidator},
    value::{EmbeddedDocument, FieldValue, TrackedDict, TrackedList},
};
