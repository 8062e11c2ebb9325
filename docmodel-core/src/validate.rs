//! Validation against the store.
//!
//! Some checks need the database: that a referenced document exists, that a
//! value is not already taken, and so on. These run in the commit pipeline
//! after required-field validation and before the storage command, through
//! [`IoValidator`]s attached to fields.
//!
//! Reference fields get an existence check for free, and list, dict and
//! embedded values are validated element by element.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeSet;

use crate::{
    backend::StoreBackend,
    error::{DocumentStoreError, DocumentStoreResult, ErrorCollector, ErrorMessages},
    field::{Field, FieldKind},
    proxy::DataProxy,
    schema::SchemaRegistry,
    value::FieldValue,
};

/// What an [`IoValidator`] can reach while it runs.
#[derive(Clone, Copy)]
pub struct IoContext<'a> {
    pub backend: &'a dyn StoreBackend,
    pub registry: &'a SchemaRegistry,
}

/// A validator that may query the store.
///
/// Return [`DocumentStoreError::Validation`] to reject the value; any other
/// error aborts the commit as is.
///
/// # Example
///
/// ```ignore
/// struct NotBanned;
///
/// #[async_trait]
/// impl IoValidator for NotBanned {
///     async fn validate(&self, ctx: &IoContext<'_>, _field: &Field, value: &FieldValue) -> DocumentStoreResult<()> {
///         let nick = value.as_str().unwrap_or_default();
///         match ctx.backend.find_one("banned", doc! { "nick": nick }, None).await? {
///             Some(_) => Err(ErrorMessages::message("Nick is banned.").into()),
///             None => Ok(()),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait IoValidator: Send + Sync {
    async fn validate(&self, ctx: &IoContext<'_>, field: &Field, value: &FieldValue) -> DocumentStoreResult<()>;
}

/// Runs io validation over the fields of `data`, or over `only` when given.
///
/// Missing and null values are skipped. Messages are keyed by field name.
pub(crate) fn validate_proxy<'a>(
    ctx: IoContext<'a>,
    data: &'a DataProxy,
    only: Option<&'a BTreeSet<String>>,
) -> BoxFuture<'a, DocumentStoreResult<()>> {
    async move {
        let mut errors = ErrorCollector::default();

        for (field, value) in data.fields() {
            if only.is_some_and(|only| !only.contains(field.storage_name())) {
                continue;
            }

            if let Some(messages) = collect(validate_value(ctx, field, value).await)? {
                errors.add(field.name(), messages);
            }
        }

        errors.finish().map_err(Into::into)
    }
    .boxed()
}

fn validate_value<'a>(
    ctx: IoContext<'a>,
    field: &'a Field,
    value: &'a FieldValue,
) -> BoxFuture<'a, DocumentStoreResult<()>> {
    async move {
        if matches!(value, FieldValue::Missing | FieldValue::Null) {
            return Ok(());
        }

        let mut errors: Option<ErrorMessages> = None;
        let mut record = |messages: ErrorMessages| match errors.as_mut() {
            Some(errors) => errors.merge(messages),
            None => errors = Some(messages),
        };

        match (field.kind(), value) {
            (FieldKind::List(inner), FieldValue::List(list)) => {
                let mut nested = ErrorCollector::default();

                for (index, item) in list.iter().enumerate() {
                    if let Some(messages) = collect(validate_value(ctx, inner, item).await)? {
                        nested.add(index.to_string(), messages);
                    }
                }

                if let Err(messages) = nested.finish() {
                    record(messages);
                }
            }
            (FieldKind::Dict(Some(value_field)), FieldValue::Dict(dict)) => {
                let mut nested = ErrorCollector::default();

                for (key, item) in dict.iter() {
                    if let Some(messages) = collect(validate_value(ctx, value_field, item).await)? {
                        nested.add(key.clone(), messages);
                    }
                }

                if let Err(messages) = nested.finish() {
                    record(messages);
                }
            }
            (FieldKind::Embedded(_), FieldValue::Embedded(embedded)) => {
                if let Some(messages) = collect(validate_proxy(ctx, embedded.data(), None).await)? {
                    record(messages);
                }
            }
            (FieldKind::Reference { .. } | FieldKind::GenericReference, FieldValue::Reference(reference)) => {
                match reference.exists_in(ctx.backend, ctx.registry).await {
                    Ok(true) => {}
                    Ok(false) => record(ErrorMessages::message(field.not_found_message(reference.document()))),
                    Err(DocumentStoreError::NotRegistered(document)) => {
                        record(ErrorMessages::message(format!("Unknown document `{document}`.")))
                    }
                    Err(err) => return Err(err),
                }
            }
            _ => {}
        }

        for validator in field.io_validators() {
            if let Some(messages) = collect(validator.validate(&ctx, field, value).await)? {
                record(messages);
            }
        }

        match errors {
            Some(errors) => Err(errors.into()),
            None => Ok(()),
        }
    }
    .boxed()
}

/// Splits a validation outcome into messages to report and errors to propagate.
fn collect(result: DocumentStoreResult<()>) -> DocumentStoreResult<Option<ErrorMessages>> {
    match result {
        Ok(()) => Ok(None),
        Err(DocumentStoreError::Validation(messages)) => Ok(Some(messages)),
        Err(err) => Err(err),
    }
}
