//! Application of update operators and projections to stored records.
//!
//! Supports the operators the persistence layer emits: `$set`, `$unset` and
//! `$push` (with `$each`), all addressing dotted paths. Numeric segments index
//! into arrays.

use bson::{Bson, Document};

use docmodel_core::error::{DocumentStoreError, DocumentStoreResult};

/// Returns a copy of `record` with `update` applied.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] for unsupported operators,
/// non-document operands, updates of `_id`, or paths crossing scalar values.
pub(crate) fn apply_update(record: &Document, update: &Document) -> DocumentStoreResult<Document> {
    let mut root = Bson::Document(record.clone());

    for (operator, operand) in update {
        let Bson::Document(operand) = operand else {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "`{operator}` expects a document"
            )));
        };

        for (path, value) in operand {
            if path == "_id" || path.starts_with("_id.") {
                return Err(DocumentStoreError::InvalidDocument(
                    "the `_id` field cannot be updated".to_string(),
                ));
            }

            let segments: Vec<&str> = path.split('.').collect();

            match operator.as_str() {
                "$set" => set_at(&mut root, &segments, value.clone())?,
                "$unset" => unset_at(&mut root, &segments),
                "$push" => push_at(&mut root, &segments, value)?,
                other => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "unsupported update operator `{other}`"
                    )));
                }
            }
        }
    }

    match root {
        Bson::Document(document) => Ok(document),
        _ => Err(DocumentStoreError::InvalidDocument("update replaced the record".to_string())),
    }
}

/// Keeps the record's `_id` and replaces everything else.
pub(crate) fn apply_replacement(record: &Document, replacement: &Document) -> Document {
    let mut replaced = Document::new();

    if let Some(id) = record.get("_id") {
        replaced.insert("_id", id.clone());
    }

    for (key, value) in replacement {
        if key != "_id" {
            replaced.insert(key.clone(), value.clone());
        }
    }

    replaced
}

/// Applies an inclusion or exclusion projection.
///
/// `_id` is kept unless explicitly excluded.
pub(crate) fn apply_projection(record: &Document, projection: &Document) -> Document {
    let inclusive = projection
        .iter()
        .any(|(key, flag)| key != "_id" && is_truthy(flag));

    if !inclusive {
        let mut root = Bson::Document(record.clone());

        for (path, _) in projection {
            let segments: Vec<&str> = path.split('.').collect();
            unset_at(&mut root, &segments);
        }

        return match root {
            Bson::Document(document) => document,
            _ => Document::new(),
        };
    }

    let mut projected = Document::new();

    if !projection.get("_id").is_some_and(|flag| !is_truthy(flag)) {
        if let Some(id) = record.get("_id") {
            projected.insert("_id", id.clone());
        }
    }

    for (path, flag) in projection {
        if path != "_id" && is_truthy(flag) {
            let segments: Vec<&str> = path.split('.').collect();
            include(record, &segments, &mut projected);
        }
    }

    projected
}

fn is_truthy(flag: &Bson) -> bool {
    match flag {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(flag) => *flag != 0,
        Bson::Int64(flag) => *flag != 0,
        Bson::Double(flag) => *flag != 0.0,
        _ => true,
    }
}

fn include(source: &Document, segments: &[&str], target: &mut Document) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Some(value) = source.get(*head) else {
        return;
    };

    if rest.is_empty() {
        target.insert(*head, value.clone());
        return;
    }

    match value {
        Bson::Document(inner) => {
            if !matches!(target.get(*head), Some(Bson::Document(_))) {
                target.insert(*head, Document::new());
            }

            if let Some(Bson::Document(slot)) = target.get_mut(*head) {
                include(inner, rest, slot);
            }
        }
        Bson::Array(items) => {
            let sources: Vec<&Document> = items.iter().filter_map(Bson::as_document).collect();

            if !matches!(target.get(*head), Some(Bson::Array(_))) {
                target.insert(
                    *head,
                    sources
                        .iter()
                        .map(|_| Bson::Document(Document::new()))
                        .collect::<Vec<_>>(),
                );
            }

            if let Some(Bson::Array(slots)) = target.get_mut(*head) {
                for (source, slot) in sources.iter().zip(slots.iter_mut()) {
                    if let Bson::Document(slot) = slot {
                        include(source, rest, slot);
                    }
                }
            }
        }
        _ => {}
    }
}

/// How far past its end an array may be padded with nulls, as in MongoDB.
const MAX_ARRAY_PADDING: usize = 1_500_000;

fn index_of(segment: &str) -> DocumentStoreResult<usize> {
    segment
        .parse()
        .map_err(|_| DocumentStoreError::InvalidDocument(format!("cannot use `{segment}` as an array index")))
}

fn set_at(target: &mut Bson, segments: &[&str], value: Bson) -> DocumentStoreResult<()> {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return Ok(());
    };

    match target {
        Bson::Document(document) => {
            if rest.is_empty() {
                document.insert(*head, value);
                return Ok(());
            }

            if !document.contains_key(*head) {
                document.insert(*head, Document::new());
            }

            match document.get_mut(*head) {
                Some(child) => set_at(child, rest, value),
                None => Ok(()),
            }
        }
        Bson::Array(items) => {
            let index = index_of(head)?;

            if index > items.len() + MAX_ARRAY_PADDING {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "cannot pad array from {} to index {index}",
                    items.len()
                )));
            }

            while items.len() <= index {
                items.push(Bson::Null);
            }

            if !rest.is_empty() && items[index] == Bson::Null {
                items[index] = Bson::Document(Document::new());
            }

            set_at(&mut items[index], rest, value)
        }
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "cannot create field `{head}` in element {other}"
        ))),
    }
}

fn unset_at(target: &mut Bson, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    match target {
        Bson::Document(document) if rest.is_empty() => {
            document.remove(*head);
        }
        Bson::Document(document) => {
            if let Some(child) = document.get_mut(*head) {
                unset_at(child, rest);
            }
        }
        Bson::Array(items) => {
            let Ok(index) = head.parse::<usize>() else {
                return;
            };

            match items.get_mut(index) {
                Some(item) if rest.is_empty() => *item = Bson::Null,
                Some(item) => unset_at(item, rest),
                None => {}
            }
        }
        _ => {}
    }
}

fn get_at<'a>(target: &'a mut Bson, segments: &[&str]) -> Option<&'a mut Bson> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(target);
    };

    let child = match target {
        Bson::Document(document) => document.get_mut(*head)?,
        Bson::Array(items) => items.get_mut(head.parse::<usize>().ok()?)?,
        _ => return None,
    };

    get_at(child, rest)
}

fn push_at(target: &mut Bson, segments: &[&str], value: &Bson) -> DocumentStoreResult<()> {
    let values = match value {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => match modifiers.get("$each") {
            Some(Bson::Array(values)) => values.clone(),
            _ => {
                return Err(DocumentStoreError::InvalidDocument(
                    "`$each` expects an array".to_string(),
                ));
            }
        },
        value => vec![value.clone()],
    };

    match get_at(target, segments) {
        Some(Bson::Array(items)) => {
            items.extend(values);
            Ok(())
        }
        Some(other) => Err(DocumentStoreError::InvalidDocument(format!(
            "cannot push to non-array value {other}"
        ))),
        None => set_at(target, segments, Bson::Array(values)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn record() -> Document {
        doc! { "_id": 1, "k": "bob", "n": { "f": "Ann" }, "t": ["a"] }
    }

    #[test]
    fn sets_and_unsets_dotted_paths() {
        let updated = apply_update(
            &record(),
            &doc! { "$set": { "n.l": "Smith", "m.x": 1 }, "$unset": { "n.f": "", "k": "" } },
        )
        .unwrap();

        assert_eq!(
            updated,
            doc! { "_id": 1, "n": { "l": "Smith" }, "t": ["a"], "m": { "x": 1 } }
        );
    }

    #[test]
    fn pushes_single_values_and_each() {
        let updated = apply_update(
            &record(),
            &doc! { "$push": { "t": { "$each": ["b", "c"] }, "u": 1 } },
        )
        .unwrap();

        assert_eq!(updated.get_array("t").unwrap(), &vec![Bson::from("a"), Bson::from("b"), Bson::from("c")]);
        assert_eq!(updated.get_array("u").unwrap(), &vec![Bson::Int32(1)]);
    }

    #[test]
    fn refuses_to_pad_arrays_without_bound() {
        let err = apply_update(&record(), &doc! { "$set": { "t.4000000000": 1 } }).unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[test]
    fn sets_array_elements_by_position() {
        let updated = apply_update(&record(), &doc! { "$set": { "t.2": "z" } }).unwrap();

        assert_eq!(updated.get_array("t").unwrap(), &vec![Bson::from("a"), Bson::Null, Bson::from("z")]);
    }

    #[test]
    fn rejects_invalid_updates() {
        assert!(apply_update(&record(), &doc! { "$inc": { "x": 1 } }).is_err());
        assert!(apply_update(&record(), &doc! { "$set": { "_id": 2 } }).is_err());
        assert!(apply_update(&record(), &doc! { "$push": { "k": 1 } }).is_err());
        assert!(apply_update(&record(), &doc! { "$set": { "k.x": 1 } }).is_err());
    }

    #[test]
    fn replacement_keeps_the_primary_key() {
        assert_eq!(
            apply_replacement(&record(), &doc! { "_id": 9, "k": "joe" }),
            doc! { "_id": 1, "k": "joe" }
        );
    }

    #[test]
    fn projects_included_paths() {
        let record = doc! { "_id": 1, "k": "bob", "n": { "f": "Ann", "l": "Smith" }, "c": [ { "a": 1, "b": 2 } ] };

        assert_eq!(
            apply_projection(&record, &doc! { "n.f": 1, "c.b": 1 }),
            doc! { "_id": 1, "n": { "f": "Ann" }, "c": [ { "b": 2 } ] }
        );
        assert_eq!(apply_projection(&record, &doc! { "_id": 0, "k": 1 }), doc! { "k": "bob" });
        assert_eq!(
            apply_projection(&record, &doc! { "n": 0, "c": 0 }),
            doc! { "_id": 1, "k": "bob" }
        );
    }
}
