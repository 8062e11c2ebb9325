//! Filter evaluation for in-memory document matching.
//!
//! Filters arrive as MongoDB-style documents, are parsed into an [`Expr`] and
//! evaluated against stored records. Dotted paths traverse embedded documents
//! and arrays: a path crossing an array matches if any element matches, and a
//! numeric segment addresses an element by position.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docmodel_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so `1` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// DateTime value
    DateTime(DateTime),
    /// String value
    String(&'a str),
    /// ObjectId value
    ObjectId(ObjectId),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other value, compared as is
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the BSON sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Other(_) => 5,
            Comparable::ObjectId(_) => 6,
            Comparable::Bool(_) => 7,
            Comparable::DateTime(_) => 8,
        }
    }

    /// A total order for sorting, ranking values of different types by type.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Collects the values reached by a dotted path.
///
/// Arrays met along the way are traversed element-wise unless the next segment
/// is a position.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();

    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            collect(value, rest, &mut found);
        }
    }

    found
}

fn collect<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(document) => {
            if let Some(value) = document.get(*head) {
                collect(value, rest, found);
            }
        }
        Bson::Array(items) => {
            if let Some(item) = head.parse::<usize>().ok().and_then(|index| items.get(index)) {
                collect(item, rest, found);
            }

            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                collect(item, segments, found);
            }
        }
        _ => {}
    }
}

/// Evaluates filter expressions against a single record.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Checks a record against a MongoDB-style filter document.
    pub fn matches(document: &'a Document, filter: &Document) -> DocumentStoreResult<bool> {
        if filter.is_empty() {
            return Ok(true);
        }

        DocumentEvaluator::new(document).evaluate(&Expr::parse(filter)?)
    }

    fn any_candidate(&self, field: &str, mut predicate: impl FnMut(&Comparable<'_>) -> bool) -> bool {
        lookup(self.document, field).into_iter().any(|value| {
            let value = Comparable::from(value);

            if predicate(&value) {
                return true;
            }

            match &value {
                Comparable::Array(items) => items.iter().any(&mut predicate),
                _ => false,
            }
        })
    }

    fn equals(&self, field: &str, value: &Bson) -> bool {
        let expected = Comparable::from(value);

        if expected == Comparable::Null && lookup(self.document, field).is_empty() {
            return true;
        }

        self.any_candidate(field, |candidate| candidate == &expected)
    }

    fn one_of(&self, field: &str, values: &Bson) -> DocumentStoreResult<bool> {
        let Bson::Array(values) = values else {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "`$in` and `$nin` on `{field}` expect an array"
            )));
        };

        Ok(values.iter().any(|value| self.equals(field, value)))
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(!lookup(self.document, field).is_empty() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let expected = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => self.equals(field, value),
            FieldOp::Ne => !self.equals(field, value),
            FieldOp::Gt => self.any_candidate(field, |candidate| candidate.partial_cmp(&expected) == Some(Ordering::Greater)),
            FieldOp::Gte => self.any_candidate(field, |candidate| {
                matches!(candidate.partial_cmp(&expected), Some(Ordering::Greater | Ordering::Equal))
            }),
            FieldOp::Lt => self.any_candidate(field, |candidate| candidate.partial_cmp(&expected) == Some(Ordering::Less)),
            FieldOp::Lte => self.any_candidate(field, |candidate| {
                matches!(candidate.partial_cmp(&expected), Some(Ordering::Less | Ordering::Equal))
            }),
            FieldOp::In => self.one_of(field, value)?,
            FieldOp::Nin => !self.one_of(field, value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn user() -> Document {
        doc! {
            "_id": 1,
            "nick": "bob",
            "age": 42,
            "n": { "f": "Ann", "l": "Smith" },
            "tags": ["a", "b"],
            "c": [ { "a": "joe" }, { "a": "sue" } ],
        }
    }

    fn matches(filter: Document) -> bool {
        DocumentEvaluator::matches(&user(), &filter).unwrap()
    }

    #[test]
    fn matches_dotted_paths() {
        assert!(matches(doc! { "n.f": "Ann" }));
        assert!(!matches(doc! { "n.f": "Bob" }));
        assert!(matches(doc! { "c.a": "sue" }));
        assert!(matches(doc! { "c.1.a": "sue" }));
        assert!(!matches(doc! { "c.0.a": "sue" }));
    }

    #[test]
    fn equality_on_arrays_matches_elements() {
        assert!(matches(doc! { "tags": "a" }));
        assert!(matches(doc! { "tags": ["a", "b"] }));
        assert!(!matches(doc! { "tags": "z" }));
        assert!(matches(doc! { "tags": { "$in": ["z", "b"] } }));
        assert!(matches(doc! { "tags": { "$nin": ["z"] } }));
    }

    #[test]
    fn null_matches_missing_fields() {
        assert!(matches(doc! { "email": null }));
        assert!(!matches(doc! { "nick": null }));
        assert!(matches(doc! { "email": { "$exists": false } }));
    }

    #[test]
    fn compares_numbers_across_types() {
        assert!(matches(doc! { "age": 42.0 }));
        assert!(matches(doc! { "age": { "$gt": 40_i64, "$lte": 42 } }));
        assert!(!matches(doc! { "age": { "$lt": 42 } }));
        assert!(matches(doc! { "$or": [ { "age": 1 }, { "nick": "bob" } ] }));
        assert!(!matches(doc! { "$nor": [ { "nick": "bob" } ] }));
    }

    #[test]
    fn rejects_unsupported_operators() {
        let err = DocumentEvaluator::matches(&user(), &doc! { "nick": { "$regex": "b" } }).unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[test]
    fn sort_order_ranks_types() {
        let null = Bson::Null;
        let number = Bson::Int32(3);
        let string = Bson::String("a".to_string());

        assert_eq!(Comparable::from(&null).sort_cmp(&Comparable::from(&number)), Ordering::Less);
        assert_eq!(Comparable::from(&string).sort_cmp(&Comparable::from(&number)), Ordering::Greater);
    }
}
