//! Query construction and filtering API.
//!
//! This module provides filter expressions, query options and a visitor pattern
//! for interpreting filters across different backends.
//!
//! # Query Building
//!
//! Queries are expressed in object-world field names and mapped to storage
//! names by the collection before they reach a backend:
//!
//! ```ignore
//! use docmodel::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("name.first", "Ann"))
//!     .limit(10)
//!     .offset(0)
//!     .sort("age", SortDirection::Desc)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides static methods for building filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Existence: `exists`, `not_exists`
//! - Membership: `any_of`, `none_of`
//! - Logical: `and`, `or`
//!
//! An [`Expr`] compiles to a MongoDB-style filter document with
//! [`Expr::to_document`], and any such document parses back into an [`Expr`]
//! with [`Expr::parse`].

use bson::{Bson, Document, doc};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    query_mapper::QueryValue,
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The MongoDB sort order value, `1` or `-1`.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by. Dotted paths address nested values.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to. On an array field, matches if any element is equal.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Equal to any of the values of an array operand.
    In,
    /// Equal to none of the values of an array operand.
    Nin,
}

impl FieldOp {
    /// The MongoDB operator name.
    pub fn operator(self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::In => "$in",
            FieldOp::Nin => "$nin",
        }
    }

    fn from_operator(operator: &str) -> Option<Self> {
        Some(match operator {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::In,
            "$nin" => FieldOp::Nin,
            _ => return None,
        })
    }
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
///
/// # Example
///
/// ```ignore
/// use docmodel::query::{Expr, Filter};
///
/// let expr = Filter::and(vec![
///     Filter::eq("status", "active"),
///     Filter::gt("age", 18),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match). An empty AND matches everything.
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Compiles the expression to a MongoDB-style filter document.
    pub fn to_document(&self) -> Document {
        match FilterCompiler.visit_expr(self) {
            Ok(document) => document,
            Err(never) => match never {},
        }
    }

    /// Parses a MongoDB-style filter document.
    ///
    /// Supports implicit equality, the comparison operators of [`FieldOp`],
    /// `$exists`, `$not`, and the top-level `$and`, `$or` and `$nor` operators.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] for unsupported operators
    /// or malformed operands.
    pub fn parse(filter: &Document) -> DocumentStoreResult<Expr> {
        let mut exprs = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            let expr = match key.as_str() {
                "$and" => Expr::And(Self::parse_list(key, value)?),
                "$or" => Expr::Or(Self::parse_list(key, value)?),
                "$nor" => Expr::Or(Self::parse_list(key, value)?).not(),
                operator if operator.starts_with('$') => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "unsupported top-level operator `{operator}`"
                    )));
                }
                field => Self::parse_field(field, value)?,
            };

            exprs.push(expr);
        }

        Ok(match exprs.len() {
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        })
    }

    fn parse_list(operator: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
        let Bson::Array(items) = value else {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "`{operator}` expects an array"
            )));
        };

        items
            .iter()
            .map(|item| match item {
                Bson::Document(filter) => Self::parse(filter),
                _ => Err(DocumentStoreError::InvalidDocument(format!(
                    "`{operator}` expects an array of documents"
                ))),
            })
            .collect()
    }

    fn parse_field(field: &str, value: &Bson) -> DocumentStoreResult<Expr> {
        let operators = match value {
            Bson::Document(operators) if operators.keys().next().is_some_and(|key| key.starts_with('$')) => {
                operators
            }
            value => return Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone())),
        };

        let mut exprs = Vec::with_capacity(operators.len());

        for (operator, operand) in operators {
            let expr = match (operator.as_str(), operand) {
                ("$exists", operand) => Expr::Exists(field.to_string(), is_truthy(operand)),
                ("$not", Bson::Document(_)) => Self::parse_field(field, operand)?.not(),
                (operator, operand) => match FieldOp::from_operator(operator) {
                    Some(op) => Expr::field(field.to_string(), op, operand.clone()),
                    None => {
                        return Err(DocumentStoreError::InvalidDocument(format!(
                            "unsupported operator `{operator}` on `{field}`"
                        )));
                    }
                },
            };

            exprs.push(expr);
        }

        Ok(match exprs.len() {
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        })
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// A structured query for retrieving documents.
///
/// The filter and every field name are in object-world names. Use
/// [`QueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter to match documents.
    pub filter: Option<QueryValue>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip (for pagination).
    pub offset: Option<usize>,
    /// Sort specification for results.
    pub sort: Option<Sort>,
    /// Fields to load. Other fields take their defaults.
    pub projection: Option<Vec<String>>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
///
/// # Example
///
/// ```ignore
/// use docmodel::query::Filter;
///
/// let expr = Filter::eq("name", "Alice")
///     .and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Combines multiple expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the specified values.
    pub fn any_of<I, V>(field: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Expr::field(
            field.into(),
            FieldOp::In,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the specified values.
    pub fn none_of<I, V>(field: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Expr::field(
            field.into(),
            FieldOp::Nin,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter for this query.
    ///
    /// # Arguments
    ///
    /// * `filter` - An [`Expr`], a filter document, or any other [`QueryValue`]
    pub fn filter(mut self, filter: impl Into<QueryValue>) -> Self {
        self.query.filter = Some(filter.into());
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip (for pagination).
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Sets the sort specification for the query results.
    ///
    /// # Arguments
    ///
    /// * `field` - The field name to sort by
    /// * `direction` - The sort direction (ascending or descending)
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    /// Restricts the loaded fields.
    pub fn projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks an [`Expr`] tree.
///
/// Backends implement this to interpret filters natively, see
/// [`FilterCompiler`] for the MongoDB-style document form.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, *op, value),
        }
    }
}

/// Compiles an [`Expr`] into a MongoDB-style filter document.
///
/// `Not` compiles to `$nor` so it applies to any expression, not just a field.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterCompiler;

impl FilterCompiler {
    fn compile_all(exprs: &[Expr]) -> Vec<Bson> {
        exprs
            .iter()
            .map(|expr| Bson::Document(expr.to_document()))
            .collect()
    }
}

impl QueryVisitor for FilterCompiler {
    type Output = Document;
    type Error = std::convert::Infallible;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(Document::new());
        }

        Ok(doc! { "$and": Self::compile_all(exprs) })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$or": Self::compile_all(exprs) })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error> {
        let mut document = Document::new();
        document.insert(field, doc! { "$exists": should_exist });
        Ok(document)
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error> {
        let mut condition = Document::new();
        condition.insert(op.operator(), value.clone());

        let mut document = Document::new();
        document.insert(field, condition);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_nested_expressions() {
        let expr = Filter::eq("nick", "bob").and(Filter::gt("age", 3).or(Filter::not_exists("age")));

        assert_eq!(
            expr.to_document(),
            doc! {
                "$and": [
                    { "nick": { "$eq": "bob" } },
                    { "$or": [ { "age": { "$gt": 3 } }, { "age": { "$exists": false } } ] },
                ]
            }
        );
    }

    #[test]
    fn not_compiles_to_nor() {
        assert_eq!(
            Filter::eq("a", 1).not().to_document(),
            doc! { "$nor": [ { "a": { "$eq": 1 } } ] }
        );
    }

    #[test]
    fn parses_implicit_equality_and_operators() {
        let expr = Expr::parse(&doc! { "nick": "bob", "age": { "$gte": 3, "$lt": 9 } }).unwrap();

        assert_eq!(
            expr,
            Expr::And(vec![
                Filter::eq("nick", "bob"),
                Expr::And(vec![Filter::gte("age", 3), Filter::lt("age", 9)]),
            ])
        );
    }

    #[test]
    fn parses_logical_operators() {
        let expr = Expr::parse(&doc! { "$nor": [ { "a": 1 } ], "b": { "$not": { "$in": [1, 2] } } }).unwrap();

        assert_eq!(
            expr,
            Expr::And(vec![
                Expr::Or(vec![Filter::eq("a", 1)]).not(),
                Filter::any_of("b", [1, 2]).not(),
            ])
        );
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(Expr::parse(&Document::new()).unwrap(), Expr::And(vec![]));
        assert_eq!(Expr::And(vec![]).to_document(), Document::new());
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(Expr::parse(&doc! { "a": { "$regex": "x" } }).is_err());
        assert!(Expr::parse(&doc! { "$where": "x" }).is_err());
    }
}
