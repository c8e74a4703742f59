//! Fluent construction of filter documents.
//!
//! A [`Filter`] accumulates a `bson::Document` that maps field names (or the `$and`/`$or`
//! keywords) to values or operator documents. The built document is handed to the store
//! driver verbatim.
//!
//! Each method sets one key. Setting a key that is already present overwrites it; conditions
//! on the same field are never merged. In the same way, a later [`Filter::and`] or
//! [`Filter::or`] replaces an earlier one.
//!
//! Field names are not validated or escaped. Do not pass untrusted input as a field name.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::filter::Filter;
//!
//! let filter = Filter::new()
//!     .equals("status", "active")
//!     .greater_or_equal("age", 18)
//!     .contains("name", "ali")
//!     .build();
//! ```

use bson::{Bson, Document, doc};

/// Builder for filter documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    filter: Document,
}

impl Filter {
    /// Creates an empty filter, which matches every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches documents where `field` equals `value`.
    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.filter.insert(field, value);
        self
    }

    /// Matches documents where `field` does not equal `value`.
    pub fn not_equals(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(field, "$ne", value)
    }

    /// Matches documents where `field` is greater than `value`.
    pub fn greater_than(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(field, "$gt", value)
    }

    /// Matches documents where `field` is less than `value`.
    pub fn less_than(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(field, "$lt", value)
    }

    /// Matches documents where `field` is greater than or equal to `value`.
    pub fn greater_or_equal(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(field, "$gte", value)
    }

    /// Matches documents where `field` is less than or equal to `value`.
    pub fn less_or_equal(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(field, "$lte", value)
    }

    /// Matches documents where the string `field` contains `value`, ignoring case.
    pub fn contains(self, field: impl Into<String>, value: &str) -> Self {
        self.pattern(field, regex::escape(value))
    }

    /// Matches documents where the string `field` starts with `value`, ignoring case.
    pub fn starts_with(self, field: impl Into<String>, value: &str) -> Self {
        self.pattern(field, format!("^{}", regex::escape(value)))
    }

    /// Matches documents where the string `field` ends with `value`, ignoring case.
    pub fn ends_with(self, field: impl Into<String>, value: &str) -> Self {
        self.pattern(field, format!("{}$", regex::escape(value)))
    }

    /// Matches documents where `field` lies within `[min, max]`, both bounds inclusive.
    pub fn between(
        mut self,
        field: impl Into<String>,
        min: impl Into<Bson>,
        max: impl Into<Bson>,
    ) -> Self {
        self.filter.insert(field, doc! { "$gte": min.into(), "$lte": max.into() });
        self
    }

    /// Matches documents where `field` is present (`true`) or absent (`false`).
    pub fn exists(self, field: impl Into<String>, exists: bool) -> Self {
        self.operator(field, "$exists", exists)
    }

    /// Matches documents where `field` equals any of `values`.
    pub fn is_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.operator(field, "$in", Self::array(values))
    }

    /// Matches documents where `field` equals none of `values`.
    pub fn not_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.operator(field, "$nin", Self::array(values))
    }

    /// Matches documents satisfying every one of `conditions`.
    ///
    /// Replaces any conjunction set earlier on this builder.
    pub fn and<I, C>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Document>,
    {
        self.filter.insert("$and", Self::conditions(conditions));
        self
    }

    /// Matches documents satisfying at least one of `conditions`.
    ///
    /// Replaces any disjunction set earlier on this builder.
    pub fn or<I, C>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Document>,
    {
        self.filter.insert("$or", Self::conditions(conditions));
        self
    }

    /// Sets `field` to a raw operator document, e.g. `doc! { "$size": 2 }`.
    pub fn matches(mut self, field: impl Into<String>, expression: Document) -> Self {
        self.filter.insert(field, expression);
        self
    }

    /// Returns `true` if no condition has been added.
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }

    /// Returns the accumulated filter document.
    pub fn build(self) -> Document {
        self.filter
    }

    fn operator(
        mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<Bson>,
    ) -> Self {
        self.filter.insert(field, doc! { operator: value.into() });
        self
    }

    fn pattern(mut self, field: impl Into<String>, pattern: String) -> Self {
        self.filter.insert(field, doc! { "$regex": pattern, "$options": "i" });
        self
    }

    fn array<I, V>(values: I) -> Bson
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Bson::Array(values.into_iter().map(Into::into).collect())
    }

    fn conditions<I, C>(conditions: I) -> Bson
    where
        I: IntoIterator<Item = C>,
        C: Into<Document>,
    {
        Bson::Array(
            conditions
                .into_iter()
                .map(|condition| Bson::Document(condition.into()))
                .collect(),
        )
    }
}

impl From<Document> for Filter {
    fn from(filter: Document) -> Self {
        Self { filter }
    }
}

impl From<Filter> for Document {
    fn from(filter: Filter) -> Self {
        filter.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_field_overwrites() {
        let filter = Filter::new().equals("a", 1).equals("a", 2).build();
        assert_eq!(filter.len(), 1);
        assert_eq!(filter.get_i32("a").unwrap(), 2);
    }

    #[test]
    fn different_operators_on_same_field_overwrite() {
        let filter = Filter::new()
            .greater_than("age", 18)
            .less_than("age", 65)
            .build();
        assert_eq!(filter, doc! { "age": { "$lt": 65 } });
    }

    #[test]
    fn and_and_or_are_separate_keys() {
        let filter = Filter::new()
            .and([doc! { "a": 1 }, doc! { "b": 2 }])
            .or([doc! { "c": 3 }])
            .build();

        assert_eq!(
            filter,
            doc! {
                "$and": [{ "a": 1 }, { "b": 2 }],
                "$or": [{ "c": 3 }],
            }
        );
    }

    #[test]
    fn repeated_combinator_replaces_instead_of_conjoining() {
        let filter = Filter::new()
            .or([doc! { "a": 1 }])
            .or([doc! { "b": 2 }])
            .build();
        assert_eq!(filter, doc! { "$or": [{ "b": 2 }] });
    }

    #[test]
    fn comparison_operators() {
        let filter = Filter::new()
            .not_equals("status", "deleted")
            .greater_or_equal("score", 10)
            .less_or_equal("rank", 3)
            .exists("email", true)
            .build();

        assert_eq!(
            filter,
            doc! {
                "status": { "$ne": "deleted" },
                "score": { "$gte": 10 },
                "rank": { "$lte": 3 },
                "email": { "$exists": true },
            }
        );
    }

    #[test]
    fn between_is_inclusive_range() {
        let filter = Filter::new().between("age", 18, 30).build();
        assert_eq!(filter, doc! { "age": { "$gte": 18, "$lte": 30 } });
    }

    #[test]
    fn membership_operators() {
        let filter = Filter::new()
            .is_in("tag", ["red", "blue"])
            .not_in("size", [1, 2])
            .build();

        assert_eq!(
            filter,
            doc! {
                "tag": { "$in": ["red", "blue"] },
                "size": { "$nin": [1, 2] },
            }
        );
    }

    #[test]
    fn patterns_are_escaped_and_case_insensitive() {
        let filter = Filter::new()
            .contains("name", "a.b")
            .starts_with("code", "X+")
            .ends_with("mail", "@x.io")
            .build();

        assert_eq!(
            filter,
            doc! {
                "name": { "$regex": "a\\.b", "$options": "i" },
                "code": { "$regex": "^X\\+", "$options": "i" },
                "mail": { "$regex": "@x\\.io$", "$options": "i" },
            }
        );
    }

    #[test]
    fn nested_builders_compose() {
        let filter = Filter::new()
            .or([
                Filter::new().equals("role", "admin"),
                Filter::new().greater_than("karma", 100),
            ])
            .build();

        assert_eq!(
            filter,
            doc! { "$or": [{ "role": "admin" }, { "karma": { "$gt": 100 } }] }
        );
    }

    #[test]
    fn starts_from_existing_document() {
        let filter = Filter::from(doc! { "a": 1 }).matches("b", doc! { "$size": 2 }).build();
        assert_eq!(filter, doc! { "a": 1, "b": { "$size": 2 } });
        assert!(Filter::new().is_empty());
    }
}
