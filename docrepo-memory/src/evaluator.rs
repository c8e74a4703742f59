//! Filter evaluation for in-memory document matching.
//!
//! This module evaluates MongoDB-style filter documents against stored BSON documents and
//! orders documents by a sort document.
//!
//! Supported operators: implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
//! `$in`, `$nin`, `$exists`, `$regex` (with `$options`), `$not`, `$and`, `$or` and `$nor`.
//! Field names may be dotted paths into embedded documents and arrays. Anything else is
//! rejected with [`DocumentStoreError::InvalidDocument`].

use std::{
    borrow::Borrow,
    cell::RefCell,
    cmp::Ordering,
    collections::{HashMap, hash_map::Entry},
};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::{Regex, RegexBuilder};

use docrepo_core::error::{DocumentStoreError, DocumentStoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64. Values of different kinds never compare as
/// ordered, but [`Comparable::sort_cmp`] still ranks them for sorting.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other BSON value, compared for equality only.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
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
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of this value's kind in the cross-type sort order.
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

    /// Total order used for sorting: by kind first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

/// Resolves a dotted field path, stepping into embedded documents and array positions.
pub(crate) fn lookup<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// A filter prepared for evaluation against many documents.
///
/// Each distinct `$regex` pattern is compiled on first use and reused for the remaining
/// documents.
pub(crate) struct FilterMatcher<'f> {
    filter: &'f Document,
    regexes: RegexCache<'f>,
}

impl<'f> FilterMatcher<'f> {
    pub fn new(filter: &'f Document) -> Self {
        Self { filter, regexes: RegexCache::default() }
    }

    /// Returns `true` if `document` satisfies every condition of the filter.
    pub fn matches(&self, document: &Document) -> DocumentStoreResult<bool> {
        DocumentEvaluator { document, regexes: &self.regexes }.matches(self.filter)
    }
}

/// Compiled regular expressions keyed by pattern and options.
#[derive(Default)]
struct RegexCache<'f> {
    compiled: RefCell<HashMap<(&'f str, &'f str), Regex>>,
}

impl<'f> RegexCache<'f> {
    fn is_match(
        &self,
        pattern: &'f str,
        options: &'f str,
        value: Option<&Bson>,
    ) -> DocumentStoreResult<bool> {
        let mut compiled = self.compiled.borrow_mut();
        let regex = match compiled.entry((pattern, options)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(compile(pattern, options)?),
        };

        Ok(matches_regex(value, regex))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.compiled.borrow().len()
    }
}

struct DocumentEvaluator<'a, 'f> {
    document: &'a Document,
    regexes: &'a RegexCache<'f>,
}

impl<'a, 'f> DocumentEvaluator<'a, 'f> {
    fn matches(&self, filter: &'f Document) -> DocumentStoreResult<bool> {
        for (key, condition) in filter {
            if !self.matches_entry(key, condition)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn matches_entry(&self, key: &str, condition: &'f Bson) -> DocumentStoreResult<bool> {
        match key {
            "$and" => {
                for clause in clauses(key, condition)? {
                    if !self.matches(clause)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            "$or" => {
                for clause in clauses(key, condition)? {
                    if self.matches(clause)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            "$nor" => {
                for clause in clauses(key, condition)? {
                    if self.matches(clause)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            operator if operator.starts_with('$') => Err(unsupported(operator)),
            field => self.matches_condition(lookup(self.document, field), condition),
        }
    }

    fn matches_condition(
        &self,
        value: Option<&Bson>,
        condition: &'f Bson,
    ) -> DocumentStoreResult<bool> {
        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                self.matches_operators(value, operators)
            }
            Bson::RegularExpression(regex) => self.regexes.is_match(
                regex.pattern.as_str(),
                regex.options.as_str(),
                value,
            ),
            _ => Ok(equals(value, condition)),
        }
    }

    fn matches_operators(
        &self,
        value: Option<&Bson>,
        operators: &'f Document,
    ) -> DocumentStoreResult<bool> {
        for (operator, operand) in operators {
            let matched = match operator.as_str() {
                "$eq" => equals(value, operand),
                "$ne" => !equals(value, operand),
                "$gt" => compare(value, operand, |ordering| ordering == Ordering::Greater),
                "$gte" => compare(value, operand, |ordering| ordering != Ordering::Less),
                "$lt" => compare(value, operand, |ordering| ordering == Ordering::Less),
                "$lte" => compare(value, operand, |ordering| ordering != Ordering::Greater),
                "$in" => members(operator, operand)?
                    .iter()
                    .any(|candidate| equals(value, candidate)),
                "$nin" => !members(operator, operand)?
                    .iter()
                    .any(|candidate| equals(value, candidate)),
                "$exists" => value.is_some() == is_truthy(operand),
                "$regex" => match operand {
                    Bson::String(pattern) => {
                        let options = operators
                            .get("$options")
                            .and_then(Bson::as_str)
                            .unwrap_or_default();
                        self.regexes.is_match(pattern, options, value)?
                    }
                    Bson::RegularExpression(regex) => self.regexes.is_match(
                        regex.pattern.as_str(),
                        regex.options.as_str(),
                        value,
                    )?,
                    _ => {
                        return Err(DocumentStoreError::InvalidDocument(
                            "$regex expects a string pattern".to_string(),
                        ));
                    }
                },
                "$options" if operators.contains_key("$regex") => true,
                "$not" => !self.matches_condition(value, operand)?,
                other => return Err(unsupported(other)),
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Filters `documents` down to those matching `filter`.
pub(crate) fn filter_documents<'d>(
    documents: impl IntoIterator<Item = &'d Document>,
    filter: &Document,
) -> DocumentStoreResult<Vec<&'d Document>> {
    let matcher = FilterMatcher::new(filter);
    let mut matched = Vec::new();

    for document in documents {
        if matcher.matches(document)? {
            matched.push(document);
        }
    }

    Ok(matched)
}

/// Sorts documents in place by a sort document such as `{ "age": -1, "name": 1 }`.
pub(crate) fn sort_documents<D>(documents: &mut [D], sort: &Document) -> DocumentStoreResult<()>
where
    D: Borrow<Document>,
{
    let keys = sort
        .iter()
        .map(|(field, direction)| Ok((field.as_str(), is_descending(field, direction)?)))
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    documents.sort_by(|a, b| {
        for (field, descending) in &keys {
            let left = lookup(a.borrow(), field)
                .map(Comparable::from)
                .unwrap_or(Comparable::Null);
            let right = lookup(b.borrow(), field)
                .map(Comparable::from)
                .unwrap_or(Comparable::Null);

            let ordering = match descending {
                true => right.sort_cmp(&left),
                false => left.sort_cmp(&right),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(())
}

fn is_descending(field: &str, direction: &Bson) -> DocumentStoreResult<bool> {
    match direction {
        Bson::Int32(1) | Bson::Int64(1) => Ok(false),
        Bson::Int32(-1) | Bson::Int64(-1) => Ok(true),
        Bson::Double(value) if *value == 1.0 => Ok(false),
        Bson::Double(value) if *value == -1.0 => Ok(true),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "invalid sort direction {other} for field {field}"
        ))),
    }
}

fn clauses<'c>(operator: &str, condition: &'c Bson) -> DocumentStoreResult<Vec<&'c Document>> {
    let invalid = || {
        DocumentStoreError::InvalidDocument(format!(
            "{operator} expects a non-empty array of documents"
        ))
    };

    match condition {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_document().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

fn is_operator_document(document: &Document) -> bool {
    document
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let Some(actual) = value else {
        return matches!(expected, Bson::Null);
    };

    let expected = Comparable::from(expected);
    if Comparable::from(actual) == expected {
        return true;
    }

    match actual {
        Bson::Array(items) => items
            .iter()
            .any(|item| Comparable::from(item) == expected),
        _ => false,
    }
}

fn compare(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);
    let satisfies = |candidate: &Bson| {
        Comparable::from(candidate)
            .partial_cmp(&operand)
            .is_some_and(&accept)
    };

    match value {
        Some(Bson::Array(items)) => items.iter().any(satisfies),
        Some(actual) => satisfies(actual),
        None => false,
    }
}

fn members<'o>(operator: &str, operand: &'o Bson) -> DocumentStoreResult<&'o Vec<Bson>> {
    operand.as_array().ok_or_else(|| {
        DocumentStoreError::InvalidDocument(format!("{operator} expects an array"))
    })
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn compile(pattern: &str, options: &str) -> DocumentStoreResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);

    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "unsupported regex option {other:?}"
                )));
            }
        };
    }

    builder
        .build()
        .map_err(|e| DocumentStoreError::InvalidDocument(format!("invalid regex {pattern:?}: {e}")))
}

fn matches_regex(value: Option<&Bson>, regex: &Regex) -> bool {
    match value {
        Some(Bson::String(text)) => regex.is_match(text),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(text) if regex.is_match(text))),
        _ => false,
    }
}

fn unsupported(operator: &str) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(format!("unsupported operator {operator}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docrepo_core::filter::Filter;

    fn person() -> Document {
        doc! {
            "_id": ObjectId::parse_str("68773f19dcfdef2276d06ad6").unwrap(),
            "name": "Alice Smith",
            "age": 30,
            "score": 7.5,
            "tags": ["admin", "ops"],
            "address": { "city": "Oslo", "zip": "0150" },
        }
    }

    fn matches(filter: Document) -> bool {
        FilterMatcher::new(&filter).matches(&person()).unwrap()
    }

    #[test]
    fn implicit_equality_and_paths() {
        assert!(matches(doc! { "name": "Alice Smith" }));
        assert!(matches(doc! { "address.city": "Oslo" }));
        assert!(matches(doc! { "tags.1": "ops" }));
        assert!(!matches(doc! { "address.city": "Bergen" }));
        assert!(matches(doc! {}));
    }

    #[test]
    fn numbers_compare_across_widths() {
        assert!(matches(doc! { "age": 30_i64 }));
        assert!(matches(doc! { "age": 30.0 }));
        assert!(matches(doc! { "score": { "$gt": 7 } }));
    }

    #[test]
    fn object_ids_compare_by_value() {
        let id = ObjectId::parse_str("68773f19dcfdef2276d06ad6").unwrap();
        assert!(matches(doc! { "_id": id }));
        assert!(matches(doc! { "_id": { "$in": [ObjectId::new(), id] } }));
        assert!(!matches(doc! { "_id": ObjectId::new() }));
    }

    #[test]
    fn comparison_operators() {
        assert!(matches(doc! { "age": { "$gte": 30, "$lt": 31 } }));
        assert!(!matches(doc! { "age": { "$gt": 30 } }));
        assert!(matches(doc! { "age": { "$ne": 31 } }));
        assert!(!matches(doc! { "age": { "$gt": "29" } }));
        assert!(!matches(doc! { "missing": { "$lt": 100 } }));
    }

    #[test]
    fn arrays_match_any_element() {
        assert!(matches(doc! { "tags": "admin" }));
        assert!(matches(doc! { "tags": { "$in": ["ops", "dev"] } }));
        assert!(matches(doc! { "tags": { "$nin": ["dev"] } }));
        assert!(!matches(doc! { "tags": { "$nin": ["ops"] } }));
    }

    #[test]
    fn existence_and_null() {
        assert!(matches(doc! { "age": { "$exists": true } }));
        assert!(matches(doc! { "missing": { "$exists": false } }));
        assert!(matches(doc! { "missing": null }));
        assert!(matches(doc! { "missing": { "$ne": 1 } }));
    }

    #[test]
    fn builder_patterns_are_case_insensitive() {
        assert!(matches(Filter::new().contains("name", "ALICE").build()));
        assert!(matches(Filter::new().starts_with("name", "ali").build()));
        assert!(matches(Filter::new().ends_with("name", "SMITH").build()));
        assert!(!matches(Filter::new().starts_with("name", "smith").build()));
        assert!(!matches(Filter::new().contains("name", "a.i").build()));
    }

    #[test]
    fn logical_operators() {
        assert!(matches(doc! { "$or": [{ "age": 1 }, { "name": "Alice Smith" }] }));
        assert!(!matches(doc! { "$and": [{ "age": 30 }, { "name": "Bob" }] }));
        assert!(matches(doc! { "$nor": [{ "age": 1 }] }));
        assert!(matches(doc! { "age": { "$not": { "$gt": 40 } } }));
    }

    #[test]
    fn unsupported_operators_are_rejected() {
        let person = person();
        let rejects = |filter: Document| FilterMatcher::new(&filter).matches(&person).is_err();

        assert!(rejects(doc! { "$where": "true" }));
        assert!(rejects(doc! { "age": { "$size": 2 } }));
        assert!(rejects(doc! { "$or": [] }));
        assert!(rejects(doc! { "name": { "$regex": "(" } }));
    }

    #[test]
    fn regex_patterns_compile_once_per_filter() {
        let filter = doc! {
            "$or": [
                { "name": { "$regex": "^a", "$options": "i" } },
                { "tags": { "$regex": "^a", "$options": "i" } },
                { "address.city": { "$not": { "$regex": "o" } } },
            ]
        };
        let documents = [
            doc! { "name": "Alice", "address": { "city": "Oslo" } },
            doc! { "name": "bob", "tags": ["admin"], "address": { "city": "Oslo" } },
            doc! { "name": "carl", "address": { "city": "Bergen" } },
            doc! { "name": "dora", "address": { "city": "Oslo" } },
        ];

        let matcher = FilterMatcher::new(&filter);
        let matched = documents
            .iter()
            .filter(|document| matcher.matches(document).unwrap())
            .count();

        assert_eq!(matched, 3);
        assert_eq!(matcher.regexes.len(), 2);
    }

    #[test]
    fn sorts_by_multiple_keys() {
        let mut documents = vec![
            doc! { "n": "c", "age": 2 },
            doc! { "n": "a", "age": 1 },
            doc! { "n": "b", "age": 2 },
            doc! { "n": "d" },
        ];

        sort_documents(&mut documents, &doc! { "age": -1, "n": 1 }).unwrap();
        let names = documents
            .iter()
            .map(|d| d.get_str("n").unwrap())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["b", "c", "a", "d"]);
        assert!(sort_documents(&mut documents, &doc! { "age": "up" }).is_err());
    }
}
