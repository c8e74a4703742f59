//! Update operators for in-memory documents.
//!
//! Supports `$set`, `$unset`, `$inc`, `$push` and `$setOnInsert`. Paths may be dotted; `$set`
//! and `$inc` create missing embedded documents on the way. The primary key is immutable.

use bson::{Bson, Document};

use docrepo_core::error::{DocumentStoreError, DocumentStoreResult};

const PRIMARY_KEY: &str = "_id";

/// Checks that `update` is a non-empty document of supported operators.
pub(crate) fn validate(update: &Document) -> DocumentStoreResult<()> {
    if update.is_empty() {
        return Err(invalid("update document must not be empty"));
    }

    for (operator, fields) in update {
        match operator.as_str() {
            "$set" | "$unset" | "$inc" | "$push" | "$setOnInsert" => {}
            other if other.starts_with('$') => {
                return Err(invalid(format!("unsupported update operator {other}")));
            }
            other => {
                return Err(invalid(format!(
                    "update document field {other} is not an operator; use a replacement instead"
                )));
            }
        }

        if !matches!(fields, Bson::Document(_)) {
            return Err(invalid(format!("{operator} expects a document")));
        }
    }

    Ok(())
}

/// Checks that `replacement` is a plain document without update operators.
pub(crate) fn validate_replacement(replacement: &Document) -> DocumentStoreResult<()> {
    match replacement.keys().find(|key| key.starts_with('$')) {
        Some(key) => Err(invalid(format!("replacement document must not contain operator {key}"))),
        None => Ok(()),
    }
}

/// Applies a validated update to `document`.
///
/// `inserting` is set when the document is being created by an upsert, which enables
/// `$setOnInsert`.
pub(crate) fn apply(
    document: &mut Document,
    update: &Document,
    inserting: bool,
) -> DocumentStoreResult<()> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(invalid(format!("{operator} expects a document")));
        };

        for (path, value) in fields {
            if is_primary_key(path) {
                guard_primary_key(document, operator, value, inserting)?;
            }

            match operator.as_str() {
                "$set" => set(document, path, value.clone())?,
                "$setOnInsert" if inserting => set(document, path, value.clone())?,
                "$setOnInsert" => {}
                "$unset" => unset(document, path),
                "$inc" => increment(document, path, value)?,
                "$push" => push(document, path, value.clone())?,
                other => return Err(invalid(format!("unsupported update operator {other}"))),
            }
        }
    }

    Ok(())
}

fn is_primary_key(path: &str) -> bool {
    path == PRIMARY_KEY || path.starts_with("_id.")
}

fn guard_primary_key(
    document: &Document,
    operator: &str,
    value: &Bson,
    inserting: bool,
) -> DocumentStoreResult<()> {
    let unchanged = matches!(operator, "$set" | "$setOnInsert")
        && document.get(PRIMARY_KEY).is_none_or(|current| current == value);

    if unchanged || (inserting && !document.contains_key(PRIMARY_KEY)) {
        return Ok(());
    }

    Err(invalid(format!("{operator} would modify the immutable field {PRIMARY_KEY}")))
}

fn set(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    let Some((head, rest)) = path.split_once('.') else {
        document.insert(path, value);
        return Ok(());
    };

    if !document.contains_key(head) {
        document.insert(head, Document::new());
    }

    match document.get_mut(head) {
        Some(Bson::Document(inner)) => set(inner, rest, value),
        _ => Err(invalid(format!("cannot set {path}: {head} is not a document"))),
    }
}

fn unset(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset(inner, rest);
            }
        }
    }
}

fn increment(document: &mut Document, path: &str, amount: &Bson) -> DocumentStoreResult<()> {
    let current = crate::evaluator::lookup(document, path).cloned();

    let sum = match (current, amount) {
        (None, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => amount.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(i64::from(a) + i64::from(*b))),
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(i64::from(a).saturating_add(*b)),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(a.saturating_add(i64::from(*b))),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(a.saturating_add(*b)),
        (Some(Bson::Double(a)), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Some(Bson::Double(a)), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Some(Bson::Double(a)), Bson::Double(b)) => Bson::Double(a + b),
        (Some(Bson::Int32(a)), Bson::Double(b)) => Bson::Double(f64::from(a) + b),
        (Some(Bson::Int64(a)), Bson::Double(b)) => Bson::Double(a as f64 + b),
        _ => return Err(invalid(format!("$inc requires numeric values at {path}"))),
    };

    set(document, path, sum)
}

fn push(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match crate::evaluator::lookup(document, path) {
        None => set(document, path, Bson::Array(vec![value])),
        Some(Bson::Array(items)) => {
            let mut items = items.clone();
            items.push(value);
            set(document, path, Bson::Array(items))
        }
        Some(_) => Err(invalid(format!("$push requires an array at {path}"))),
    }
}

fn invalid(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn set_creates_nested_documents() {
        let mut document = doc! { "name": "a" };
        apply(&mut document, &doc! { "$set": { "address.city": "Oslo", "name": "b" } }, false)
            .unwrap();
        assert_eq!(document, doc! { "name": "b", "address": { "city": "Oslo" } });
    }

    #[test]
    fn unset_removes_fields() {
        let mut document = doc! { "a": 1, "b": { "c": 2, "d": 3 } };
        apply(&mut document, &doc! { "$unset": { "a": "", "b.c": "" } }, false).unwrap();
        assert_eq!(document, doc! { "b": { "d": 3 } });
    }

    #[test]
    fn inc_adds_and_widens() {
        let mut document = doc! { "n": i32::MAX, "f": 1.5 };
        apply(&mut document, &doc! { "$inc": { "n": 1, "f": 1, "new": 5 } }, false).unwrap();

        assert_eq!(document.get("n"), Some(&Bson::Int64(i64::from(i32::MAX) + 1)));
        assert_eq!(document.get("f"), Some(&Bson::Double(2.5)));
        assert_eq!(document.get("new"), Some(&Bson::Int32(5)));

        let mut text = doc! { "s": "x" };
        assert!(apply(&mut text, &doc! { "$inc": { "s": 1 } }, false).is_err());
    }

    #[test]
    fn push_appends() {
        let mut document = doc! { "tags": ["a"] };
        apply(&mut document, &doc! { "$push": { "tags": "b", "other": 1 } }, false).unwrap();
        assert_eq!(document, doc! { "tags": ["a", "b"], "other": [1] });
    }

    #[test]
    fn set_on_insert_only_applies_when_inserting() {
        let update = doc! { "$setOnInsert": { "created": true } };

        let mut existing = doc! {};
        apply(&mut existing, &update, false).unwrap();
        assert!(existing.is_empty());

        let mut inserted = doc! {};
        apply(&mut inserted, &update, true).unwrap();
        assert_eq!(inserted, doc! { "created": true });
    }

    #[test]
    fn primary_key_is_immutable() {
        let id = ObjectId::new();
        let mut document = doc! { "_id": id };

        assert!(apply(&mut document, &doc! { "$set": { "_id": id } }, false).is_ok());
        assert!(apply(&mut document, &doc! { "$set": { "_id": ObjectId::new() } }, false).is_err());
        assert!(apply(&mut document, &doc! { "$unset": { "_id": "" } }, false).is_err());
    }

    #[test]
    fn validation_rejects_replacements_and_unknown_operators() {
        assert!(validate(&doc! {}).is_err());
        assert!(validate(&doc! { "name": "x" }).is_err());
        assert!(validate(&doc! { "$rename": { "a": "b" } }).is_err());
        assert!(validate(&doc! { "$set": 1 }).is_err());
        assert!(validate(&doc! { "$set": { "a": 1 } }).is_ok());

        assert!(validate_replacement(&doc! { "a": 1 }).is_ok());
        assert!(validate_replacement(&doc! { "$set": { "a": 1 } }).is_err());
    }
}
