//! Core traits for entities stored by a repository.
//!
//! This module provides the [`Entity`] trait that every persisted type implements, and
//! [`EntityExt`] for converting entities to and from the documents drivers exchange.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    id::{IdValue, Identifier},
    sort::PRIMARY_KEY,
};

/// Core trait that all entities stored in a repository must implement.
///
/// An entity exposes a mutable identifier and names the collection it lives in. The
/// identifier field must serialize under the primary key `_id`, which repositories always
/// store as a native `ObjectId` whatever the field's own type.
///
/// # Deriving with `#[derive(Entity)]`
///
/// The derive picks the field marked `#[entity(id)]`, or else the field named `id` or `_id`.
/// The collection name defaults to the snake_case form of the type name and can be set
/// with `#[entity(collection = "...")]`.
///
/// # Example
///
/// ```ignore
/// use docrepo::{Entity, id::StrObjectId};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
/// pub struct UserAccount {
///     #[serde(rename = "_id")]
///     pub id: StrObjectId,
///     pub name: String,
/// }
///
/// assert_eq!(UserAccount::collection_name(), "user_account");
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The identifier type carried by this entity.
    type Id: Identifier;

    /// Returns a reference to this entity's identifier.
    fn id(&self) -> &Self::Id;

    /// Returns a mutable reference to this entity's identifier.
    fn id_mut(&mut self) -> &mut Self::Id;

    /// Returns the name of the collection this entity belongs to.
    fn collection_name() -> &'static str;
}

/// Extension trait providing document conversions for entities.
///
/// This trait is automatically implemented for all types that implement [`Entity`].
pub trait EntityExt: Entity {
    /// Returns this entity's identifier in its own representation.
    fn id_value(&self) -> IdValue;

    /// Converts this entity to a document, with `_id` set to the native identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the entity does not serialize to a map.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Creates an entity from a stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_document(document: Document) -> DocumentStoreResult<Self>;

    /// Converts this entity to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates an entity from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<E: Entity> EntityExt for E {
    fn id_value(&self) -> IdValue {
        self.id().get_id()
    }

    fn to_document(&self) -> DocumentStoreResult<Document> {
        let Bson::Document(mut document) = serialize_to_bson(self)? else {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "entity of collection {} does not serialize to a document",
                E::collection_name()
            )));
        };

        document.insert(PRIMARY_KEY, self.id_value().to_object_id_or_zero());
        Ok(document)
    }

    fn from_document(mut document: Document) -> DocumentStoreResult<Self> {
        if let Some(stored) = document.remove(PRIMARY_KEY) {
            document.insert(PRIMARY_KEY, E::Id::read_primary_key(stored));
        }

        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId};
    use serde::Deserialize;

    use super::*;
    use crate::id::StrObjectId;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        #[serde(rename = "_id")]
        id: StrObjectId,
        label: String,
    }

    impl Entity for Tag {
        type Id = StrObjectId;

        fn id(&self) -> &StrObjectId {
            &self.id
        }

        fn id_mut(&mut self) -> &mut StrObjectId {
            &mut self.id
        }

        fn collection_name() -> &'static str {
            "tag"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(rename = "_id")]
        id: String,
        body: String,
    }

    impl Entity for Note {
        type Id = String;

        fn id(&self) -> &String {
            &self.id
        }

        fn id_mut(&mut self) -> &mut String {
            &mut self.id
        }

        fn collection_name() -> &'static str {
            "note"
        }
    }

    #[test]
    fn primary_key_is_stored_as_native_id() {
        let oid = ObjectId::new();
        let tag = Tag { id: oid.into(), label: "rust".into() };

        let document = tag.to_document().unwrap();
        assert_eq!(document, doc! { "_id": oid, "label": "rust" });
        assert_eq!(Tag::from_document(document).unwrap(), tag);
    }

    #[test]
    fn string_ids_round_trip_through_native_primary_key() {
        let oid = ObjectId::new();
        let note = Note { id: oid.to_hex(), body: "hello".into() };

        let document = note.to_document().unwrap();
        assert_eq!(document.get_object_id("_id").unwrap(), oid);
        assert_eq!(Note::from_document(document).unwrap(), note);
    }

    #[test]
    fn json_conversion_uses_hex_ids() {
        let tag = Tag { id: StrObjectId::new(), label: "db".into() };
        let value = tag.to_json().unwrap();

        assert_eq!(value["_id"], tag.id.as_str());
        assert_eq!(Tag::from_json(value).unwrap(), tag);
    }
}
