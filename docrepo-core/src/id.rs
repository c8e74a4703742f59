//! Identifier normalization between string forms and the store's native `ObjectId`.
//!
//! Identifiers reach the repository in one of three shapes, captured by [`IdValue`]:
//!
//! - [`IdValue::Native`] - an `ObjectId`, passed through unchanged
//! - [`IdValue::Hex`] - a 24-character hex string
//! - [`IdValue::Wrapped`] - a [`StrObjectId`], the string wrapper applications keep on entities
//!
//! Normalization never fails loudly: a malformed string normalizes to `None`, or to the nil
//! (all-zero) id, which matches no stored document.

use std::{fmt, str::FromStr};

use bson::{Bson, oid::ObjectId};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Returns the nil `ObjectId`, the zero value of the native identifier.
pub fn nil_object_id() -> ObjectId {
    ObjectId::from_bytes([0; 12])
}

/// Extension methods for the native identifier.
pub trait ObjectIdExt {
    /// Returns `true` for the nil (all-zero) id.
    fn is_nil(&self) -> bool;
}

impl ObjectIdExt for ObjectId {
    fn is_nil(&self) -> bool {
        self.bytes() == [0; 12]
    }
}

/// Normalizes `id` to an `ObjectId`, or `None` when it cannot be parsed.
pub fn to_object_id(id: impl Into<IdValue>) -> Option<ObjectId> {
    id.into().to_object_id()
}

/// Normalizes `id` to an `ObjectId`, or the nil id when it cannot be parsed.
pub fn to_object_id_or_zero(id: impl Into<IdValue>) -> ObjectId {
    id.into().to_object_id_or_zero()
}

/// The recognized representations of an entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdValue {
    /// The store's native identifier.
    Native(ObjectId),
    /// The hex encoding of a native identifier.
    Hex(String),
    /// An application string wrapper around the hex encoding.
    Wrapped(StrObjectId),
}

impl IdValue {
    /// Converts to the native identifier.
    ///
    /// A native id is returned unchanged, the nil id included. String forms are parsed and
    /// yield `None` when they are not valid hex ids.
    pub fn to_object_id(&self) -> Option<ObjectId> {
        match self {
            IdValue::Native(id) => Some(*id),
            IdValue::Hex(hex) => ObjectId::parse_str(hex).ok(),
            IdValue::Wrapped(wrapped) => ObjectId::parse_str(wrapped.as_str()).ok(),
        }
    }

    /// Converts to the native identifier, substituting the nil id for unparseable input.
    pub fn to_object_id_or_zero(&self) -> ObjectId {
        self.to_object_id().unwrap_or_else(nil_object_id)
    }

    /// Returns `true` if this identifier is missing, malformed or nil.
    pub fn is_zero(&self) -> bool {
        self.to_object_id().is_none_or(|id| id.is_nil())
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Native(id) => write!(f, "{}", id.to_hex()),
            IdValue::Hex(hex) => f.write_str(hex),
            IdValue::Wrapped(wrapped) => f.write_str(wrapped.as_str()),
        }
    }
}

impl From<ObjectId> for IdValue {
    fn from(id: ObjectId) -> Self {
        IdValue::Native(id)
    }
}

impl From<&ObjectId> for IdValue {
    fn from(id: &ObjectId) -> Self {
        IdValue::Native(*id)
    }
}

impl From<String> for IdValue {
    fn from(hex: String) -> Self {
        IdValue::Hex(hex)
    }
}

impl From<&String> for IdValue {
    fn from(hex: &String) -> Self {
        IdValue::Hex(hex.clone())
    }
}

impl From<&str> for IdValue {
    fn from(hex: &str) -> Self {
        IdValue::Hex(hex.to_string())
    }
}

impl From<StrObjectId> for IdValue {
    fn from(wrapped: StrObjectId) -> Self {
        IdValue::Wrapped(wrapped)
    }
}

impl From<&StrObjectId> for IdValue {
    fn from(wrapped: &StrObjectId) -> Self {
        IdValue::Wrapped(wrapped.clone())
    }
}

/// A native identifier held in its hex string form.
///
/// Serializes as the hex string and deserializes from either a string or a native
/// `ObjectId`, so it round-trips through the primary key field, which repositories always
/// write as a native id. The empty string is the zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrObjectId(String);

impl StrObjectId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        Self::from_object_id(ObjectId::new())
    }

    /// Wraps the hex form of a native identifier.
    pub fn from_object_id(id: ObjectId) -> Self {
        Self(id.to_hex())
    }

    /// Parses a hex string, failing when it is not a valid identifier.
    pub fn parse(value: &str) -> DocumentStoreResult<Self> {
        ObjectId::parse_str(value)
            .map(Self::from_object_id)
            .map_err(|e| DocumentStoreError::InvalidDocument(format!("invalid object id {value:?}: {e}")))
    }

    /// Parses a hex string, substituting the nil id when it is not a valid identifier.
    pub fn from_str_or_zero(value: &str) -> Self {
        Self::from_object_id(to_object_id_or_zero(value))
    }

    /// Returns the native identifier, or the nil id when the wrapped string is malformed.
    pub fn object_id(&self) -> ObjectId {
        to_object_id_or_zero(self)
    }

    /// Returns `true` when empty, malformed or nil.
    pub fn is_zero(&self) -> bool {
        self.0.is_empty() || self.object_id().is_nil()
    }

    /// Returns the wrapped string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StrObjectId {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ObjectId> for StrObjectId {
    fn from(id: ObjectId) -> Self {
        Self::from_object_id(id)
    }
}

impl Serialize for StrObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StrObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Bson::deserialize(deserializer)? {
            Bson::ObjectId(id) => Ok(Self::from_object_id(id)),
            Bson::String(value) if value.trim().is_empty() => Ok(Self::default()),
            Bson::String(value) => Self::parse(value.trim()).map_err(D::Error::custom),
            Bson::Null => Ok(Self::default()),
            other => Err(D::Error::custom(format!(
                "expected an object id or hex string, found {:?}",
                other.element_type()
            ))),
        }
    }
}

/// The identifier capability of an entity.
///
/// Implemented for the identifier field types entities commonly carry: `ObjectId`,
/// `Option<ObjectId>`, [`StrObjectId`] and plain hex `String`s.
pub trait Identifier: Send + Sync {
    /// Returns `true` when no identifier has been assigned yet.
    fn is_zero(&self) -> bool;

    /// Returns the identifier in its own representation.
    fn get_id(&self) -> IdValue;

    /// Assigns an identifier.
    ///
    /// Values that do not normalize to a native id leave the identifier unchanged.
    fn set_id(&mut self, id: IdValue);

    /// Adapts the primary key as stored (always a native id) to the shape this type
    /// deserializes from.
    fn read_primary_key(stored: Bson) -> Bson
    where
        Self: Sized,
    {
        stored
    }
}

impl Identifier for ObjectId {
    fn is_zero(&self) -> bool {
        self.is_nil()
    }

    fn get_id(&self) -> IdValue {
        IdValue::Native(*self)
    }

    fn set_id(&mut self, id: IdValue) {
        if let Some(id) = id.to_object_id() {
            *self = id;
        }
    }
}

impl Identifier for Option<ObjectId> {
    fn is_zero(&self) -> bool {
        self.is_none_or(|id| id.is_nil())
    }

    fn get_id(&self) -> IdValue {
        IdValue::Native(self.unwrap_or_else(nil_object_id))
    }

    fn set_id(&mut self, id: IdValue) {
        if let Some(id) = id.to_object_id() {
            *self = Some(id);
        }
    }
}

impl Identifier for StrObjectId {
    fn is_zero(&self) -> bool {
        StrObjectId::is_zero(self)
    }

    fn get_id(&self) -> IdValue {
        IdValue::Wrapped(self.clone())
    }

    fn set_id(&mut self, id: IdValue) {
        if let Some(id) = id.to_object_id() {
            *self = Self::from_object_id(id);
        }
    }
}

impl Identifier for String {
    fn is_zero(&self) -> bool {
        IdValue::from(self).is_zero()
    }

    fn get_id(&self) -> IdValue {
        IdValue::Hex(self.clone())
    }

    fn set_id(&mut self, id: IdValue) {
        if let Some(id) = id.to_object_id() {
            *self = id.to_hex();
        }
    }

    fn read_primary_key(stored: Bson) -> Bson {
        match stored {
            Bson::ObjectId(id) => Bson::String(id.to_hex()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "68773f19dcfdef2276d06ad6";

    #[test]
    fn native_id_passes_through() {
        let id = ObjectId::new();
        assert_eq!(to_object_id(id), Some(id));
        assert_eq!(to_object_id(nil_object_id()), Some(nil_object_id()));
    }

    #[test]
    fn hex_string_is_parsed() {
        let id = to_object_id(HEX).unwrap();
        assert_eq!(id.to_hex(), HEX);
        assert_eq!(to_object_id(StrObjectId::parse(HEX).unwrap()), Some(id));
    }

    #[test]
    fn malformed_string_normalizes_to_zero() {
        assert_eq!(to_object_id("not-hex"), None);
        assert_eq!(to_object_id_or_zero("not-hex"), nil_object_id());
        assert!(to_object_id_or_zero("not-hex").is_nil());
        assert!(IdValue::from("").is_zero());
    }

    #[test]
    fn str_object_id_zero_values() {
        assert!(StrObjectId::default().is_zero());
        assert!(StrObjectId::from_str_or_zero("garbage").is_zero());
        assert!(StrObjectId::from_object_id(nil_object_id()).is_zero());
        assert!(!StrObjectId::new().is_zero());
        assert!(StrObjectId::parse("garbage").is_err());
        assert!("garbage".parse::<StrObjectId>().is_err());
    }

    #[test]
    fn str_object_id_deserializes_from_native_or_string() {
        let id = ObjectId::parse_str(HEX).unwrap();

        let from_native: StrObjectId = bson::de::deserialize_from_bson(Bson::ObjectId(id)).unwrap();
        assert_eq!(from_native.as_str(), HEX);

        let from_string: StrObjectId = serde_json::from_str(&format!("\"{HEX}\"")).unwrap();
        assert_eq!(from_string, from_native);

        assert!(serde_json::from_str::<StrObjectId>("\"nope\"").is_err());
        assert_eq!(serde_json::to_string(&from_native).unwrap(), format!("\"{HEX}\""));
    }

    #[test]
    fn set_id_ignores_invalid_input() {
        let mut native = nil_object_id();
        native.set_id("not-hex".into());
        assert!(Identifier::is_zero(&native));
        native.set_id(HEX.into());
        assert_eq!(native.to_hex(), HEX);

        let mut optional: Option<ObjectId> = None;
        optional.set_id("bogus".into());
        assert_eq!(optional, None);
        optional.set_id(IdValue::Native(native));
        assert_eq!(optional, Some(native));

        let mut wrapped = StrObjectId::default();
        wrapped.set_id("bogus".into());
        assert!(Identifier::is_zero(&wrapped));
        wrapped.set_id(native.into());
        assert_eq!(wrapped.as_str(), HEX);

        let mut plain = String::new();
        plain.set_id("bogus".into());
        assert!(plain.is_empty());
        plain.set_id(native.into());
        assert_eq!(plain, HEX);
    }

    #[test]
    fn plain_string_ids_read_back_as_hex() {
        let id = ObjectId::parse_str(HEX).unwrap();
        assert_eq!(String::read_primary_key(Bson::ObjectId(id)), Bson::String(HEX.into()));
        assert_eq!(ObjectId::read_primary_key(Bson::ObjectId(id)), Bson::ObjectId(id));
    }

    #[test]
    fn get_id_keeps_representation() {
        let id = ObjectId::parse_str(HEX).unwrap();
        assert_eq!(id.get_id(), IdValue::Native(id));
        assert_eq!(StrObjectId::from(id).get_id().to_string(), HEX);
        assert_eq!(HEX.to_string().get_id(), IdValue::Hex(HEX.to_string()));
    }
}
