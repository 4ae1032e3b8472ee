//! JSON serialization glue shared by the persistence layer.

/// Trait for types that can be serialized to/from JSON strings with specific
/// error handling.
///
/// This provides a consistent interface for JSON operations throughout the
/// engine. The trait is generic over the error type so different modules can
/// surface their own error enums; the persistence module supplies a blanket
/// implementation over [`PersistenceError`](crate::persistence::PersistenceError).
pub trait JsonSerializable<E>: serde::Serialize + for<'de> serde::de::DeserializeOwned {
    /// Serialize this object to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json_string(&self) -> Result<String, E>;

    /// Deserialize an object from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    fn from_json_str(s: &str) -> Result<Self, E>;
}
