//! Reserved field names of the serialized record format.
//!
//! Records are JSON objects. Fields starting with an underscore are markers
//! owned by the model and store layers; every other field is an attribute.

/// Entity type tag.
pub const TYPE: &str = "_type";
/// Primary identifier as seen by the storage adapter.
pub const ID: &str = "_id";
/// Set on records introducing an entity not yet acknowledged by storage.
pub const NEW: &str = "_new";
/// Set on acknowledgments for identities that were not found.
pub const MISSED: &str = "_missed";
/// Set on acknowledgments for "new" entities that already existed.
pub const EXISTED: &str = "_existed";
/// Payload field of tagged scalar values such as dates.
pub const VALUE: &str = "_value";
/// Type tag of encoded dates: `{"_type": "Date", "_value": "<RFC 3339>"}`.
pub const DATE_TAG: &str = "Date";

/// Returns true for marker fields that never name an attribute.
#[must_use]
pub fn is_marker(field: &str) -> bool {
    field.starts_with('_')
}
