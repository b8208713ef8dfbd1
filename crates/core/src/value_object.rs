//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are compared by their attribute values.
/// Two field changes naming the same field with the same old/new values are the
/// same change.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
