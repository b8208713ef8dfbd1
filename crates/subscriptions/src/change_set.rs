//! Field-level change tracking.
//!
//! A [`ChangeSet`] is built from an ordered list of [`Change`] descriptors and
//! keeps only the fields whose old and new values differ. Values are converted
//! to their displayable form ([`ChangeValue`]) before they enter the set, so the
//! comparison itself only ever sees plain scalars.

use core::fmt;

use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use subtrack_core::ValueObject;

/// Displayable scalar recorded in a change set.
///
/// Equality is strict: values of different variants are never equal, so
/// `Integer(1)` and `Text("1")` count as a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for ChangeValue {
    fn from(value: i64) -> Self {
        ChangeValue::Integer(value)
    }
}

impl From<u32> for ChangeValue {
    fn from(value: u32) -> Self {
        ChangeValue::Integer(i64::from(value))
    }
}

impl From<f64> for ChangeValue {
    fn from(value: f64) -> Self {
        ChangeValue::Float(value)
    }
}

impl From<String> for ChangeValue {
    fn from(value: String) -> Self {
        ChangeValue::Text(value)
    }
}

impl From<&str> for ChangeValue {
    fn from(value: &str) -> Self {
        ChangeValue::Text(value.to_string())
    }
}

/// Dates are recorded as ISO-8601 calendar dates (`YYYY-MM-DD`).
impl From<NaiveDate> for ChangeValue {
    fn from(value: NaiveDate) -> Self {
        ChangeValue::Text(value.format("%Y-%m-%d").to_string())
    }
}

/// One field's current and proposed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub field: String,
    pub current: ChangeValue,
    pub new: ChangeValue,
}

impl Change {
    pub fn new(
        field: impl Into<String>,
        current: impl Into<ChangeValue>,
        new: impl Into<ChangeValue>,
    ) -> Self {
        Self {
            field: field.into(),
            current: current.into(),
            new: new.into(),
        }
    }

    pub fn is_change(&self) -> bool {
        self.current != self.new
    }
}

impl ValueObject for Change {}

/// Old/new pair stored for a changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: ChangeValue,
    pub new: ChangeValue,
}

impl ValueObject for FieldChange {}

/// Ordered mapping from field name to [`FieldChange`].
///
/// Serializes as `{ "<field>": { "old": <scalar>, "new": <scalar> } }` with keys
/// in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    entries: Vec<(String, FieldChange)>,
}

impl ValueObject for ChangeSet {}

impl ChangeSet {
    /// Empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare each descriptor and keep the ones that differ, in input order.
    pub fn build(changes: impl IntoIterator<Item = Change>) -> Self {
        let mut set = Self::new();
        for change in changes {
            if change.is_change() {
                set.insert(change.field, change.current, change.new);
            }
        }
        set
    }

    /// Record a change for `field`, replacing an earlier entry for the same
    /// field in place.
    pub fn insert(&mut self, field: impl Into<String>, old: ChangeValue, new: ChangeValue) {
        let field = field.into();
        let change = FieldChange { old, new };
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = change,
            None => self.entries.push((field, change)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, change)| change)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Changed field names, in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldChange)> {
        self.entries.iter().map(|(name, change)| (name.as_str(), change))
    }
}

impl FromIterator<Change> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        Self::build(iter)
    }
}

impl Serialize for ChangeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, change) in &self.entries {
            map.serialize_entry(field, change)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChangeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChangeSetVisitor;

        impl<'de> Visitor<'de> for ChangeSetVisitor {
            type Value = ChangeSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field name to {old, new}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut set = ChangeSet::new();
                while let Some((field, change)) = access.next_entry::<String, FieldChange>()? {
                    set.insert(field, change.old, change.new);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(ChangeSetVisitor)
    }
}
