use alloc::{
    collections::btree_map::{self, BTreeMap},
    string::String,
};

use crate::priority::Priority;

pub const PROCESSING_PRIORITY: &str = "ProcessingPriority";
pub const OVERRIDE_PRIORITY: &str = "OverridePriority";
pub const IS_OVERRIDE: &str = "IsOverride";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Priority(Priority),
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Priority> for MetadataValue {
    fn from(value: Priority) -> Self {
        Self::Priority(value)
    }
}

/// Ordered string map attached to a registration.
///
/// Holds the well-known ranking keys ([`PROCESSING_PRIORITY`], [`OVERRIDE_PRIORITY`], [`IS_OVERRIDE`])
/// next to arbitrary extension data. It travels unchanged into [`crate::Lazy`] handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Option<MetadataValue> {
        self.0.insert(key.into(), value.into())
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(MetadataValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(MetadataValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(MetadataValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Integer values are accepted too, so priorities read from plain data still rank.
    #[must_use]
    pub fn get_priority(&self, key: &str) -> Option<Priority> {
        match self.0.get(key) {
            Some(MetadataValue::Priority(value)) => Some(*value),
            Some(MetadataValue::Int(value)) => i32::try_from(*value).ok().map(Priority),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn processing_priority(&self) -> Priority {
        self.get_priority(PROCESSING_PRIORITY).unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn override_priority(&self) -> Priority {
        self.get_priority(OVERRIDE_PRIORITY).unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn is_override(&self) -> bool {
        self.get_bool(IS_OVERRIDE).unwrap_or(false)
    }

    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, String, MetadataValue> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = (&'a String, &'a MetadataValue);
    type IntoIter = btree_map::Iter<'a, String, MetadataValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
