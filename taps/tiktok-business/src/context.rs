//! Partition contexts and the records they scope.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// One emitted row: field name to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Partition key carrying the business account id.
pub const BUSINESS_ID: &str = "business_id";
/// Partition key carrying the video id.
pub const VIDEO_ID: &str = "video_id";

/// An ordered partition descriptor that scopes one pagination sequence.
///
/// Contexts are immutable once built; deriving a child context produces a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Context(IndexMap<String, String>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this context with `key` set to `value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.0.insert(key.into(), value.into());
        next
    }

    pub fn for_business(business_id: impl Into<String>) -> Self {
        Self::new().with(BUSINESS_ID, business_id)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn business_id(&self) -> Option<&str> {
        self.get(BUSINESS_ID)
    }

    pub fn video_id(&self) -> Option<&str> {
        self.get(VIDEO_ID)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every partition key of this context onto `record`.
    ///
    /// Context values win over any same-named field the API returned, so downstream joins
    /// always see the partition the record was fetched under.
    pub fn annotate(&self, record: &mut Record) {
        for (key, value) in self.iter() {
            record.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}
