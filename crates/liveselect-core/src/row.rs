//! Row model and identity hashing.
//!
//! A [`Row`] is a JSON object plus two synthetic fields: `_hash`, the MD5
//! of the payload's canonical JSON, and `_index`, the 1-based position in
//! the result set. The synthetic fields live as struct fields and are only
//! merged back into the object form when a row is serialized for a host.
//!
//! Hashing relies on `serde_json::Map` being ordered by key, so the JSON
//! text of a payload is canonical without an extra normalization pass.

use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// Payload columns of a row: a JSON object keyed by column name.
pub type RowData = Map<String, Value>;

// ---------------------------------------------------------------------------
// RowHash
// ---------------------------------------------------------------------------

/// Row identity: the lowercase hex MD5 of the payload's canonical JSON.
///
/// Equal hashes imply equal payloads; the hash is a pure function of the
/// non-synthetic fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct RowHash(String);

impl RowHash {
    /// Computes the hash of a payload object.
    #[must_use]
    pub fn of(data: &RowData) -> Self {
        let canonical =
            serde_json::to_string(data).expect("JSON object encoding does not fail");
        RowHash(format!("{:x}", md5::compute(canonical.as_bytes())))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One row of a live result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    data: RowData,
    hash: RowHash,
    index: u64,
}

impl Row {
    /// Creates a row from payload columns at the given 1-based position.
    #[must_use]
    pub fn new(data: RowData, index: u64) -> Self {
        let hash = RowHash::of(&data);
        Self { data, hash, index }
    }

    /// Payload columns.
    #[must_use]
    pub fn data(&self) -> &RowData {
        &self.data
    }

    /// Row identity hash.
    #[must_use]
    pub fn hash(&self) -> &RowHash {
        &self.hash
    }

    /// 1-based position in the result set.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Looks up a payload column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }

    /// Returns the row repositioned at `index`. The hash is unchanged.
    #[must_use]
    pub fn at_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.data.len() + 2))?;
        for (key, value) in &self.data {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("_hash", &self.hash)?;
        map.serialize_entry("_index", &self.index)?;
        map.end()
    }
}

// ---------------------------------------------------------------------------
// KeySelector
// ---------------------------------------------------------------------------

/// A deterministic `row → key` function tagged with a stable identity.
///
/// The tag participates in the cache identity: two selectors with the same
/// tag are considered equivalent and share a cache. The callable itself is
/// available to hosts that key client-side mirrors by business identity.
#[derive(Clone)]
pub struct KeySelector {
    tag: String,
    select: Arc<dyn Fn(&RowData) -> String + Send + Sync>,
}

impl KeySelector {
    /// Creates a selector from a stable tag and a selection function.
    ///
    /// The function must be deterministic: equal payloads must map to
    /// equal keys across evaluations.
    pub fn new<F>(tag: impl Into<String>, select: F) -> Self
    where
        F: Fn(&RowData) -> String + Send + Sync + 'static,
    {
        Self {
            tag: tag.into(),
            select: Arc::new(select),
        }
    }

    /// Selector extracting a single column as the key.
    ///
    /// Missing columns yield an empty key; non-string values use their
    /// JSON text.
    #[must_use]
    pub fn column(name: &str) -> Self {
        let column = name.to_string();
        Self::new(format!("column:{name}"), move |row| {
            match row.get(&column) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            }
        })
    }

    /// Stable identity tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Applies the selector to a payload.
    #[must_use]
    pub fn key_of(&self, row: &RowData) -> String {
        self.select.as_ref()(row)
    }
}

impl fmt::Debug for KeySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySelector").field("tag", &self.tag).finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
