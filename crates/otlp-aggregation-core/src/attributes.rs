//! Timeseries identity helpers.

use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// A scalar attribute value.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int(i64),
    Double(f64),
}

impl AttributeValue {
    // Orders values of different types by a fixed type rank.
    fn rank(&self) -> u8 {
        match self {
            AttributeValue::String(_) => 0,
            AttributeValue::Bool(_) => 1,
            AttributeValue::Int(_) => 2,
            AttributeValue::Double(_) => 3,
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for AttributeValue {}

impl PartialOrd for AttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttributeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (AttributeValue::String(l), AttributeValue::String(r)) => l.cmp(r),
            (AttributeValue::Bool(l), AttributeValue::Bool(r)) => l.cmp(r),
            (AttributeValue::Int(l), AttributeValue::Int(r)) => l.cmp(r),
            (AttributeValue::Double(l), AttributeValue::Double(r)) => l.total_cmp(r),
            (l, r) => l.rank().cmp(&r.rank()),
        }
    }
}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            AttributeValue::String(v) => v.hash(state),
            AttributeValue::Bool(v) => v.hash(state),
            AttributeValue::Int(v) => v.hash(state),
            // Consistent with `total_cmp` equality.
            AttributeValue::Double(v) => v.to_bits().hash(state),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}
impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}
impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}
impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}
impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

/// A single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyValue {
    pub key: String,
    pub value: AttributeValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<AttributeValue>) -> KeyValue {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A hashable, order-independent time series identity.
///
/// Attributes are sorted by key and duplicate keys are removed, keeping the
/// last value given for a key. Cloning is cheap, the attributes are shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeSet {
    attributes: Arc<[KeyValue]>,
}

impl AttributeSet {
    /// Constructs a new timeseries identity from the given attributes.
    pub fn new<T: IntoIterator<Item = KeyValue>>(attributes: T) -> AttributeSet {
        let mut kvs: Vec<KeyValue> = attributes.into_iter().collect();
        // Stable sort keeps insertion order among equal keys, so the last one wins below.
        kvs.sort_by(|l, r| l.key.cmp(&r.key));
        let mut deduped: Vec<KeyValue> = Vec::with_capacity(kvs.len());
        for kv in kvs {
            match deduped.last_mut() {
                Some(last) if last.key == kv.key => *last = kv,
                _ => deduped.push(kv),
            }
        }
        AttributeSet {
            attributes: deduped.into(),
        }
    }

    /// The empty attribute set.
    pub fn empty() -> AttributeSet {
        AttributeSet {
            attributes: Vec::<KeyValue>::new().into(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl Default for AttributeSet {
    fn default() -> Self {
        AttributeSet::empty()
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        AttributeSet::new(iter.into_iter().map(|(k, v)| KeyValue::new(k, v)))
    }
}
