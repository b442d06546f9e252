//! Schema-less record model.
//!
//! A [`Record`] is an arbitrary JSON object. The store only understands four
//! optional fields, exposed as typed accessors: `id`, `email`, `token` and
//! `userId`. A collection is either an ordered list of records or a map from
//! string keys to arbitrary JSON values (see [`CollectionData`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::generate_record_id;

/// Well-known field names.
pub mod fields {
    pub const ID: &str = "id";
    pub const EMAIL: &str = "email";
    pub const TOKEN: &str = "token";
    pub const USER_ID: &str = "userId";
}

/// A single document in a list-shaped collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field(fields::ID)
    }

    pub fn email(&self) -> Option<&str> {
        self.str_field(fields::EMAIL)
    }

    pub fn token(&self) -> Option<&str> {
        self.str_field(fields::TOKEN)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.str_field(fields::USER_ID)
    }

    /// Make sure the record carries a non-empty string `id`, generating one
    /// if needed. Returns the id.
    pub fn ensure_id(&mut self) -> String {
        if let Some(id) = self.id().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let id = generate_record_id();
        self.0.insert(fields::ID.to_string(), Value::String(id.clone()));
        id
    }

    /// Shallow merge: every top-level key of `patch` replaces ours.
    pub fn merge(&mut self, patch: Record) {
        for (key, value) in patch.0 {
            self.0.insert(key, value);
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = Value;

    /// Only JSON objects are records; anything else is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// Physical representation of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// Ordered records, indexed by the well-known fields.
    List,
    /// Arbitrary key to value mapping, not indexed.
    Map,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => f.write_str("list"),
            Self::Map => f.write_str("map"),
        }
    }
}

/// Full contents of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CollectionData {
    List(Vec<Record>),
    Map(Map<String, Value>),
}

impl CollectionData {
    /// Empty contents for a shape.
    pub fn empty(shape: Shape) -> Self {
        match shape {
            Shape::List => Self::List(Vec::new()),
            Shape::Map => Self::Map(Map::new()),
        }
    }

    /// Interpret a parsed JSON document as a collection of `shape`.
    ///
    /// Returns a short reason when the document does not fit: an object where
    /// a list was expected, or a list item that is not an object.
    pub fn from_value(shape: Shape, value: Value) -> Result<Self, String> {
        match (shape, value) {
            (Shape::List, Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(pos, item)| {
                    Record::try_from(item).map_err(|_| format!("item {pos} is not an object"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            (Shape::Map, Value::Object(map)) => Ok(Self::Map(map)),
            (shape, other) => Err(format!(
                "expected a {shape} document, found {}",
                json_kind(&other)
            )),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::List(_) => Shape::List,
            Self::Map(_) => Shape::Map,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::List(records) => records.len(),
            Self::Map(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            Self::List(records) => Some(records),
            Self::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::List(_) => None,
            Self::Map(map) => Some(map),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::List(records) => {
                Value::Array(records.iter().cloned().map(Record::into_value).collect())
            }
            Self::Map(map) => Value::Object(map.clone()),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
