//! Store documents and their field values.
//!
//! A [`Document`] is what the remote store hands back inside a snapshot: a
//! store-assigned [`DocumentId`] plus a flat map of named [`FieldValue`]s.
//! Records such as [`Task`](crate::task::Task) are decoded from it.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number, Value};

use crate::DecodeError;
use crate::timestamp::StoreTimestamp;

/// Field map of a document, ordered by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// Identifier the store assigns to a document on creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap a raw store identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single field value as the document store represents it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Explicit `null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integral number (epoch millis are stored this way).
    Integer(i64),
    /// Non-integral number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Array of strings (membership lists).
    StringArray(Vec<String>),
    /// Store-native timestamp.
    Timestamp(StoreTimestamp),
}

impl FieldValue {
    /// Name of the value kind, used in decode errors and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::StringArray(_) => "string array",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Convert a JSON value into a field value.
    ///
    /// Objects of the shape `{"seconds": .., "nanoseconds": ..}` (with or
    /// without leading underscores, as store exports write them) become
    /// [`FieldValue::Timestamp`]. Arrays must contain only strings.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnsupportedJson`] for nested objects, mixed
    /// arrays, and numbers outside the `i64`/`f64` range.
    pub fn from_json(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => number_to_field(&n),
            Value::String(s) => Ok(Self::String(s)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(DecodeError::UnsupportedJson(format!(
                        "array element {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::StringArray),
            Value::Object(map) => timestamp_from_object(&map).map(Self::Timestamp),
        }
    }

    /// Convert this value into JSON, the inverse of [`from_json`](Self::from_json).
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(n) => Value::Number((*n).into()),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::StringArray(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            Self::Timestamp(ts) => {
                let mut map = Map::new();
                map.insert("seconds".to_string(), Value::Number(ts.seconds.into()));
                map.insert("nanoseconds".to_string(), Value::Number(ts.nanos.into()));
                Value::Object(map)
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<StoreTimestamp> for FieldValue {
    fn from(value: StoreTimestamp) -> Self {
        Self::Timestamp(value)
    }
}

fn number_to_field(n: &Number) -> Result<FieldValue, DecodeError> {
    if let Some(i) = n.as_i64() {
        return Ok(FieldValue::Integer(i));
    }
    n.as_f64()
        .map(FieldValue::Float)
        .ok_or_else(|| DecodeError::UnsupportedJson(format!("number {n}")))
}

fn timestamp_from_object(map: &Map<String, Value>) -> Result<StoreTimestamp, DecodeError> {
    let field = |name: &str| map.get(name).or_else(|| map.get(&format!("_{name}")));
    let seconds = field("seconds").and_then(Value::as_i64);
    let nanos = field("nanoseconds")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());
    match (seconds, nanos) {
        (Some(seconds), Some(nanos)) => Ok(StoreTimestamp::new(seconds, nanos)),
        _ => Err(DecodeError::UnsupportedJson(format!(
            "object {}",
            Value::Object(map.clone())
        ))),
    }
}

/// A document as delivered inside a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Store-assigned identifier.
    pub id: DocumentId,
    /// Field map.
    pub fields: Fields,
}

impl Document {
    /// Create a document from an id and its fields.
    #[must_use]
    pub const fn new(id: DocumentId, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Look up a field, treating explicit `null` the same as absence.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        match self.fields.get(name) {
            None | Some(FieldValue::Null) => None,
            Some(value) => Some(value),
        }
    }

    /// Read an optional string field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::WrongType`] if the field is present but not a string.
    pub fn get_str(&self, name: &'static str) -> Result<Option<&str>, DecodeError> {
        match self.get(name) {
            None => Ok(None),
            Some(FieldValue::String(s)) => Ok(Some(s)),
            Some(_) => Err(DecodeError::WrongType {
                field: name,
                expected: "string",
            }),
        }
    }

    /// Read a required string field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingField`] when absent, or
    /// [`DecodeError::WrongType`] when not a string.
    pub fn require_str(&self, name: &'static str) -> Result<&str, DecodeError> {
        self.get_str(name)?.ok_or(DecodeError::MissingField(name))
    }

    /// Build a document from a JSON object of fields.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnsupportedJson`] if `fields` is not an object
    /// or any value has no field-value equivalent.
    pub fn from_json(id: DocumentId, fields: Value) -> Result<Self, DecodeError> {
        let Value::Object(map) = fields else {
            return Err(DecodeError::UnsupportedJson(format!(
                "document {id} is not an object"
            )));
        };
        let fields = map
            .into_iter()
            .map(|(name, value)| FieldValue::from_json(value).map(|v| (name, v)))
            .collect::<Result<Fields, _>>()?;
        Ok(Self { id, fields })
    }

    /// Render the field map as a JSON object.
    #[must_use]
    pub fn fields_to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}
