//! Record, row and query types exchanged with a record store

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::filter::Filter;

/// Pseudo-field that resolves to a record's identifier.
pub const ID_FIELD: &str = "id";

/// Identifies a record without holding it in memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Record type (collection)
    pub record_type: String,
    /// Store-assigned opaque identifier
    pub id: String,
}

impl RecordRef {
    pub fn new(record_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
        }
    }
}

/// A fully materialized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Record {
    /// Create a record with no attributes
    pub fn new(record_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record_type: record_type.into(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(field.into(), value);
        self
    }

    /// Set an attribute, returning the previous value
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(field.into(), value)
    }

    /// Borrow an attribute value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// Resolve a field for filtering or projection.
    ///
    /// `id` resolves to the identifier; anything else is an attribute lookup.
    pub fn value_of(&self, field: &str) -> Option<Value> {
        if field == ID_FIELD {
            return Some(Value::String(self.id.clone()));
        }
        self.attributes.get(field).cloned()
    }

    pub fn reference(&self) -> RecordRef {
        RecordRef::new(&self.record_type, &self.id)
    }

    /// Project the requested fields in order. Absent fields project as null.
    pub fn project(&self, fields: &[String]) -> Row {
        Row::new(
            fields
                .iter()
                .map(|f| self.value_of(f).unwrap_or(Value::Null))
                .collect(),
        )
    }
}

/// A projected result row. Values are ordered as the query's field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// First column as a string, which is how identifier queries are read
    pub fn first_str(&self) -> Option<&str> {
        self.values.first().and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A store query: record type, conjunctive filter, projected fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub record_type: String,
    pub filter: Filter,
    pub fields: Vec<String>,
}

impl Query {
    /// All records of a type, projecting nothing yet
    pub fn all(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            filter: Filter::all(),
            fields: Vec::new(),
        }
    }

    pub fn filtered(record_type: impl Into<String>, filter: Filter) -> Self {
        Self {
            record_type: record_type.into(),
            filter,
            fields: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Same type and filter, projecting only the identifier
    pub fn ids_only(&self) -> Self {
        Self {
            record_type: self.record_type.clone(),
            filter: self.filter.clone(),
            fields: vec![ID_FIELD.to_string()],
        }
    }
}
