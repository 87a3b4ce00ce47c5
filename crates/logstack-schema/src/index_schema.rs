use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexSchemaError {
    #[error("index schema is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("index schema must be a JSON object")]
    NotAnObject,
    #[error("index schema has no string field 'index_id'")]
    MissingIndexId,
    #[error("invalid index_id '{0}': expected a letter followed by 2-254 of [a-zA-Z0-9_.-]")]
    InvalidIndexId(String),
}

/// Declared schema document of a search index.
///
/// The document is sent verbatim as the body of the index creation call, so
/// it is kept as raw JSON. Only the fields the orchestrator relies on are
/// checked: it must be an object carrying a well-formed `index_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema(Value);

impl IndexSchema {
    pub fn from_value(value: Value) -> Result<Self, IndexSchemaError> {
        let Value::Object(ref map) = value else {
            return Err(IndexSchemaError::NotAnObject);
        };
        let id = map
            .get("index_id")
            .and_then(Value::as_str)
            .ok_or(IndexSchemaError::MissingIndexId)?;
        validate_index_id(id)?;
        Ok(Self(value))
    }

    pub fn parse_json(input: &str) -> Result<Self, IndexSchemaError> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| IndexSchemaError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn index_id(&self) -> &str {
        self.0
            .get("index_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn document(&self) -> &Value {
        &self.0
    }

    pub fn timestamp_field(&self) -> Option<&str> {
        self.0.pointer("/doc_mapping/timestamp_field")?.as_str()
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.0.pointer("/doc_mapping/partition_key")?.as_str()
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }

    /// Schema for indexes fed with the container log wire format
    /// (see [`crate::ingest::LogRecord`]).
    pub fn log_template(index_id: &str) -> Result<Self, IndexSchemaError> {
        validate_index_id(index_id)?;
        let raw_fast = |name: &str| {
            json!({
                "name": name,
                "type": "text",
                "indexed": true,
                "stored": true,
                "fast": { "normalizer": "raw" }
            })
        };
        Self::from_value(json!({
            "version": "0.9",
            "index_id": index_id,
            "doc_mapping": {
                "mode": "dynamic",
                "field_mappings": [
                    {
                        "name": "time",
                        "type": "datetime",
                        "indexed": true,
                        "stored": true,
                        "fast": true,
                        "input_formats": ["rfc3339"],
                        "output_format": "rfc3339"
                    },
                    raw_fast("container_id"),
                    raw_fast("container_name"),
                    raw_fast("stream"),
                    {
                        "name": "log",
                        "type": "text",
                        "indexed": true,
                        "stored": true
                    }
                ],
                "timestamp_field": "time",
                "partition_key": "container_id",
                "max_num_partitions": 200
            },
            "indexing_settings": { "commit_timeout_secs": 60 },
            "ingest_settings": { "min_shards": 1 }
        }))
    }

    /// Names of the explicitly mapped fields, in declaration order.
    pub fn mapped_fields(&self) -> Vec<&str> {
        self.0
            .pointer("/doc_mapping/field_mappings")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| f.get("name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Index ids follow the search engine's naming rule.
pub fn validate_index_id(id: &str) -> Result<(), IndexSchemaError> {
    let mut bytes = id.bytes();
    let starts_with_letter = bytes.next().is_some_and(|b| b.is_ascii_alphabetic());
    let valid = starts_with_letter
        && (3..=255).contains(&id.len())
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(IndexSchemaError::InvalidIndexId(id.to_owned()))
    }
}

impl Serialize for IndexSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IndexSchema {
    /// Accepts either an inline document or a string holding JSON text.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let result = match value {
            Value::String(text) => Self::parse_json(&text),
            other => Self::from_value(other),
        };
        result.map_err(serde::de::Error::custom)
    }
}

impl From<IndexSchema> for Map<String, Value> {
    fn from(schema: IndexSchema) -> Self {
        match schema.0 {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}
