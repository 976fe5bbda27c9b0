//! Conversion between structured records and the flat string-field hashes
//! kept in the ephemeral store. Every field value is stored as its JSON text
//! and parsed back on read, so nested arrays and objects survive the trip.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

/// Flat representation written to a hash: field name to JSON text.
pub type HashFields = IndexMap<String, String>;

/// Failures while translating records to or from hash fields.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Only records that serialize to a JSON object can be stored as a hash.
    #[error("record of type `{0}` does not serialize to an object")]
    NotAnObject(&'static str),
    /// A value could not be turned into JSON.
    #[error("failed to encode field `{field}`")]
    Encode {
        /// Field being encoded.
        field: String,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
    /// A stored field does not contain valid JSON.
    #[error("field `{field}` holds malformed JSON")]
    Field {
        /// Field being parsed.
        field: String,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The parsed fields do not assemble into the expected record.
    #[error("stored hash does not match `{record}`")]
    Shape {
        /// Target record type.
        record: &'static str,
        /// Underlying deserializer error.
        #[source]
        source: serde_json::Error,
    },
}

/// Encode a record into hash fields, one JSON document per top-level field.
pub fn encode_fields<T: Serialize>(record: &T) -> Result<HashFields, CodecError> {
    let record_name = std::any::type_name::<T>();
    let value = serde_json::to_value(record).map_err(|source| CodecError::Encode {
        field: record_name.to_owned(),
        source,
    })?;
    let Value::Object(object) = value else {
        return Err(CodecError::NotAnObject(record_name));
    };

    object
        .into_iter()
        .map(|(field, value)| {
            serde_json::to_string(&value)
                .map(|text| (field.clone(), text))
                .map_err(|source| CodecError::Encode { field, source })
        })
        .collect()
}

/// Decode hash fields read from the store back into a record.
///
/// Returns `Ok(None)` for an empty hash, which is how a missing key reads.
pub fn decode_fields<T: DeserializeOwned>(
    fields: HashMap<String, String>,
) -> Result<Option<T>, CodecError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let mut object = Map::with_capacity(fields.len());
    for (field, text) in fields {
        let value = serde_json::from_str::<Value>(&text)
            .map_err(|source| CodecError::Field {
                field: field.clone(),
                source,
            })?;
        object.insert(field, value);
    }

    serde_json::from_value(Value::Object(object))
        .map(Some)
        .map_err(|source| CodecError::Shape {
            record: std::any::type_name::<T>(),
            source,
        })
}
