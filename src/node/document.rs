use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document is what clients write. It is stored in the operation log as JSON, so the log itself
/// stays payload-agnostic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub collection: String,
    pub body: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Document body must be a JSON object")]
    NotAnObject,
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Document {
    pub fn new<S: Into<String>>(collection: S, body: Map<String, Value>) -> Self {
        Document {
            collection: collection.into(),
            body,
        }
    }

    /// Build from raw JSON body bytes, as they arrive over the wire.
    pub fn from_json_body<S: Into<String>>(collection: S, body: &[u8]) -> Result<Self, DocumentError> {
        match serde_json::from_slice(body)? {
            Value::Object(body) => Ok(Document::new(collection, body)),
            _ => Err(DocumentError::NotAnObject),
        }
    }

    pub fn body_json(&self) -> Vec<u8> {
        // A `Map<String, Value>` always serializes.
        serde_json::to_vec(&self.body).unwrap_or_default()
    }

    pub(crate) fn to_payload(&self) -> Result<Bytes, DocumentError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, DocumentError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Filter selects documents of one collection whose top-level fields equal every condition.
/// No conditions matches the whole collection, like `find({})`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub collection: String,
    pub conditions: Map<String, Value>,
}

impl Filter {
    pub fn all<S: Into<String>>(collection: S) -> Self {
        Filter {
            collection: collection.into(),
            conditions: Map::new(),
        }
    }

    pub fn new<S: Into<String>>(collection: S, conditions: Map<String, Value>) -> Self {
        Filter {
            collection: collection.into(),
            conditions,
        }
    }

    /// Empty bytes mean no conditions.
    pub fn from_json_conditions<S: Into<String>>(collection: S, conditions: &[u8]) -> Result<Self, DocumentError> {
        if conditions.is_empty() {
            return Ok(Filter::all(collection));
        }
        match serde_json::from_slice(conditions)? {
            Value::Object(conditions) => Ok(Filter::new(collection, conditions)),
            _ => Err(DocumentError::NotAnObject),
        }
    }

    pub fn conditions_json(&self) -> Vec<u8> {
        if self.conditions.is_empty() {
            return vec![];
        }
        serde_json::to_vec(&self.conditions).unwrap_or_default()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.collection == self.collection
            && self
                .conditions
                .iter()
                .all(|(field, expected)| doc.body.get(field) == Some(expected))
    }
}
