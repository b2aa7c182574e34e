//! Record codecs
//!
//! A codec binds one record type to its stored payload. The store never
//! inspects payloads itself, so a codec's `decode` is the only place a
//! record shape is checked.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Codec failure with enough context to tell a stale shape from corrupt data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected}, observed {observed}: {detail}")]
pub struct CodecError {
    /// Name of the record type the codec produces
    pub expected: String,
    /// Summary of what the payload actually looked like
    pub observed: String,
    pub detail: String,
}

/// Encode/decode pair for a record type `T`.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, record: &T) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, payload: &[u8]) -> Result<T, CodecError>;

    /// Human-readable name of the record shape, used in error context.
    fn shape(&self) -> &str;
}

/// JSON codec backed by serde.
pub struct JsonCodec<T> {
    shape: &'static str,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            shape: short_type_name::<T>(),
            _record: PhantomData,
        }
    }

    /// Override the shape name reported in errors (e.g. "User v2").
    pub fn named(shape: &'static str) -> Self {
        Self {
            shape,
            _record: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec").field("shape", &self.shape).finish()
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, record: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(record).map_err(|e| CodecError {
            expected: self.shape.to_string(),
            observed: "in-memory value".to_string(),
            detail: e.to_string(),
        })
    }

    fn decode(&self, payload: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError {
            expected: self.shape.to_string(),
            observed: describe_payload(payload),
            detail: e.to_string(),
        })
    }

    fn shape(&self) -> &str {
        self.shape
    }
}

/// Summarize a payload's top-level structure for diagnostics.
pub fn describe_payload(payload: &[u8]) -> String {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object {{{}}}", keys.join(", "))
        }
        Ok(Value::Array(items)) => format!("array[{}]", items.len()),
        Ok(Value::String(_)) => "string".to_string(),
        Ok(Value::Number(_)) => "number".to_string(),
        Ok(Value::Bool(_)) => "bool".to_string(),
        Ok(Value::Null) => "null".to_string(),
        Err(_) => format!("non-JSON payload ({} bytes)", payload.len()),
    }
}

fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    // Keep generic arguments intact, strip the leading module path.
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
