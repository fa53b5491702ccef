//! Deserialisation and validation of JSON message payloads

use crate::error::TransformerError;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use validator::Validate;

/// A JSON payload that has been deserialised and then validated using the validator crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T> ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
{
    /// Deserialise and validate a `T` from the bytes of a message body.
    ///
    /// The body must be a JSON object. It is also returned as received, including any fields
    /// that `T` does not know about.
    pub fn from_slice(body: &[u8]) -> Result<(Self, Map<String, Value>), TransformerError> {
        let object: Map<String, Value> =
            serde_json::from_slice(body).map_err(TransformerError::RequestJson)?;
        let value: T = serde_json::from_value(Value::Object(object.clone()))
            .map_err(TransformerError::RequestJson)?;
        value.validate()?;
        Ok((ValidatedJson(value), object))
    }
}
