//! Normalizes the list shapes different callers send or receive into one
//! ordered sequence of rows.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("unrecognized list envelope: {0}")]
    UnrecognizedShape(String),
    #[error("row {index} could not be decoded: {message}")]
    Row { index: usize, message: String },
}

pub fn decode_rows<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, EnvelopeError> {
    let rows = extract_rows(value)?;
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value(row)
                .map_err(|error| EnvelopeError::Row { index, message: error.to_string() })
        })
        .collect()
}

fn extract_rows(value: Value) -> Result<Vec<Value>, EnvelopeError> {
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut object) => {
            if let Some(rows) = object.remove("rows") {
                return as_array(rows, "rows");
            }
            for key in ["data", "result"] {
                match object.remove(key) {
                    Some(Value::Array(rows)) => return Ok(rows),
                    Some(Value::Object(mut inner)) => {
                        if let Some(rows) = inner.remove("rows") {
                            return as_array(rows, key);
                        }
                        return Err(EnvelopeError::UnrecognizedShape(format!(
                            "`{key}` object has no `rows` field"
                        )));
                    }
                    Some(_) => {
                        return Err(EnvelopeError::UnrecognizedShape(format!(
                            "`{key}` is neither a list nor an object"
                        )))
                    }
                    None => {}
                }
            }
            Err(EnvelopeError::UnrecognizedShape(
                "object has none of `rows`, `data` or `result`".to_owned(),
            ))
        }
        other => Err(EnvelopeError::UnrecognizedShape(format!("expected a list, got {}", kind_of(&other)))),
    }
}

fn as_array(value: Value, field: &str) -> Result<Vec<Value>, EnvelopeError> {
    match value {
        Value::Array(rows) => Ok(rows),
        other => Err(EnvelopeError::UnrecognizedShape(format!(
            "`{field}` holds {} instead of a list",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
