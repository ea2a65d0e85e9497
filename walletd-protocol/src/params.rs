//! Structural parameter validation.
//!
//! Each parameter type declares its fields once. `bind_params` checks the
//! incoming `params` value against that declaration before decoding it, so
//! a malformed request is rejected with the exact offending path and never
//! reaches the wallet.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Expected JSON type of a declared field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// A JSON string.
    String,
    /// A non-negative integer that fits in `u64`.
    Unsigned,
    /// An array of objects, each matching the nested declaration.
    ObjectArray(&'static [FieldSpec]),
}

impl FieldKind {
    fn describe(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Unsigned => "an unsigned integer",
            FieldKind::ObjectArray(_) => "an array of objects",
        }
    }
}

/// A single required field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// A parameter type with a declared structural shape.
pub trait Params: DeserializeOwned {
    /// Required fields; any other field is rejected.
    const FIELDS: &'static [FieldSpec];
}

/// Parameter shape violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("'{0}' must be an object")]
    NotAnObject(String),

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("unexpected field '{0}'")]
    UnexpectedField(String),

    #[error("field '{path}' must be {expected}")]
    WrongType { path: String, expected: &'static str },

    #[error("params could not be decoded: {0}")]
    Decode(String),
}

/// Validates `params` against `P`'s declared fields and decodes it.
pub fn bind_params<P: Params>(params: &Value) -> Result<P, ParamsError> {
    validate(params, P::FIELDS)?;
    serde_json::from_value(params.clone()).map_err(|e| ParamsError::Decode(e.to_string()))
}

/// Validates a top-level `params` value against a field declaration.
pub fn validate(params: &Value, fields: &[FieldSpec]) -> Result<(), ParamsError> {
    match params {
        Value::Object(obj) => validate_object(obj, fields, ""),
        _ => Err(ParamsError::NotAnObject("params".to_string())),
    }
}

fn validate_object(
    obj: &Map<String, Value>,
    fields: &[FieldSpec],
    prefix: &str,
) -> Result<(), ParamsError> {
    for field in fields {
        let path = join_path(prefix, field.name);
        let value = obj
            .get(field.name)
            .ok_or_else(|| ParamsError::MissingField(path.clone()))?;
        validate_field(value, &field.kind, &path)?;
    }

    if let Some(extra) = obj
        .keys()
        .find(|key| !fields.iter().any(|f| f.name == key.as_str()))
    {
        return Err(ParamsError::UnexpectedField(join_path(prefix, extra)));
    }

    Ok(())
}

fn validate_field(value: &Value, kind: &FieldKind, path: &str) -> Result<(), ParamsError> {
    let wrong_type = || ParamsError::WrongType {
        path: path.to_string(),
        expected: kind.describe(),
    };

    match kind {
        FieldKind::String => value.as_str().map(|_| ()).ok_or_else(wrong_type),
        FieldKind::Unsigned => value.as_u64().map(|_| ()).ok_or_else(wrong_type),
        FieldKind::ObjectArray(nested) => {
            let items = value.as_array().ok_or_else(wrong_type)?;
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                match item {
                    Value::Object(obj) => validate_object(obj, nested, &item_path)?,
                    _ => return Err(ParamsError::NotAnObject(item_path)),
                }
            }
            Ok(())
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
