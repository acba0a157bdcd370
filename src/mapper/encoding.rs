use super::{Mapper, validate_field};
use crate::data::{Object, put_value, remove_value, split_path, to_string};
use crate::error::Result;
use crate::types::{Schema, Schemas};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

/// Stores a string field base64-encoded in the backend.
pub struct Base64 {
    pub field: String,
    pub separator: String,
    pub ignore_definition: bool,
}

impl Base64 {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            separator: "/".into(),
            ignore_definition: false,
        }
    }

    pub fn ignoring_definition(mut self) -> Self {
        self.ignore_definition = true;
        self
    }
}

impl Mapper for Base64 {
    fn from_internal(&self, data: &mut Object) {
        let path = split_path(&self.field, &self.separator);
        let Some(value) = remove_value(data, &path) else {
            return;
        };
        let encoded = to_string(&value);
        if encoded.is_empty() {
            put_value(data, value, &path);
            return;
        }
        let decoded = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| err.to_string())
            .and_then(|bytes| String::from_utf8(bytes).map_err(|err| err.to_string()));
        match decoded {
            Ok(text) => put_value(data, Value::from(text), &path),
            Err(err) => {
                log::warn!("failed to base64 decode field {}: {}", self.field, err);
                put_value(data, value, &path);
            }
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        let path = split_path(&self.field, &self.separator);
        if let Some(value) = remove_value(data, &path) {
            let text = to_string(&value);
            if text.is_empty() {
                put_value(data, value, &path);
            } else {
                put_value(data, Value::from(STANDARD.encode(text.as_bytes())), &path);
            }
        }
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        if self.ignore_definition {
            return Ok(());
        }
        let root = split_path(&self.field, &self.separator)[0];
        validate_field(root, schema)
    }
}

/// Stores a structured field as a JSON string in the backend.
pub struct JsonEncode {
    pub field: String,
    pub separator: String,
    pub ignore_definition: bool,
}

impl JsonEncode {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            separator: "/".into(),
            ignore_definition: false,
        }
    }

    pub fn ignoring_definition(mut self) -> Self {
        self.ignore_definition = true;
        self
    }
}

impl Mapper for JsonEncode {
    fn from_internal(&self, data: &mut Object) {
        let path = split_path(&self.field, &self.separator);
        let Some(value) = remove_value(data, &path) else {
            return;
        };
        let Value::String(text) = &value else {
            put_value(data, value, &path);
            return;
        };
        match serde_json::from_str::<Value>(text) {
            Ok(decoded) => put_value(data, decoded, &path),
            Err(err) => {
                log::warn!("failed to unmarshal json field {}: {}", self.field, err);
                put_value(data, value, &path);
            }
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        let path = split_path(&self.field, &self.separator);
        match remove_value(data, &path) {
            Some(Value::Null) | None => {}
            Some(value) => put_value(data, Value::from(value.to_string()), &path),
        }
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        if self.ignore_definition {
            return Ok(());
        }
        let root = split_path(&self.field, &self.separator)[0];
        validate_field(root, schema)
    }
}
