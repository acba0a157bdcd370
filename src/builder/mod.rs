//! Validates and coerces raw input against a schema.
//!
//! `construct` produces a fresh map holding only declared fields that apply to
//! the operation, converted to their declared types, defaulted and checked.
//! Unknown input keys are dropped silently.

mod criteria;

pub use criteria::{CharacterRule, FieldCriteria, FieldRule, LengthRule, OptionsRule, RangeRule};

use crate::data::{Object, to_bool, to_f64, to_i64, to_string};
use crate::error::{ApiError, ErrorCode, Result};
use crate::types::definition::{is_array_type, is_map_type, is_reference_type, sub_type};
use crate::types::{Field, ReferenceValidator, Schema, Schemas};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Number, Value};

lazy_static! {
    static ref DNS_LABEL: Regex = Regex::new("^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").unwrap();
}

const MAX_HOSTNAME: usize = 253;

fn is_hostname(text: &str) -> bool {
    text.len() <= MAX_HOSTNAME && text.split('.').all(|label| DNS_LABEL.is_match(label))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    /// Rendering stored data for output.
    List,
}

pub struct Builder<'a> {
    schemas: &'a Schemas,
    reference_validator: Option<&'a dyn ReferenceValidator>,
    criteria: FieldCriteria,
}

impl<'a> Builder<'a> {
    pub fn new(schemas: &'a Schemas) -> Self {
        Self {
            schemas,
            reference_validator: None,
            criteria: FieldCriteria::default(),
        }
    }

    pub fn with_reference_validator(mut self, validator: Option<&'a dyn ReferenceValidator>) -> Self {
        self.reference_validator = validator;
        self
    }

    pub fn construct(&self, schema: &Schema, input: &Object, op: Operation) -> Result<Object> {
        let mut result = self.copy_inputs(schema, input, op)?;
        if op != Operation::List {
            self.check_default_and_required(schema, input, op, &mut result)?;
        }
        Ok(result)
    }

    fn copy_inputs(&self, schema: &Schema, input: &Object, op: Operation) -> Result<Object> {
        let mut result = Object::new();
        for (name, value) in input {
            let Some(field) = schema.resource_fields.get(name) else {
                continue;
            };
            if !field_matches_op(field, op) {
                continue;
            }

            if op != Operation::List && field.has_default() && value.as_str() == Some("") {
                if let Some(default) = &field.default {
                    result.insert(name.clone(), default.clone());
                }
                continue;
            }

            let was_null = value.is_null() && (field.nullable || !field.has_default());
            let converted = self
                .convert(&field.field_type, value, op)
                .map_err(|err| tag_field(err, name))?;

            if converted.is_null() && !was_null {
                continue;
            }
            if op != Operation::List {
                self.check_criteria(name, field, &converted)?;
            }
            result.insert(name.clone(), converted);
        }
        Ok(result)
    }

    fn check_criteria(&self, name: &str, field: &Field, value: &Value) -> Result<()> {
        match value {
            Value::Array(items) if is_array_type(&field.field_type) => {
                for item in items {
                    if item.is_null() {
                        return Err(ApiError::field(
                            ErrorCode::NotNullable,
                            name,
                            "Individual array values can not be null",
                        ));
                    }
                    self.criteria.check(name, field, item)?;
                }
                Ok(())
            }
            other => self.criteria.check(name, field, other),
        }
    }

    fn check_default_and_required(
        &self,
        schema: &Schema,
        input: &Object,
        op: Operation,
        result: &mut Object,
    ) -> Result<()> {
        for (name, field) in &schema.resource_fields {
            if op == Operation::Create && field.has_default() && !input.contains_key(name) {
                if let Some(default) = &field.default {
                    result.insert(name.clone(), default.clone());
                }
            }

            if op != Operation::Create || !field.required {
                continue;
            }
            let missing = match result.get(name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(Value::Array(items)) => items.is_empty(),
                Some(_) => false,
            };
            if missing {
                return Err(ApiError::field(
                    ErrorCode::MissingRequired,
                    name,
                    format!("{} is required", name),
                ));
            }
        }
        Ok(())
    }

    fn convert(&self, field_type: &str, value: &Value, op: Operation) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if is_map_type(field_type) {
            return self.convert_map(sub_type(field_type), value, op);
        }
        if is_array_type(field_type) {
            return self.convert_array(sub_type(field_type), value, op);
        }
        if is_reference_type(field_type) {
            return self.convert_reference(sub_type(field_type), value, op);
        }

        let scalar = single_value(value);
        match field_type {
            "json" => Ok(value.clone()),
            "date" => {
                let text = scalar_string(scalar, field_type)?;
                if op != Operation::List && !text.is_empty() {
                    chrono::DateTime::parse_from_rfc3339(&text).map_err(|_| {
                        ApiError::new(
                            ErrorCode::InvalidDateFormat,
                            format!("invalid date {}", text),
                        )
                    })?;
                }
                Ok(Value::from(text))
            }
            "boolean" => Ok(Value::Bool(to_bool(scalar))),
            "int" => {
                if scalar.as_str() == Some("") {
                    return Ok(Value::Null);
                }
                to_i64(scalar).map(Value::from).ok_or_else(|| {
                    ApiError::new(
                        ErrorCode::InvalidFormat,
                        format!("invalid int {}", to_string(scalar)),
                    )
                })
            }
            "float" => {
                if scalar.as_str() == Some("") {
                    return Ok(Value::Null);
                }
                to_f64(scalar)
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| {
                        ApiError::new(
                            ErrorCode::InvalidFormat,
                            format!("invalid float {}", to_string(scalar)),
                        )
                    })
            }
            "dnsLabel" | "hostname" => {
                let text = scalar_string(scalar, field_type)?;
                let valid = if field_type == "dnsLabel" {
                    DNS_LABEL.is_match(&text)
                } else {
                    is_hostname(&text)
                };
                if op != Operation::List && !text.is_empty() && !valid {
                    return Err(ApiError::new(
                        ErrorCode::InvalidFormat,
                        format!("invalid {} {}", field_type, text),
                    ));
                }
                Ok(Value::from(text))
            }
            "string" | "enum" | "password" | "base64" => {
                scalar_string(scalar, field_type).map(Value::from)
            }
            other => self.convert_nested(other, value, op),
        }
    }

    fn convert_map(&self, item_type: &str, value: &Value, op: Operation) -> Result<Value> {
        let Value::Object(entries) = value else {
            return Err(ApiError::new(
                ErrorCode::InvalidFormat,
                "expected a map value",
            ));
        };
        let mut result = Object::new();
        for (key, item) in entries {
            result.insert(key.clone(), self.convert(item_type, item, op)?);
        }
        Ok(Value::Object(result))
    }

    fn convert_array(&self, item_type: &str, value: &Value, op: Operation) -> Result<Value> {
        let items = match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        let mut result = Vec::with_capacity(items.len());
        for item in &items {
            result.push(self.convert(item_type, item, op)?);
        }
        Ok(Value::Array(result))
    }

    fn convert_reference(&self, target: &str, value: &Value, op: Operation) -> Result<Value> {
        let id = scalar_string(single_value(value), "reference")?;
        if op != Operation::List && !id.is_empty() {
            if let Some(validator) = self.reference_validator {
                if !validator.validate(target, &id) {
                    return Err(ApiError::new(
                        ErrorCode::InvalidReference,
                        format!("Not found type: {} id: {}", target, id),
                    ));
                }
            }
        }
        Ok(Value::from(id))
    }

    fn convert_nested(&self, type_name: &str, value: &Value, op: Operation) -> Result<Value> {
        let schema = self.schemas.schema(type_name).ok_or_else(|| {
            ApiError::new(
                ErrorCode::InvalidType,
                format!("failed to find type {}", type_name),
            )
        })?;
        let Value::Object(input) = value else {
            return Err(ApiError::new(
                ErrorCode::InvalidFormat,
                format!("expected an object of type {}", type_name),
            ));
        };
        self.construct(&schema, input, op).map(Value::Object)
    }
}

fn field_matches_op(field: &Field, op: Operation) -> bool {
    match op {
        Operation::Create => field.create,
        Operation::Update => field.update,
        Operation::List => !field.write_only && field.field_type != "password",
    }
}

/// Form posts deliver every value as a list; scalar fields take the first.
fn single_value(value: &Value) -> &Value {
    match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

fn scalar_string(value: &Value, field_type: &str) -> Result<String> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(ApiError::new(
            ErrorCode::InvalidFormat,
            format!("expected a {} value", field_type),
        )),
        other => Ok(to_string(other)),
    }
}

fn tag_field(err: ApiError, name: &str) -> ApiError {
    if err.field_name.is_some() {
        err
    } else {
        err.with_field(name)
    }
}
