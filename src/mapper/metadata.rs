use super::{Mapper, validate_field};
use crate::data::{Object, put_value, remove_value, to_string};
use crate::error::Result;
use crate::types::{Schema, Schemas};
use serde_json::Value;

/// Key prefix for fields persisted as labels or annotations.
pub const FIELD_DOMAIN: &str = "field.schemapi.io";

fn field_key(field: &str) -> String {
    format!("{}/{}", FIELD_DOMAIN, field)
}

/// Persists a field as an annotation; structured values are JSON-encoded.
pub struct AnnotationField {
    pub field: String,
    pub object: bool,
    pub list: bool,
    pub ignore_definition: bool,
}

impl AnnotationField {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            object: false,
            list: false,
            ignore_definition: false,
        }
    }

    pub fn object(mut self) -> Self {
        self.object = true;
        self
    }

    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    pub fn ignoring_definition(mut self) -> Self {
        self.ignore_definition = true;
        self
    }
}

impl Mapper for AnnotationField {
    fn from_internal(&self, data: &mut Object) {
        let key = field_key(&self.field);
        let Some(value) = remove_value(data, &["annotations", &key]) else {
            return;
        };
        let value = if self.object || self.list {
            match serde_json::from_str::<Value>(&to_string(&value)) {
                Ok(decoded) if (self.object && decoded.is_object()) || (self.list && decoded.is_array()) => decoded,
                _ => {
                    log::warn!("annotation {} does not hold the expected json shape", key);
                    value
                }
            }
        } else {
            value
        };
        data.insert(self.field.clone(), value);
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        if let Some(value) = data.remove(&self.field) {
            let encoded = if self.object || self.list {
                value.to_string()
            } else {
                to_string(&value)
            };
            put_value(data, Value::from(encoded), &["annotations", &field_key(&self.field)]);
        }
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        if self.ignore_definition {
            return Ok(());
        }
        validate_field(&self.field, schema)
    }
}

/// Persists a scalar field as a label.
pub struct LabelField {
    pub field: String,
}

impl LabelField {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Mapper for LabelField {
    fn from_internal(&self, data: &mut Object) {
        if let Some(value) = remove_value(data, &["labels", &field_key(&self.field)]) {
            data.insert(self.field.clone(), value);
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        if let Some(value) = data.remove(&self.field) {
            put_value(
                data,
                Value::from(to_string(&value)),
                &["labels", &field_key(&self.field)],
            );
        }
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        validate_field(&self.field, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::testing::{assert_round_trip_stable, obj};
    use serde_json::json;

    #[test]
    fn annotation_object_is_decoded() {
        let mapper = AnnotationField::new("config").object();
        let mut data = obj(json!({
            "annotations": {"field.schemapi.io/config": "{\"a\":1}", "other": "x"}
        }));
        mapper.from_internal(&mut data);
        assert_eq!(data["config"], json!({"a": 1}));
        assert_eq!(data["annotations"], json!({"other": "x"}));

        mapper.to_internal(&mut data).expect("to_internal");
        assert!(data.get("config").is_none());
        assert_eq!(data["annotations"]["field.schemapi.io/config"], "{\"a\":1}");
    }

    #[test]
    fn annotation_and_label_round_trips() {
        assert_round_trip_stable(
            &AnnotationField::new("description"),
            obj(json!({"annotations": {"field.schemapi.io/description": "hi"}})),
        );
        assert_round_trip_stable(
            &AnnotationField::new("ports").list(),
            obj(json!({"annotations": {"field.schemapi.io/ports": "[80,443]"}})),
        );
        assert_round_trip_stable(
            &LabelField::new("tier"),
            obj(json!({"labels": {"field.schemapi.io/tier": "gold"}})),
        );
    }

    #[test]
    fn label_values_are_stringified() {
        let mapper = LabelField::new("replicas");
        let mut data = obj(json!({"replicas": 3}));
        mapper.to_internal(&mut data).expect("to_internal");
        assert_eq!(data["labels"]["field.schemapi.io/replicas"], "3");
    }
}
