use super::fields::validate_internal_field;
use super::{Mapper, mapping_error, validate_field};
use crate::data::{Object, to_value_slice};
use crate::error::Result;
use crate::types::definition::{is_array_type, sub_type};
use crate::types::{Schema, Schemas};
use serde_json::Value;

/// Concatenates several list fields into one.
///
/// Values already present are not repeated, so merging into one of the
/// source fields stays stable across round trips.
pub struct SliceMerge {
    pub from: Vec<String>,
    pub to: String,
    pub ignore_definition: bool,
}

impl SliceMerge {
    pub fn new<I, S>(from: I, to: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from: from.into_iter().map(Into::into).collect(),
            to: to.into(),
            ignore_definition: false,
        }
    }
}

impl Mapper for SliceMerge {
    fn from_internal(&self, data: &mut Object) {
        let mut merged: Vec<Value> = Vec::new();
        let mut found = false;
        for name in &self.from {
            let Some(value) = data.get(name) else {
                continue;
            };
            found = true;
            for item in to_value_slice(value) {
                if !merged.contains(&item) {
                    merged.push(item);
                }
            }
        }
        if found {
            data.insert(self.to.clone(), Value::Array(merged));
        }
    }

    fn to_internal(&self, _data: &mut Object) -> Result<()> {
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        if self.ignore_definition {
            return Ok(());
        }
        for from in &self.from {
            validate_field(from, schema)?;
        }
        validate_field(&self.to, schema)?;
        for from in &self.from {
            if from != &self.to {
                schema.resource_fields.remove(from);
            }
        }
        Ok(())
    }
}

/// Presents a list of keyed objects as a map from key to object.
pub struct SliceToMap {
    pub field: String,
    pub key: String,
}

impl SliceToMap {
    pub fn new(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            key: key.into(),
        }
    }
}

impl Mapper for SliceToMap {
    fn from_internal(&self, data: &mut Object) {
        let Some(Value::Array(items)) = data.get(&self.field) else {
            return;
        };
        let mut result = Object::new();
        for item in items {
            if let Value::Object(mut entry) = item.clone() {
                let name = entry
                    .remove(&self.key)
                    .map(|v| crate::data::to_string(&v))
                    .unwrap_or_default();
                result.insert(name, Value::Object(entry));
            }
        }
        if !result.is_empty() {
            data.insert(self.field.clone(), Value::Object(result));
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        let Some(Value::Object(entries)) = data.get(&self.field) else {
            return Ok(());
        };
        let mut result = Vec::with_capacity(entries.len());
        for (name, item) in entries {
            if let Value::Object(mut entry) = item.clone() {
                entry.insert(self.key.clone(), Value::from(name.clone()));
                result.push(Value::Object(entry));
            }
        }
        if !result.is_empty() {
            data.insert(self.field.clone(), Value::Array(result));
        }
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        let internal = validate_internal_field(&self.field, schema)?;
        let field = &internal.resource_fields[&self.field];
        if !is_array_type(&field.field_type) {
            return Err(mapping_error(format!(
                "field {} on {} is not an array",
                self.field, internal.id
            )));
        }
        let mut field = field.clone();
        field.field_type = format!("map[{}]", sub_type(&field.field_type));
        schema.resource_fields.insert(self.field.clone(), field);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::testing::{assert_round_trip_stable, obj};
    use crate::types::Field;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn slice_merge_concatenates_sources() {
        let mapper = SliceMerge::new(["publicEndpoints", "extraEndpoints"], "publicEndpoints");
        let mut data = obj(json!({"publicEndpoints": ["a"], "extraEndpoints": ["b", "a"]}));
        mapper.from_internal(&mut data);
        assert_eq!(data["publicEndpoints"], json!(["a", "b"]));

        assert_round_trip_stable(
            &mapper,
            obj(json!({"publicEndpoints": ["a"], "extraEndpoints": ["b"]})),
        );
    }

    #[test]
    fn slice_merge_removes_merged_fields_from_schema() {
        let mut schema = Schema::new("service")
            .with_field("a", Field::new("array[string]"))
            .with_field("b", Field::new("array[string]"));
        SliceMerge::new(["a", "b"], "a")
            .modify_schema(&mut schema, &Schemas::new())
            .expect("merge");
        assert!(schema.resource_fields.contains_key("a"));
        assert!(!schema.resource_fields.contains_key("b"));

        let mut schema = Schema::new("service").with_field("a", Field::new("array[string]"));
        assert!(
            SliceMerge::new(["a", "c"], "a")
                .modify_schema(&mut schema, &Schemas::new())
                .is_err()
        );
    }

    #[test]
    fn slice_to_map_keys_by_name() {
        let mapper = SliceToMap::new("containers", "name");
        let mut data = obj(json!({"containers": [{"name": "web", "image": "nginx"}]}));
        mapper.from_internal(&mut data);
        assert_eq!(data["containers"], json!({"web": {"image": "nginx"}}));
        mapper.to_internal(&mut data).expect("to_internal");
        assert_eq!(data["containers"], json!([{"name": "web", "image": "nginx"}]));

        assert_round_trip_stable(
            &mapper,
            obj(json!({"containers": [{"name": "b", "image": "x"}, {"name": "a", "image": "y"}]})),
        );
    }

    #[test]
    fn slice_to_map_retypes_array_field() {
        let mut schema = Schema::new("pod").with_field("containers", Field::new("array[container]"));
        schema.internal_schema = Some(Arc::new(schema.clone()));
        SliceToMap::new("containers", "name")
            .modify_schema(&mut schema, &Schemas::new())
            .expect("slice to map");
        assert_eq!(schema.resource_fields["containers"].field_type, "map[container]");
    }
}
