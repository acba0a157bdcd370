use super::{Mapper, internal_schema, mapping_error};
use crate::data::Object;
use crate::error::Result;
use crate::types::{Schema, Schemas};
use serde_json::Value;
use std::sync::OnceLock;

/// Flattens a nested object field into top-level fields.
///
/// The nested field's type must be a registered schema; its fields become
/// fields of the embedding schema. Each instance belongs to one schema.
pub struct Embed {
    pub field: String,
    pub optional: bool,
    embedded_fields: OnceLock<Vec<String>>,
}

impl Embed {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            optional: false,
            embedded_fields: OnceLock::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn fields(&self) -> &[String] {
        self.embedded_fields.get().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Mapper for Embed {
    fn from_internal(&self, data: &mut Object) {
        if let Some(Value::Object(sub)) = data.remove(&self.field) {
            for (key, value) in sub {
                data.insert(key, value);
            }
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        let fields = self.fields();
        if fields.is_empty() {
            return Ok(());
        }
        let mut sub = match data.remove(&self.field) {
            Some(Value::Object(existing)) => existing,
            _ => Object::new(),
        };
        for name in fields {
            if let Some(value) = data.remove(name) {
                sub.insert(name.clone(), value);
            }
        }
        data.insert(self.field.clone(), Value::Object(sub));
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, schemas: &Schemas) -> Result<()> {
        let internal = internal_schema(schema)?;
        let Some(field) = internal.resource_fields.get(&self.field) else {
            if self.optional {
                return Ok(());
            }
            return Err(mapping_error(format!(
                "failed to find field {} on schema {}",
                self.field, schema.id
            )));
        };
        let embedded = schemas.schema(&field.field_type).ok_or_else(|| {
            mapping_error(format!(
                "failed to find schema {} for embedding",
                field.field_type
            ))
        })?;

        let mut names = Vec::with_capacity(embedded.resource_fields.len());
        for (name, embedded_field) in &embedded.resource_fields {
            if name != &self.field && schema.resource_fields.contains_key(name) {
                return Err(mapping_error(format!(
                    "embedding field {} on {} will overwrite the field {}",
                    self.field, schema.id, name
                )));
            }
            schema
                .resource_fields
                .insert(name.clone(), embedded_field.clone());
            names.push(name.clone());
        }
        if !names.contains(&self.field) {
            schema.resource_fields.remove(&self.field);
        }

        if self.embedded_fields.set(names).is_err() {
            log::warn!(
                "embed mapper for field {} reused on schema {}; keeping first field set",
                self.field,
                schema.id
            );
        }
        Ok(())
    }
}
