use super::{Mapper, internal_schema, mapping_error, validate_field};
use crate::data::{Object, capitalize, put_value, remove_value, split_path};
use crate::error::Result;
use crate::types::{Schema, Schemas};
use serde_json::Value;

/// Renames a top-level field.
pub struct Move {
    pub from: String,
    pub to: String,
}

impl Move {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Mapper for Move {
    fn from_internal(&self, data: &mut Object) {
        if let Some(v) = data.remove(&self.from) {
            data.insert(self.to.clone(), v);
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        if let Some(v) = data.remove(&self.to) {
            data.insert(self.from.clone(), v);
        }
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        if schema.resource_fields.contains_key(&self.to) {
            return Err(mapping_error(format!(
                "field {} already exists on schema {}",
                self.to, schema.id
            )));
        }
        let Some(mut field) = schema.resource_fields.remove(&self.from) else {
            return Err(mapping_error(format!(
                "missing field {} on schema {}",
                self.from, schema.id
            )));
        };
        field.code_name = capitalize(&self.to);
        schema.resource_fields.insert(self.to.clone(), field);
        Ok(())
    }
}

/// Moves a value between two paths without touching the schema.
pub struct UntypedMove {
    pub from: String,
    pub to: String,
    pub separator: String,
}

impl UntypedMove {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            separator: "/".into(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

impl Mapper for UntypedMove {
    fn from_internal(&self, data: &mut Object) {
        if let Some(v) = remove_value(data, &split_path(&self.from, &self.separator)) {
            put_value(data, v, &split_path(&self.to, &self.separator));
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        if let Some(v) = remove_value(data, &split_path(&self.to, &self.separator)) {
            put_value(data, v, &split_path(&self.from, &self.separator));
        }
        Ok(())
    }

    fn modify_schema(&self, _schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        Ok(())
    }
}

/// Hides a backend field from clients.
pub struct DropField {
    pub field: String,
    pub ignore_definition: bool,
}

impl DropField {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ignore_definition: false,
        }
    }

    pub fn ignoring_definition(mut self) -> Self {
        self.ignore_definition = true;
        self
    }
}

impl Mapper for DropField {
    fn from_internal(&self, data: &mut Object) {
        data.remove(&self.field);
    }

    fn to_internal(&self, _data: &mut Object) -> Result<()> {
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        if schema.resource_fields.remove(&self.field).is_none() && !self.ignore_definition {
            return Err(mapping_error(format!(
                "can not drop missing field {} on schema {}",
                self.field, schema.id
            )));
        }
        Ok(())
    }
}

/// Marks a field as neither creatable nor updatable.
pub struct ReadOnly {
    pub field: String,
    pub optional: bool,
}

impl ReadOnly {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl Mapper for ReadOnly {
    fn from_internal(&self, _data: &mut Object) {}

    fn to_internal(&self, _data: &mut Object) -> Result<()> {
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        match schema.resource_fields.get_mut(&self.field) {
            Some(field) => {
                field.create = false;
                field.update = false;
                Ok(())
            }
            None if self.optional => Ok(()),
            None => Err(mapping_error(format!(
                "failed to find field {} on schema {}",
                self.field, schema.id
            ))),
        }
    }
}

/// Injects constants: `internal` on the way in, `external` on the way out.
pub struct SetValue {
    pub field: String,
    pub internal: Option<Value>,
    pub external: Option<Value>,
}

impl SetValue {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            internal: None,
            external: None,
        }
    }

    pub fn internal(mut self, value: impl Into<Value>) -> Self {
        self.internal = Some(value.into());
        self
    }

    pub fn external(mut self, value: impl Into<Value>) -> Self {
        self.external = Some(value.into());
        self
    }
}

impl Mapper for SetValue {
    fn from_internal(&self, data: &mut Object) {
        if let Some(value) = &self.external {
            data.insert(self.field.clone(), value.clone());
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        if let Some(value) = &self.internal {
            data.insert(self.field.clone(), value.clone());
        }
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        validate_field(&self.field, schema)
    }
}

/// Requires the internal snapshot to declare `field`.
pub(crate) fn validate_internal_field(field: &str, schema: &Schema) -> Result<std::sync::Arc<Schema>> {
    let internal = internal_schema(schema)?;
    if internal.resource_fields.contains_key(field) {
        Ok(internal)
    } else {
        Err(mapping_error(format!(
            "field {} missing on internal schema {}",
            field, schema.id
        )))
    }
}
