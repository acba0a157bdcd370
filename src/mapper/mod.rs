//! Bidirectional transforms between the wire and backend shapes of a resource.
//!
//! A schema's chain runs `modify_schema` and `from_internal` in registration
//! order and `to_internal` in reverse, so every chain is its own inverse:
//! the first mapper registered is the last one applied on the way in.

mod embed;
mod encoding;
mod fields;
mod metadata;
mod object;
mod slices;
mod status;

pub use embed::Embed;
pub use encoding::{Base64, JsonEncode};
pub use fields::{DropField, Move, ReadOnly, SetValue, UntypedMove};
pub use metadata::{AnnotationField, FIELD_DOMAIN, LabelField};
pub use object::{Scoped, object_mappers};
pub use slices::{SliceMerge, SliceToMap};
pub use status::PendingStatus;

use crate::data::Object;
use crate::error::{ApiError, ErrorCode, Result};
use crate::types::{Schema, Schemas};
use std::sync::Arc;

pub trait Mapper: Send + Sync {
    /// Backend to wire. Never fails; problems are logged and the value kept.
    fn from_internal(&self, data: &mut Object);

    /// Wire to backend.
    fn to_internal(&self, data: &mut Object) -> Result<()>;

    /// Called once at registration to reshape the external schema.
    fn modify_schema(&self, schema: &mut Schema, schemas: &Schemas) -> Result<()>;
}

/// An ordered mapper chain.
#[derive(Clone, Default)]
pub struct Mappers {
    mappers: Vec<Arc<dyn Mapper>>,
}

impl Mappers {
    pub fn new(mappers: Vec<Arc<dyn Mapper>>) -> Self {
        Self { mappers }
    }

    pub fn push(&mut self, mapper: Arc<dyn Mapper>) {
        self.mappers.push(mapper);
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

impl Mapper for Mappers {
    fn from_internal(&self, data: &mut Object) {
        for mapper in &self.mappers {
            mapper.from_internal(data);
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        for mapper in self.mappers.iter().rev() {
            mapper.to_internal(data)?;
        }
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, schemas: &Schemas) -> Result<()> {
        for mapper in &self.mappers {
            mapper.modify_schema(schema, schemas)?;
        }
        Ok(())
    }
}

pub(crate) fn mapping_error(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::ServerError, message)
}

pub fn validate_field(field: &str, schema: &Schema) -> Result<()> {
    if schema.resource_fields.contains_key(field) {
        Ok(())
    } else {
        Err(mapping_error(format!(
            "field {} missing on schema {}",
            field, schema.id
        )))
    }
}

pub(crate) fn internal_schema(schema: &Schema) -> Result<Arc<Schema>> {
    schema
        .internal_schema
        .clone()
        .ok_or_else(|| mapping_error(format!("no internal schema found for schema {}", schema.id)))
}
