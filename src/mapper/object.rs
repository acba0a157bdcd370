use super::embed::Embed;
use super::fields::{DropField, ReadOnly};
use super::{Mapper, Mappers};
use crate::data::Object;
use crate::error::Result;
use crate::types::{Schema, Schemas, Scope};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Applies nested mappers only to schemas whose scope differs from `if_not`.
pub struct Scoped {
    pub if_not: Scope,
    pub mappers: Mappers,
    active: AtomicBool,
}

impl Scoped {
    pub fn new(if_not: Scope, mappers: Vec<Arc<dyn Mapper>>) -> Self {
        Self {
            if_not,
            mappers: Mappers::new(mappers),
            active: AtomicBool::new(false),
        }
    }
}

impl Mapper for Scoped {
    fn from_internal(&self, data: &mut Object) {
        if self.active.load(Ordering::Acquire) {
            self.mappers.from_internal(data);
        }
    }

    fn to_internal(&self, data: &mut Object) -> Result<()> {
        if self.active.load(Ordering::Acquire) {
            self.mappers.to_internal(data)?;
        }
        Ok(())
    }

    fn modify_schema(&self, schema: &mut Schema, schemas: &Schemas) -> Result<()> {
        if schema.scope == self.if_not {
            return Ok(());
        }
        self.active.store(true, Ordering::Release);
        self.mappers.modify_schema(schema, schemas)
    }
}

/// The standard chain for Kubernetes-style objects, followed by `extra`.
///
/// `metadata` and `spec` are flattened into top-level fields, `status` becomes
/// read-only, and `kind`, `apiVersion` and `finalizers` are hidden. Cluster
/// scoped schemas also hide `namespace`.
pub fn object_mappers(extra: Vec<Arc<dyn Mapper>>) -> Mappers {
    let mut chain: Vec<Arc<dyn Mapper>> = vec![
        Arc::new(Embed::new("metadata")),
        Arc::new(Embed::new("spec").optional()),
        Arc::new(ReadOnly::new("status").optional()),
        Arc::new(DropField::new("kind").ignoring_definition()),
        Arc::new(DropField::new("apiVersion").ignoring_definition()),
        Arc::new(Scoped::new(
            Scope::Namespace,
            vec![Arc::new(DropField::new("namespace").ignoring_definition())],
        )),
        Arc::new(DropField::new("finalizers").ignoring_definition()),
    ];
    chain.extend(extra);
    Mappers::new(chain)
}
