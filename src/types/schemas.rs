use crate::data::capitalize;
use crate::mapper::{Mapper, Mappers};
use crate::store::Store;
use crate::types::definition::{guess_plural_name, is_primitive_type, referenced_schema};
use crate::types::schema::Schema;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Every problem recorded while registering schemas.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", .0.join(", "))]
pub struct SchemaErrors(pub Vec<String>);

/// The registry of every resource type served by one API server.
///
/// Built once at startup through `&mut self` registration calls, then shared
/// read-only behind an `Arc`. Registering an id twice keeps the first schema.
#[derive(Clone, Default)]
pub struct Schemas {
    by_id: HashMap<String, Arc<Schema>>,
    ordered: Vec<Arc<Schema>>,
    mappers: HashMap<String, Vec<Arc<dyn Mapper>>>,
    errors: Vec<String>,
}

impl Schemas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers extra mappers for a schema id. Must precede `add_schema` for that id.
    pub fn add_mapper(&mut self, schema_id: impl Into<String>, mapper: Arc<dyn Mapper>) -> &mut Self {
        self.mappers.entry(schema_id.into()).or_default().push(mapper);
        self
    }

    pub fn add_schema(&mut self, mut schema: Schema) -> &mut Self {
        if schema.id.is_empty() {
            self.errors
                .push(format!("ID is not set on schema with plural name '{}'", schema.plural_name));
            return self;
        }
        if self.by_id.contains_key(&schema.id) {
            log::debug!("schema {} already registered, ignoring", schema.id);
            return self;
        }
        self.setup_defaults(&mut schema);

        let mut chain: Vec<Arc<dyn Mapper>> = schema.mapper.take().into_iter().collect();
        chain.extend(self.mappers.get(&schema.id).cloned().unwrap_or_default());
        if !chain.is_empty() {
            schema.internal_schema = Some(Arc::new(schema.clone()));
            let mappers = Mappers::new(chain);
            if let Err(err) = mappers.modify_schema(&mut schema, self) {
                self.errors
                    .push(format!("failed to set up mappers for {}: {}", schema.id, err.message));
            }
            schema.mapper = Some(Arc::new(mappers));
        }

        let schema = Arc::new(schema);
        self.by_id.insert(schema.id.clone(), schema.clone());
        self.ordered.push(schema);
        self
    }

    /// Replaces every schema's store with `wrap(schema, store)`.
    pub fn map_stores<F>(&mut self, wrap: F)
    where
        F: Fn(&Schema, Arc<dyn Store>) -> Arc<dyn Store>,
    {
        for slot in self.ordered.iter_mut() {
            let Some(store) = slot.store.clone() else {
                continue;
            };
            let mut schema = Schema::clone(slot);
            schema.store = Some(wrap(&schema, store));
            let schema = Arc::new(schema);
            self.by_id.insert(schema.id.clone(), schema.clone());
            *slot = schema;
        }
    }

    pub fn remove_schema(&mut self, id: &str) -> Option<Arc<Schema>> {
        let removed = self.by_id.remove(id)?;
        self.ordered.retain(|s| s.id != id);
        Some(removed)
    }

    fn setup_defaults(&self, schema: &mut Schema) {
        if schema.plural_name.is_empty() {
            schema.plural_name = guess_plural_name(&schema.id);
        }
        if schema.code_name.is_empty() {
            schema.code_name = capitalize(&schema.id);
        }
        for (name, field) in schema.resource_fields.iter_mut() {
            if field.code_name.is_empty() {
                field.code_name = capitalize(name);
            }
        }
    }

    /// Registration problems, plus any field type that resolves to no schema.
    pub fn err(&self) -> Result<(), SchemaErrors> {
        let mut errors = self.errors.clone();
        for schema in &self.ordered {
            for (name, field) in &schema.resource_fields {
                if let Some(target) = referenced_schema(&field.field_type) {
                    if !is_primitive_type(target) && self.schema(target).is_none() {
                        errors.push(format!(
                            "field {} on schema {} has unknown type {}",
                            name, schema.id, field.field_type
                        ));
                    }
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaErrors(errors))
        }
    }

    /// Exact id match first, then a case-insensitive match on id or plural name.
    pub fn schema(&self, name: &str) -> Option<Arc<Schema>> {
        if let Some(schema) = self.by_id.get(name) {
            return Some(schema.clone());
        }
        self.ordered
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(name) || s.plural_name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn schemas(&self) -> &[Arc<Schema>] {
        &self.ordered
    }

    pub fn schemas_by_id(&self) -> &HashMap<String, Arc<Schema>> {
        &self.by_id
    }

    /// Schemas with at least one field whose type points at `type_id`.
    pub fn referencing(&self, type_id: &str) -> Vec<Arc<Schema>> {
        self.ordered
            .iter()
            .filter(|s| {
                s.resource_fields
                    .values()
                    .any(|f| referenced_schema(&f.field_type) == Some(type_id))
            })
            .cloned()
            .collect()
    }

    /// The given ids plus every schema their fields transitively reference.
    pub fn schemas_for<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<Arc<Schema>> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<String> = ids.into_iter().map(str::to_string).collect();
        let mut result = Vec::new();
        while let Some(id) = pending.pop() {
            let Some(schema) = self.schema(&id) else {
                continue;
            };
            if !seen.insert(schema.id.clone()) {
                continue;
            }
            for field in schema.resource_fields.values() {
                if let Some(target) = referenced_schema(&field.field_type) {
                    pending.push(target.to_string());
                }
            }
            result.push(schema);
        }
        result.sort_by(|a, b| a.id.cmp(&b.id));
        result
    }
}
