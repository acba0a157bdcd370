use super::{ObjectList, Store, WatchEvent};
use crate::data::Object;
use crate::error::{ApiError, ErrorCode, Result};
use crate::types::schema::{METHOD_DELETE, METHOD_GET, METHOD_POST, METHOD_PUT};
use crate::types::{ApiRequest, QueryOptions, Schema};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use tokio::sync::mpsc;

/// Serves the registry itself as the `schema` resource.
///
/// A schema is visible when the caller may list or get it; every type its
/// fields reference comes along. Advertised methods are trimmed to what the
/// caller's access control grants.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaStore;

fn visible(request: &ApiRequest, schema: &Schema) -> bool {
    let access = &request.access_control;
    access.can_list(request, schema).is_ok() || access.can_get(request, schema).is_ok()
}

fn render(request: &ApiRequest, schema: &Schema) -> Result<Object> {
    let access = &request.access_control;
    let mut data = schema.to_object()?;

    let resource_methods: Vec<&str> = schema
        .resource_methods
        .iter()
        .map(String::as_str)
        .filter(|method| match *method {
            METHOD_GET => access.can_get(request, schema).is_ok(),
            METHOD_PUT => access.can_update(request, None, schema).is_ok(),
            METHOD_DELETE => access.can_delete(request, None, schema).is_ok(),
            _ => true,
        })
        .collect();
    let collection_methods: Vec<&str> = schema
        .collection_methods
        .iter()
        .map(String::as_str)
        .filter(|method| match *method {
            METHOD_GET => access.can_list(request, schema).is_ok(),
            METHOD_POST => access.can_create(request, schema).is_ok(),
            _ => true,
        })
        .collect();
    data.insert("resourceMethods".into(), Value::from(resource_methods));
    data.insert("collectionMethods".into(), Value::from(collection_methods));
    Ok(data)
}

#[async_trait]
impl Store for SchemaStore {
    async fn by_id(&self, request: &ApiRequest, _schema: &Schema, id: &str) -> Result<Option<Object>> {
        match request.schemas.schema(id) {
            Some(schema) if visible(request, &schema) => render(request, &schema).map(Some),
            _ => Ok(None),
        }
    }

    async fn list(&self, request: &ApiRequest, _schema: &Schema, _opts: &QueryOptions) -> Result<ObjectList> {
        let roots: Vec<&str> = request
            .schemas
            .schemas()
            .iter()
            .filter(|schema| visible(request, schema))
            .map(|schema| schema.id.as_str())
            .collect();

        let mut seen = BTreeSet::new();
        let mut objects = Vec::new();
        for schema in request.schemas.schemas_for(roots) {
            if seen.insert(schema.id.clone()) {
                objects.push(render(request, &schema)?);
            }
        }
        Ok(ObjectList::new(objects))
    }

    async fn create(&self, _: &ApiRequest, schema: &Schema, _: Object) -> Result<Option<Object>> {
        Err(read_only(schema))
    }

    async fn update(&self, _: &ApiRequest, schema: &Schema, _: Object, _: &str) -> Result<Option<Object>> {
        Err(read_only(schema))
    }

    async fn delete(&self, _: &ApiRequest, schema: &Schema, _: &str) -> Result<Option<Object>> {
        Err(read_only(schema))
    }

    async fn watch(
        &self,
        _: &ApiRequest,
        _: &Schema,
        _: &QueryOptions,
    ) -> Result<Option<mpsc::Receiver<WatchEvent>>> {
        Ok(None)
    }
}

fn read_only(schema: &Schema) -> ApiError {
    ApiError::new(
        ErrorCode::MethodNotAllowed,
        format!("{} is read-only", schema.id),
    )
}
