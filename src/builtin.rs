//! Schemas every server carries: introspection, errors, collections, the API
//! root and change subscriptions.

use crate::store::{ApiRootStore, SchemaStore};
use crate::subscribe::SubscribeHandler;
use crate::types::schema::{METHOD_GET, Scope};
use crate::types::{ApiRequest, ApiVersion, Field, RawResource, Schema, Schemas};
use serde_json::Value;
use std::sync::Arc;

pub const SCHEMA: &str = "schema";
pub const ERROR: &str = "error";
pub const COLLECTION: &str = "collection";
pub const API_ROOT: &str = "apiRoot";
pub const SUBSCRIBE: &str = "subscribe";

fn schema_schema() -> Schema {
    Schema::new(SCHEMA)
        .with_plural_name("schemas")
        .with_collection_methods(&[METHOD_GET])
        .with_resource_methods(&[METHOD_GET])
        .with_field("pluralName", Field::new("string"))
        .with_field("codeName", Field::new("string"))
        .with_field("description", Field::new("string"))
        .with_field("scope", Field::new("string"))
        .with_field("resourceMethods", Field::new("array[string]"))
        .with_field("resourceFields", Field::new("map[json]"))
        .with_field("resourceActions", Field::new("map[json]"))
        .with_field("collectionMethods", Field::new("array[string]"))
        .with_field("collectionActions", Field::new("map[json]"))
        .with_field("collectionFilters", Field::new("map[json]"))
        .with_formatter(Arc::new(schema_formatter))
        .with_store(Arc::new(SchemaStore))
}

fn error_schema() -> Schema {
    Schema::new(ERROR)
        .with_collection_methods(&[])
        .with_resource_methods(&[])
        .with_field("code", Field::new("string"))
        .with_field("message", Field::new("string").nullable())
        .with_field("fieldName", Field::new("string").nullable())
        .with_field("status", Field::new("int"))
}

fn collection_schema() -> Schema {
    Schema::new(COLLECTION)
        .with_collection_methods(&[])
        .with_resource_methods(&[])
        .with_field("data", Field::new("array[json]"))
        .with_field("pagination", Field::new("map[json]"))
        .with_field("sort", Field::new("map[json]"))
        .with_field("filters", Field::new("map[json]"))
}

fn api_root_schema(versions: Vec<ApiVersion>) -> Schema {
    Schema::new(API_ROOT)
        .with_collection_methods(&[METHOD_GET])
        .with_resource_methods(&[METHOD_GET])
        .with_field("path", Field::new("string"))
        .with_formatter(Arc::new(api_root_formatter))
        .with_store(Arc::new(ApiRootStore::new(versions)))
}

fn subscribe_schema() -> Schema {
    Schema::new(SUBSCRIBE)
        .with_plural_name("subscribe")
        .with_collection_methods(&[METHOD_GET])
        .with_resource_methods(&[])
        .with_field("resourceTypes", Field::new("array[string]"))
        .with_list_handler(Arc::new(SubscribeHandler))
}

/// Registers the built-in schemas ahead of any application schema.
pub fn register(schemas: &mut Schemas, versions: &[ApiVersion]) {
    schemas
        .add_schema(schema_schema())
        .add_schema(error_schema())
        .add_schema(collection_schema())
        .add_schema(api_root_schema(versions.to_vec()))
        .add_schema(subscribe_schema());
}

/// Links a schema resource to the collection it describes.
fn schema_formatter(request: &ApiRequest, resource: &mut RawResource) {
    let Some(described) = request.schemas.schema(&resource.id) else {
        return;
    };
    if described.allows_collection_method(METHOD_GET) {
        let link = request.url_builder.collection(&described);
        resource.links.insert("collection".into(), link);
    }
    if described.scope == Scope::Namespace {
        resource.values.insert("namespaced".into(), Value::Bool(true));
    }
}

/// Turns an API root entry's path into discovery links: `self`, `root`,
/// `schemas`, and one link per listable collection under that version.
fn api_root_formatter(request: &ApiRequest, resource: &mut RawResource) {
    let Some(path) = resource
        .values
        .remove("path")
        .and_then(|p| p.as_str().map(str::to_string))
        .filter(|p| !p.is_empty())
    else {
        return;
    };

    let root = request.url_builder.relative_to_root(&path);
    resource.links.insert("self".into(), root.clone());
    resource.links.insert("root".into(), root.clone());
    resource.links.insert("schemas".into(), format!("{}/schemas", root));

    for schema in request.schemas.schemas() {
        if schema.id == API_ROOT || !schema.allows_collection_method(METHOD_GET) {
            continue;
        }
        resource
            .links
            .insert(schema.plural_name.clone(), format!("{}/{}", root, schema.plural_name.to_lowercase()));
    }
}
