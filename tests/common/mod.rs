#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use schemapi::data::put_value;
use schemapi::mapper::{AnnotationField, LabelField, object_mappers};
use schemapi::types::ActionHandler;
use schemapi::{
    Action, ApiRequest, Field, Filter, MemoryClient, Object, ProxyStore, Schema, Schemas, Scope,
    ServerBuilder,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

pub const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0";

struct WidgetActions;

#[async_trait]
impl ActionHandler for WidgetActions {
    async fn handle_action(
        &self,
        name: &str,
        _action: &Action,
        request: &mut ApiRequest,
    ) -> schemapi::Result<Option<Value>> {
        match name {
            "describe" => Ok(Some(json!({"widget": request.name}))),
            _ => Ok(None),
        }
    }
}

pub fn widget_schemas(client: Arc<MemoryClient>) -> Schemas {
    let mut schemas = Schemas::new();
    schemas
        .add_schema(
            Schema::new("objectMeta")
                .with_collection_methods(&[])
                .with_resource_methods(&[])
                .with_field("name", Field::new("string").creatable())
                .with_field("namespace", Field::new("string").creatable())
                .with_field("labels", Field::new("map[string]").writable())
                .with_field("annotations", Field::new("map[string]").writable())
                .with_field("resourceVersion", Field::new("string").updatable()),
        )
        .add_schema(
            Schema::new("widgetSpec")
                .with_collection_methods(&[])
                .with_resource_methods(&[])
                .with_field("size", Field::new("int").writable().with_range(Some(0), Some(100)))
                .with_field(
                    "color",
                    Field::new("enum")
                        .writable()
                        .with_options(["red", "green", "blue"])
                        .with_default("red"),
                ),
        )
        .add_schema(
            Schema::new("widget")
                .with_scope(Scope::Namespace)
                .with_field("metadata", Field::new("objectMeta"))
                .with_field("spec", Field::new("widgetSpec"))
                .with_field("status", Field::new("json"))
                .with_field("kind", Field::new("string"))
                .with_field("apiVersion", Field::new("string"))
                .with_field("description", Field::new("string").writable())
                .with_field("tier", Field::new("string").writable())
                .with_filter("name", Filter::all())
                .with_filter("color", Filter::default())
                .with_filter("size", Filter::default())
                .with_resource_action("describe", Action::new())
                .with_collection_action("purge", Action::new())
                .with_action_handler(Arc::new(WidgetActions))
                .with_mapper(Arc::new(object_mappers(vec![
                    Arc::new(AnnotationField::new("description")),
                    Arc::new(LabelField::new("tier")),
                ])))
                .with_store(Arc::new(ProxyStore::new(client, "Widget", "example.io/v1"))),
        );
    schemas
}

pub fn builder(client: Arc<MemoryClient>) -> ServerBuilder {
    ServerBuilder::new(widget_schemas(client))
}

pub fn app(client: Arc<MemoryClient>) -> axum::Router {
    builder(client).build().expect("valid registry").router()
}

/// Stores a widget straight in the backend, bypassing the API.
pub async fn seed(client: &MemoryClient, namespace: &str, name: &str, size: i64, color: &str) {
    let mut object = Object::new();
    object.insert("kind".into(), Value::from("Widget"));
    object.insert("apiVersion".into(), Value::from("example.io/v1"));
    put_value(&mut object, Value::from(name), &["metadata", "name"]);
    put_value(&mut object, Value::from(size), &["spec", "size"]);
    put_value(&mut object, Value::from(color), &["spec", "color"]);
    client.insert(Some(namespace), object).await;
}

pub async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let body = match body {
        Some(payload) => {
            request = request.header("content-type", "application/json");
            Body::from(payload.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(request.body(body).expect("request should build"))
        .await
        .expect("response expected")
}

pub async fn text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Sends a JSON request and decodes the JSON reply, `Null` when empty.
pub async fn call(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let response = send(app, method, uri, &[], body).await;
    let status = response.status();
    let headers = response.headers().clone();
    let body = text(response).await;
    if body.is_empty() {
        return (status, headers, Value::Null);
    }
    let json = serde_json::from_str::<Value>(&body).expect("body should be valid JSON");
    (status, headers, json)
}

pub fn ids(collection: &Value) -> Vec<String> {
    collection["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
