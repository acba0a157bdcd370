//! Per-schema extension points.

use crate::data::Object;
use crate::error::Result;
use crate::store::ObjectList;
use crate::types::request::ApiRequest;
use crate::types::resource::RawResource;
use crate::types::schema::{Action, Schema};
use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;
use std::sync::Arc;

/// Decorates a single rendered resource after its structural fields are set.
pub type Formatter = Arc<dyn Fn(&ApiRequest, &mut RawResource) + Send + Sync>;

/// Decorates a rendered collection envelope.
pub type CollectionFormatter = Arc<dyn Fn(&ApiRequest, &mut Object) + Send + Sync>;

/// Extra validation run on constructed input.
pub type Validator = Arc<dyn Fn(&ApiRequest, &Schema, &Object) -> Result<()> + Send + Sync>;

/// Adjusts raw input before it is constructed; the flag is true on create.
pub type InputFormatter =
    Arc<dyn Fn(&ApiRequest, &Schema, &mut Object, bool) -> Result<()> + Send + Sync>;

/// What a verb handler produced, before the writer renders it.
pub enum HandlerOutput {
    Object(Object),
    List(ObjectList),
    /// Already in wire form; written without resource conversion.
    Value(Value),
    Empty,
    /// A response the handler built itself, such as a websocket upgrade.
    Response(Response),
}

impl std::fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerOutput::Object(obj) => f.debug_tuple("Object").field(obj).finish(),
            HandlerOutput::List(list) => f.debug_tuple("List").field(&list.objects.len()).finish(),
            HandlerOutput::Value(value) => f.debug_tuple("Value").field(value).finish(),
            HandlerOutput::Empty => f.write_str("Empty"),
            HandlerOutput::Response(_) => f.write_str("Response"),
        }
    }
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: &mut ApiRequest) -> Result<HandlerOutput>;
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Returns the action output, or `None` when the action produces no body.
    async fn handle_action(
        &self,
        name: &str,
        action: &Action,
        request: &mut ApiRequest,
    ) -> Result<Option<Value>>;
}
