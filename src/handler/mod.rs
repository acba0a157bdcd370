//! Default verb handlers. A schema may override any of them; the override
//! runs instead of the default.

mod query;

pub use query::{apply_conditions, apply_pagination, apply_query, apply_sort};

use crate::builder::{Builder, Operation};
use crate::data::Object;
use crate::error::{ApiError, ErrorCode, Result};
use crate::parse::query_options;
use crate::store::Store;
use crate::types::{ApiRequest, HandlerOutput, RequestHandler, Schema};
use async_trait::async_trait;
use std::sync::Arc;

fn store_for(schema: &Schema) -> Result<Arc<dyn Store>> {
    schema
        .store
        .clone()
        .ok_or_else(|| ApiError::not_found("no store found"))
}

/// Runs the schema's input formatter, constructs the body for create or
/// update, then the schema's validator.
pub fn parse_and_validate_body(request: &mut ApiRequest, create: bool) -> Result<Object> {
    let schema = request.schema_or_not_found()?;
    let mut data = request.body.take().unwrap_or_default();
    if let Some(formatter) = &schema.input_formatter {
        formatter(request, &schema, &mut data, create)?;
    }
    let op = if create { Operation::Create } else { Operation::Update };
    let data = Builder::new(&request.schemas)
        .with_reference_validator(request.reference_validator.as_deref())
        .construct(&schema, &data, op)?;
    if let Some(validator) = &schema.validator {
        validator(request, &schema, &data)?;
    }
    Ok(data)
}

/// GET on a collection, a resource or a resource link.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListHandler;

#[async_trait]
impl RequestHandler for ListHandler {
    async fn handle(&self, request: &mut ApiRequest) -> Result<HandlerOutput> {
        let schema = request.schema_or_not_found()?;
        if request.name.is_empty() {
            request.access_control.can_list(request, &schema)?;
        } else {
            request.access_control.can_get(request, &schema)?;
        }
        let store = store_for(&schema)?;

        if request.name.is_empty() {
            let opts = query_options(request, &schema);
            let list = store.list(request, &schema, &opts).await?;
            return Ok(HandlerOutput::List(list));
        }

        let name = request.name.clone();
        let found = store
            .by_id(request, &schema, &name)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("failed to find {}", name)))?;
        if request.link.is_empty() {
            return Ok(HandlerOutput::Object(found));
        }
        match schema.link_handler.clone() {
            Some(handler) => handler.handle(request).await,
            None => Err(ApiError::not_found(format!("no link {} on {}", request.link, schema.id))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateHandler;

#[async_trait]
impl RequestHandler for CreateHandler {
    async fn handle(&self, request: &mut ApiRequest) -> Result<HandlerOutput> {
        let schema = request.schema_or_not_found()?;
        request.access_control.can_create(request, &schema)?;
        let data = parse_and_validate_body(request, true)?;
        let store = store_for(&schema)?;
        let created = store.create(request, &schema, data).await?;
        Ok(created.map_or(HandlerOutput::Empty, HandlerOutput::Object))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateHandler;

#[async_trait]
impl RequestHandler for UpdateHandler {
    async fn handle(&self, request: &mut ApiRequest) -> Result<HandlerOutput> {
        let schema = request.schema_or_not_found()?;
        request.access_control.can_update(request, None, &schema)?;
        let data = parse_and_validate_body(request, false)?;
        let store = store_for(&schema)?;
        let name = request.name.clone();
        let updated = store.update(request, &schema, data, &name).await?;
        Ok(updated.map_or(HandlerOutput::Empty, HandlerOutput::Object))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteHandler;

#[async_trait]
impl RequestHandler for DeleteHandler {
    async fn handle(&self, request: &mut ApiRequest) -> Result<HandlerOutput> {
        let schema = request.schema_or_not_found()?;
        request.access_control.can_delete(request, None, &schema)?;
        let store = store_for(&schema)?;
        let name = request.name.clone();
        let deleted = store.delete(request, &schema, &name).await?;
        Ok(deleted.map_or(HandlerOutput::Empty, HandlerOutput::Object))
    }
}

/// Runs a validated action: resource actions first confirm the resource
/// exists, then the schema's action handler produces the output.
pub async fn handle_action(request: &mut ApiRequest) -> Result<HandlerOutput> {
    let schema = request.schema_or_not_found()?;
    let actions = if request.name.is_empty() {
        &schema.collection_actions
    } else {
        &schema.resource_actions
    };
    let action = actions.get(&request.action).cloned().ok_or_else(|| {
        ApiError::new(
            ErrorCode::InvalidAction,
            format!("Invalid action: {}", request.action),
        )
    })?;

    if !request.name.is_empty() {
        let store = store_for(&schema)?;
        let name = request.name.clone();
        store
            .by_id(request, &schema, &name)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("failed to find {}", name)))?;
    }

    let Some(handler) = schema.action_handler.clone() else {
        return Err(ApiError::new(
            ErrorCode::ActionNotAvailable,
            format!("action {} is not available on {}", request.action, schema.id),
        ));
    };
    let name = request.action.clone();
    match handler.handle_action(&name, &action, request).await? {
        Some(output) => Ok(HandlerOutput::Value(output)),
        None => Ok(HandlerOutput::Empty),
    }
}
