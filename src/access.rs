//! Capability checks run before every store operation, and read filtering
//! run after.

use crate::data::Object;
use crate::error::{ApiError, ErrorCode, Result};
use crate::types::schema::{METHOD_DELETE, METHOD_GET, METHOD_POST, METHOD_PUT};
use crate::types::{ApiRequest, Schema};

pub trait AccessControl: Send + Sync {
    fn can_create(&self, request: &ApiRequest, schema: &Schema) -> Result<()>;
    fn can_get(&self, request: &ApiRequest, schema: &Schema) -> Result<()>;
    fn can_list(&self, request: &ApiRequest, schema: &Schema) -> Result<()>;
    fn can_update(&self, request: &ApiRequest, existing: Option<&Object>, schema: &Schema) -> Result<()>;
    fn can_delete(&self, request: &ApiRequest, existing: Option<&Object>, schema: &Schema) -> Result<()>;
    fn can_watch(&self, request: &ApiRequest, schema: &Schema) -> Result<()>;

    /// Redacts one object, or hides it entirely by returning `None`.
    fn filter(&self, _request: &ApiRequest, _schema: &Schema, object: Object) -> Option<Object> {
        Some(object)
    }

    fn filter_list(&self, request: &ApiRequest, schema: &Schema, objects: Vec<Object>) -> Vec<Object> {
        objects
            .into_iter()
            .filter_map(|object| self.filter(request, schema, object))
            .collect()
    }
}

/// Grants whatever the schema declares as allowed verbs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllAccess;

fn denied(verb: &str, schema: &Schema) -> ApiError {
    ApiError::new(
        ErrorCode::PermissionDenied,
        format!("can not {} {}", verb, schema.id),
    )
}

impl AccessControl for AllAccess {
    fn can_create(&self, _request: &ApiRequest, schema: &Schema) -> Result<()> {
        if schema.allows_collection_method(METHOD_POST) {
            Ok(())
        } else {
            Err(denied("create", schema))
        }
    }

    fn can_get(&self, _request: &ApiRequest, schema: &Schema) -> Result<()> {
        if schema.allows_resource_method(METHOD_GET) {
            Ok(())
        } else {
            Err(denied("get", schema))
        }
    }

    fn can_list(&self, _request: &ApiRequest, schema: &Schema) -> Result<()> {
        if schema.allows_collection_method(METHOD_GET) {
            Ok(())
        } else {
            Err(denied("list", schema))
        }
    }

    fn can_update(&self, _request: &ApiRequest, _existing: Option<&Object>, schema: &Schema) -> Result<()> {
        if schema.allows_resource_method(METHOD_PUT) {
            Ok(())
        } else {
            Err(denied("update", schema))
        }
    }

    fn can_delete(&self, _request: &ApiRequest, _existing: Option<&Object>, schema: &Schema) -> Result<()> {
        if schema.allows_resource_method(METHOD_DELETE) {
            Ok(())
        } else {
            Err(denied("delete", schema))
        }
    }

    fn can_watch(&self, _request: &ApiRequest, schema: &Schema) -> Result<()> {
        if schema.allows_resource_method(METHOD_GET) || schema.allows_collection_method(METHOD_GET) {
            Ok(())
        } else {
            Err(denied("watch", schema))
        }
    }
}
