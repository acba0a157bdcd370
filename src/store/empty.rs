use super::{ObjectList, Store, WatchEvent};
use crate::data::Object;
use crate::error::{ApiError, ErrorCode, Result};
use crate::types::{ApiRequest, QueryOptions, Schema};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A store with nothing in it that accepts no writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyStore;

fn not_allowed(schema: &Schema) -> ApiError {
    ApiError::new(
        ErrorCode::MethodNotAllowed,
        format!("{} does not support writes", schema.id),
    )
}

#[async_trait]
impl Store for EmptyStore {
    async fn by_id(&self, _: &ApiRequest, _: &Schema, id: &str) -> Result<Option<Object>> {
        Err(ApiError::not_found(format!("failed to find {}", id)))
    }

    async fn list(&self, _: &ApiRequest, _: &Schema, _: &QueryOptions) -> Result<ObjectList> {
        Ok(ObjectList::default())
    }

    async fn create(&self, _: &ApiRequest, schema: &Schema, _: Object) -> Result<Option<Object>> {
        Err(not_allowed(schema))
    }

    async fn update(&self, _: &ApiRequest, schema: &Schema, _: Object, _: &str) -> Result<Option<Object>> {
        Err(not_allowed(schema))
    }

    async fn delete(&self, _: &ApiRequest, schema: &Schema, _: &str) -> Result<Option<Object>> {
        Err(not_allowed(schema))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Schemas;
    use std::sync::Arc;

    #[tokio::test]
    async fn reads_empty_and_rejects_writes() {
        let request = ApiRequest::new(Arc::new(Schemas::new()));
        let schema = Schema::new("error");
        assert!(EmptyStore.list(&request, &schema, &QueryOptions::default()).await.unwrap().objects.is_empty());
        assert_eq!(
            EmptyStore.by_id(&request, &schema, "x").await.expect_err("missing").code,
            ErrorCode::NotFound
        );
        assert_eq!(
            EmptyStore.create(&request, &schema, Object::new()).await.expect_err("write").code,
            ErrorCode::MethodNotAllowed
        );
    }
}
