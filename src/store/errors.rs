use super::{ObjectList, Store, StatusError, WatchEvent};
use crate::data::Object;
use crate::error::{ApiError, ErrorCode, Result};
use crate::types::{ApiRequest, QueryOptions, Schema};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Maps backend status errors onto the API error taxonomy.
///
/// Errors that already carry a taxonomy code other than `ServerError` pass
/// through unchanged.
pub fn translate_error(err: ApiError) -> ApiError {
    let Some(status) = err.cause().and_then(|c| c.downcast_ref::<StatusError>()) else {
        return err;
    };
    let code = match status.code {
        404 => ErrorCode::NotFound,
        409 => ErrorCode::Conflict,
        403 => ErrorCode::PermissionDenied,
        401 => ErrorCode::Unauthorized,
        400 | 422 => ErrorCode::InvalidBodyContent,
        405 => ErrorCode::MethodNotAllowed,
        _ => ErrorCode::ServerError,
    };
    let status = status.clone();
    ApiError::wrap(code, status.message.clone(), status)
}

impl From<StatusError> for ApiError {
    fn from(err: StatusError) -> Self {
        ApiError::wrap(ErrorCode::ServerError, err.message.clone(), err)
    }
}

pub struct ErrorStore {
    inner: Arc<dyn Store>,
}

impl ErrorStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Store for ErrorStore {
    async fn by_id(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        self.inner.by_id(request, schema, id).await.map_err(translate_error)
    }

    async fn list(&self, request: &ApiRequest, schema: &Schema, opts: &QueryOptions) -> Result<ObjectList> {
        self.inner.list(request, schema, opts).await.map_err(translate_error)
    }

    async fn create(&self, request: &ApiRequest, schema: &Schema, data: Object) -> Result<Option<Object>> {
        self.inner.create(request, schema, data).await.map_err(translate_error)
    }

    async fn update(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        data: Object,
        id: &str,
    ) -> Result<Option<Object>> {
        self.inner
            .update(request, schema, data, id)
            .await
            .map_err(translate_error)
    }

    fn check_update(&self, request: &ApiRequest, schema: &Schema, data: &Object) -> Result<()> {
        self.inner.check_update(request, schema, data).map_err(translate_error)
    }

    async fn delete(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        self.inner.delete(request, schema, id).await.map_err(translate_error)
    }

    async fn watch(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        opts: &QueryOptions,
    ) -> Result<Option<mpsc::Receiver<WatchEvent>>> {
        self.inner.watch(request, schema, opts).await.map_err(translate_error)
    }
}
