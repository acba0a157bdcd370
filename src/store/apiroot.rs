use super::{ObjectList, Store, WatchEvent};
use crate::data::Object;
use crate::error::{ApiError, ErrorCode, Result};
use crate::types::{ApiRequest, ApiVersion, QueryOptions, Schema};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// One `apiRoot` entry per served API version.
#[derive(Debug, Clone, Default)]
pub struct ApiRootStore {
    versions: Vec<ApiVersion>,
}

impl ApiRootStore {
    pub fn new(versions: Vec<ApiVersion>) -> Self {
        Self { versions }
    }

    fn entry(version: &ApiVersion) -> Object {
        let mut data = Object::new();
        data.insert("id".into(), Value::from(version.path.trim_start_matches('/')));
        data.insert("path".into(), Value::from(version.path.as_str()));
        data
    }
}

#[async_trait]
impl Store for ApiRootStore {
    async fn by_id(&self, _: &ApiRequest, _: &Schema, id: &str) -> Result<Option<Object>> {
        Ok(self
            .versions
            .iter()
            .find(|v| v.path.trim_start_matches('/') == id.trim_start_matches('/'))
            .map(Self::entry))
    }

    async fn list(&self, _: &ApiRequest, _: &Schema, _: &QueryOptions) -> Result<ObjectList> {
        Ok(ObjectList::new(self.versions.iter().map(Self::entry).collect()))
    }

    async fn create(&self, _: &ApiRequest, _: &Schema, _: Object) -> Result<Option<Object>> {
        Err(ApiError::new(ErrorCode::MethodNotAllowed, "apiRoot is read-only"))
    }

    async fn update(&self, _: &ApiRequest, _: &Schema, _: Object, _: &str) -> Result<Option<Object>> {
        Err(ApiError::new(ErrorCode::MethodNotAllowed, "apiRoot is read-only"))
    }

    async fn delete(&self, _: &ApiRequest, _: &Schema, _: &str) -> Result<Option<Object>> {
        Err(ApiError::new(ErrorCode::MethodNotAllowed, "apiRoot is read-only"))
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
