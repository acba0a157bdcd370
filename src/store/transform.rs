use super::{ObjectList, Store, WatchEvent, pipe_events};
use crate::data::Object;
use crate::error::{ApiError, Result};
use crate::types::{ApiRequest, QueryOptions, Schema};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Rewrites or hides one object; `None` hides it.
pub type ObjectTransformer = Arc<dyn Fn(&ApiRequest, &Schema, Object) -> Option<Object> + Send + Sync>;

pub type ListTransformer = Arc<dyn Fn(&ApiRequest, &Schema, Vec<Object>) -> Vec<Object> + Send + Sync>;

/// Schema-specific post-processing of everything read from the inner store.
///
/// Without a list transformer, lists fall back to the object transformer
/// applied item by item.
pub struct TransformStore {
    inner: Arc<dyn Store>,
    transformer: Option<ObjectTransformer>,
    list_transformer: Option<ListTransformer>,
}

impl TransformStore {
    pub fn new(
        inner: Arc<dyn Store>,
        transformer: Option<ObjectTransformer>,
        list_transformer: Option<ListTransformer>,
    ) -> Self {
        Self {
            inner,
            transformer,
            list_transformer,
        }
    }

    fn apply(&self, request: &ApiRequest, schema: &Schema, object: Option<Object>) -> Option<Object> {
        let object = object?;
        match &self.transformer {
            Some(transformer) => transformer(request, schema, object),
            None => Some(object),
        }
    }
}

#[async_trait]
impl Store for TransformStore {
    async fn by_id(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        let Some(object) = self.inner.by_id(request, schema, id).await? else {
            return Ok(None);
        };
        match self.apply(request, schema, Some(object)) {
            Some(object) => Ok(Some(object)),
            None => Err(ApiError::not_found(format!("failed to find {}", id))),
        }
    }

    async fn list(&self, request: &ApiRequest, schema: &Schema, opts: &QueryOptions) -> Result<ObjectList> {
        let mut list = self.inner.list(request, schema, opts).await?;
        let objects = std::mem::take(&mut list.objects);
        list.objects = match (&self.list_transformer, &self.transformer) {
            (Some(transform), _) => transform(request, schema, objects),
            (None, Some(transform)) => objects
                .into_iter()
                .filter_map(|object| transform(request, schema, object))
                .collect(),
            (None, None) => objects,
        };
        Ok(list)
    }

    async fn create(&self, request: &ApiRequest, schema: &Schema, data: Object) -> Result<Option<Object>> {
        let created = self.inner.create(request, schema, data).await?;
        Ok(self.apply(request, schema, created))
    }

    async fn update(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        data: Object,
        id: &str,
    ) -> Result<Option<Object>> {
        let updated = self.inner.update(request, schema, data, id).await?;
        Ok(self.apply(request, schema, updated))
    }

    fn check_update(&self, request: &ApiRequest, schema: &Schema, data: &Object) -> Result<()> {
        self.inner.check_update(request, schema, data)
    }

    async fn delete(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        let deleted = self.inner.delete(request, schema, id).await?;
        Ok(self.apply(request, schema, deleted))
    }

    async fn watch(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        opts: &QueryOptions,
    ) -> Result<Option<mpsc::Receiver<WatchEvent>>> {
        let Some(rx) = self.inner.watch(request, schema, opts).await? else {
            return Ok(None);
        };
        let Some(transformer) = self.transformer.clone() else {
            return Ok(Some(rx));
        };
        let request = request.fork();
        let schema = schema.clone();
        Ok(Some(pipe_events(rx, move |event| {
            event.map(|object| transformer(&request, &schema, object))
        })))
    }
}
