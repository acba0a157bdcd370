use super::{ObjectList, Store, WatchEvent, pipe_events};
use crate::data::Object;
use crate::error::{ApiError, Result};
use crate::handler::apply_query;
use crate::types::{ApiRequest, QueryOptions, Schema};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Gates each operation with the request's access control and filters
/// everything it returns. Lists are then narrowed by the query conditions,
/// sorted and paged.
pub struct AccessStore {
    inner: Arc<dyn Store>,
}

impl AccessStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self { inner }
    }

    fn filter(&self, request: &ApiRequest, schema: &Schema, object: Option<Object>) -> Option<Object> {
        request.access_control.filter(request, schema, object?)
    }

    async fn existing(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Object> {
        let found = self.inner.by_id(request, schema, id).await?;
        self.filter(request, schema, found)
            .ok_or_else(|| ApiError::not_found(format!("failed to find {}", id)))
    }
}

#[async_trait]
impl Store for AccessStore {
    async fn by_id(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        request.access_control.can_get(request, schema)?;
        let object = self.inner.by_id(request, schema, id).await?;
        Ok(self.filter(request, schema, object))
    }

    async fn list(&self, request: &ApiRequest, schema: &Schema, opts: &QueryOptions) -> Result<ObjectList> {
        request.access_control.can_list(request, schema)?;
        let list = self.inner.list(request, schema, opts).await?;
        let objects = request.access_control.filter_list(request, schema, list.objects);
        let (objects, pagination) = apply_query(objects, opts);
        Ok(ObjectList {
            objects,
            pagination,
            revision: list.revision,
        })
    }

    async fn create(&self, request: &ApiRequest, schema: &Schema, data: Object) -> Result<Option<Object>> {
        request.access_control.can_create(request, schema)?;
        let created = self.inner.create(request, schema, data).await?;
        Ok(self.filter(request, schema, created))
    }

    async fn update(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        data: Object,
        id: &str,
    ) -> Result<Option<Object>> {
        self.inner.check_update(request, schema, &data)?;
        let existing = self.existing(request, schema, id).await?;
        request.access_control.can_update(request, Some(&existing), schema)?;
        let updated = self.inner.update(request, schema, data, id).await?;
        Ok(self.filter(request, schema, updated))
    }

    fn check_update(&self, request: &ApiRequest, schema: &Schema, data: &Object) -> Result<()> {
        self.inner.check_update(request, schema, data)
    }

    async fn delete(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        let existing = self.existing(request, schema, id).await?;
        request.access_control.can_delete(request, Some(&existing), schema)?;
        let deleted = self.inner.delete(request, schema, id).await?;
        Ok(self.filter(request, schema, deleted))
    }

    async fn watch(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        opts: &QueryOptions,
    ) -> Result<Option<mpsc::Receiver<WatchEvent>>> {
        request.access_control.can_watch(request, schema)?;
        let Some(rx) = self.inner.watch(request, schema, opts).await? else {
            return Ok(None);
        };
        let request = request.fork();
        let schema = schema.clone();
        let opts = opts.clone();
        Ok(Some(pipe_events(rx, move |event| {
            let event = event.map(|object| request.access_control.filter(&request, &schema, object))?;
            opts.matches(event.object()).then_some(event)
        })))
    }
}
