use super::{ObjectList, Store, WatchEvent, pipe_events};
use crate::data::Object;
use crate::error::Result;
use crate::types::{ApiRequest, QueryOptions, Schema};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Runs the schema's mapper chain: `to_internal` on writes, `from_internal`
/// on everything read back.
pub struct MapperStore {
    inner: Arc<dyn Store>,
}

impl MapperStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self { inner }
    }
}

fn from_internal(schema: &Schema, object: Option<Object>) -> Option<Object> {
    let mut object = object?;
    if let Some(mapper) = &schema.mapper {
        mapper.from_internal(&mut object);
    }
    Some(object)
}

fn to_internal(schema: &Schema, mut data: Object) -> Result<Object> {
    if let Some(mapper) = &schema.mapper {
        mapper.to_internal(&mut data)?;
    }
    Ok(data)
}

#[async_trait]
impl Store for MapperStore {
    async fn by_id(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        let object = self.inner.by_id(request, schema, id).await?;
        Ok(from_internal(schema, object))
    }

    async fn list(&self, request: &ApiRequest, schema: &Schema, opts: &QueryOptions) -> Result<ObjectList> {
        let mut list = self.inner.list(request, schema, opts).await?;
        if let Some(mapper) = &schema.mapper {
            for object in list.objects.iter_mut() {
                mapper.from_internal(object);
            }
        }
        Ok(list)
    }

    async fn create(&self, request: &ApiRequest, schema: &Schema, data: Object) -> Result<Option<Object>> {
        let data = to_internal(schema, data)?;
        let created = self.inner.create(request, schema, data).await?;
        Ok(from_internal(schema, created))
    }

    async fn update(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        data: Object,
        id: &str,
    ) -> Result<Option<Object>> {
        let data = to_internal(schema, data)?;
        let updated = self.inner.update(request, schema, data, id).await?;
        Ok(from_internal(schema, updated))
    }

    fn check_update(&self, request: &ApiRequest, schema: &Schema, data: &Object) -> Result<()> {
        let data = to_internal(schema, data.clone())?;
        self.inner.check_update(request, schema, &data)
    }

    async fn delete(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        let deleted = self.inner.delete(request, schema, id).await?;
        Ok(from_internal(schema, deleted))
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
        let Some(mapper) = schema.mapper.clone() else {
            return Ok(Some(rx));
        };
        Ok(Some(pipe_events(rx, move |event| {
            event.map(|mut object| {
                mapper.from_internal(&mut object);
                Some(object)
            })
        })))
    }
}
