//! Backend storage contract and the decorators every schema store is wrapped in.
//!
//! A served store is layered as
//! `AccessStore(TransformStore?(MapperStore(ErrorStore(store))))`: error
//! translation sits closest to the backend so every other layer sees taxonomy
//! errors, and access filtering sits outermost so paging runs on what the
//! caller may see.

mod access;
mod apiroot;
mod client;
mod empty;
mod errors;
mod mapper;
mod memory;
mod proxy;
mod schema;
mod transform;

pub use access::AccessStore;
pub use apiroot::ApiRootStore;
pub use client::{ClientEvent, ClientEventKind, ClientList, ListOptions, ResourceClient, StatusError};
pub use empty::EmptyStore;
pub use errors::{ErrorStore, translate_error};
pub use mapper::MapperStore;
pub use memory::MemoryClient;
pub use proxy::{Backoff, ConflictRetryPolicy, ProxyStore, TokioBackoff};
pub use schema::SchemaStore;
pub use transform::{ListTransformer, ObjectTransformer, TransformStore};

use crate::data::Object;
use crate::error::Result;
use crate::types::{ApiRequest, Pagination, QueryOptions, Schema};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of every watch channel between decorators.
pub const WATCH_BUFFER: usize = 64;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectList {
    pub objects: Vec<Object>,
    /// Set once the list has been paged.
    pub pagination: Option<Pagination>,
    /// Backend revision the list was read at, empty when unknown.
    pub revision: String,
}

impl ObjectList {
    pub fn new(objects: Vec<Object>) -> Self {
        Self {
            objects,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Change(Object),
    Remove(Object),
}

impl WatchEvent {
    pub fn object(&self) -> &Object {
        match self {
            WatchEvent::Change(obj) | WatchEvent::Remove(obj) => obj,
        }
    }

    pub fn map<F>(self, f: F) -> Option<WatchEvent>
    where
        F: FnOnce(Object) -> Option<Object>,
    {
        match self {
            WatchEvent::Change(obj) => f(obj).map(WatchEvent::Change),
            WatchEvent::Remove(obj) => f(obj).map(WatchEvent::Remove),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WatchEvent::Change(_) => "resource.change",
            WatchEvent::Remove(_) => "resource.remove",
        }
    }
}

/// CRUD and watch for one schema's resources.
///
/// Objects without an `id` key are treated as not addressable. `Ok(None)` from
/// `by_id` means the resource does not exist; from `delete` it means the
/// resource is gone rather than pending removal.
#[async_trait]
pub trait Store: Send + Sync {
    async fn by_id(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>>;

    async fn list(&self, request: &ApiRequest, schema: &Schema, opts: &QueryOptions) -> Result<ObjectList>;

    async fn create(&self, request: &ApiRequest, schema: &Schema, data: Object) -> Result<Option<Object>>;

    async fn update(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        data: Object,
        id: &str,
    ) -> Result<Option<Object>>;

    async fn delete(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>>;

    /// Rejects an update body before anything is read from the backend.
    fn check_update(&self, _request: &ApiRequest, _schema: &Schema, _data: &Object) -> Result<()> {
        Ok(())
    }

    /// A change stream that ends when the receiver is dropped. `None` when the
    /// store cannot watch.
    async fn watch(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        opts: &QueryOptions,
    ) -> Result<Option<mpsc::Receiver<WatchEvent>>>;
}

/// Forwards `rx` through `f` on a spawned task until either side closes.
pub(crate) fn pipe_events<F>(
    mut rx: mpsc::Receiver<WatchEvent>,
    f: F,
) -> mpsc::Receiver<WatchEvent>
where
    F: Fn(WatchEvent) -> Option<WatchEvent> + Send + 'static,
{
    let (tx, out) = mpsc::channel(WATCH_BUFFER);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let Some(event) = f(event) else { continue };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    out
}

/// Builds the served decorator stack for one schema.
pub fn wrap_store(
    store: Arc<dyn Store>,
    transform: Option<(Option<ObjectTransformer>, Option<ListTransformer>)>,
) -> Arc<dyn Store> {
    let store: Arc<dyn Store> = Arc::new(MapperStore::new(Arc::new(ErrorStore::new(store))));
    let store: Arc<dyn Store> = match transform {
        Some((object, list)) => Arc::new(TransformStore::new(store, object, list)),
        None => store,
    };
    Arc::new(AccessStore::new(store))
}
