use crate::data::Object;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// A status-coded failure reported by a resource backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} ({code}): {message}")]
pub struct StatusError {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

impl StatusError {
    pub fn new(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(404, "NotFound", format!("{} not found", name))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, "Conflict", message)
    }

    pub fn already_exists(name: &str) -> Self {
        Self::new(409, "AlreadyExists", format!("{} already exists", name))
    }

    pub fn is_conflict(&self) -> bool {
        self.code == 409
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Comma separated `key=value` label requirements.
    pub label_selector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientList {
    pub items: Vec<Object>,
    pub revision: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEventKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientEvent {
    pub kind: ClientEventKind,
    pub object: Object,
}

/// Raw CRUD and watch over backend objects addressed by namespace and name.
///
/// Objects keep their backend shape: `metadata.name`, `metadata.namespace`
/// and `metadata.resourceVersion` are expected. `update` rejects a stale
/// `resourceVersion` with a 409.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Object>, StatusError>;

    async fn list(&self, namespace: Option<&str>, opts: &ListOptions) -> Result<ClientList, StatusError>;

    async fn create(&self, namespace: Option<&str>, object: Object) -> Result<Object, StatusError>;

    async fn update(&self, namespace: Option<&str>, object: Object) -> Result<Object, StatusError>;

    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<(), StatusError>;

    async fn watch(&self, namespace: Option<&str>) -> Result<mpsc::Receiver<ClientEvent>, StatusError>;
}
