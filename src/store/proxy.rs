use super::client::{ClientEventKind, ListOptions, ResourceClient};
use super::{ObjectList, Store, WATCH_BUFFER, WatchEvent};
use crate::data::{Object, get_str, merge, put_value};
use crate::error::{ApiError, ErrorCode, Result};
use crate::mapper::FIELD_DOMAIN;
use crate::types::{ApiRequest, QueryOptions, Schema, Scope};
use async_trait::async_trait;
use futures::future::try_join_all;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Bounded retry for updates that lose an optimistic-concurrency race.
#[derive(Debug, Clone)]
pub struct ConflictRetryPolicy {
    /// Total update attempts, including the first.
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 5,
            max_backoff_ms: 100,
        }
    }
}

impl ConflictRetryPolicy {
    /// Exponential backoff after `attempt` failed, capped at `max_backoff_ms`.
    pub fn backoff_ms(&self, attempt: usize) -> u64 {
        let base = self.base_backoff_ms.max(1);
        let cap = self.max_backoff_ms.max(base);
        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }
        backoff
    }
}

#[async_trait]
pub trait Backoff: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioBackoff;

#[async_trait]
impl Backoff for TokioBackoff {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Serves a schema from a `ResourceClient`.
///
/// Namespaced resources get ids of the form `namespace:name`; cluster
/// resources use the bare name.
pub struct ProxyStore {
    client: Arc<dyn ResourceClient>,
    kind: String,
    api_version: String,
    retry: ConflictRetryPolicy,
    backoff: Arc<dyn Backoff>,
}

impl ProxyStore {
    pub fn new(client: Arc<dyn ResourceClient>, kind: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            client,
            kind: kind.into(),
            api_version: api_version.into(),
            retry: ConflictRetryPolicy::default(),
            backoff: Arc::new(TokioBackoff),
        }
    }

    pub fn with_retry(mut self, retry: ConflictRetryPolicy, backoff: Arc<dyn Backoff>) -> Self {
        self.retry = retry;
        self.backoff = backoff;
        self
    }

    fn split_id<'a>(&self, request: &'a ApiRequest, schema: &Schema, id: &'a str) -> (Option<&'a str>, &'a str) {
        if schema.scope != Scope::Namespace {
            return (None, id);
        }
        match id.split_once(':') {
            Some((namespace, name)) => (Some(namespace), name),
            None => (request.namespaces.first().map(String::as_str), id),
        }
    }

    fn to_api(&self, schema: &Schema, object: Object) -> Object {
        ProxyIds {
            namespaced: schema.scope == Scope::Namespace,
        }
        .with_id(object)
    }

    fn list_options(&self, request: &ApiRequest) -> ListOptions {
        ListOptions {
            label_selector: request.option("labelSelector").map(str::to_string),
        }
    }

    fn namespace_for_create(&self, request: &ApiRequest, schema: &Schema, data: &Object) -> Result<Option<String>> {
        if schema.scope != Scope::Namespace {
            return Ok(None);
        }
        get_str(data, &["metadata", "namespace"])
            .filter(|ns| !ns.is_empty())
            .or_else(|| request.namespaces.first().map(String::as_str))
            .map(|ns| Some(ns.to_string()))
            .ok_or_else(|| ApiError::field(ErrorCode::MissingRequired, "namespace", "namespace is required"))
    }
}

fn generated_name(schema: &Schema) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", schema.id.to_lowercase(), &suffix[..5])
}

#[async_trait]
impl Store for ProxyStore {
    async fn by_id(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        let (namespace, name) = self.split_id(request, schema, id);
        let object = self.client.get(namespace, name).await?;
        Ok(object.map(|o| self.to_api(schema, o)))
    }

    async fn list(&self, request: &ApiRequest, schema: &Schema, _opts: &QueryOptions) -> Result<ObjectList> {
        let opts = self.list_options(request);
        let lists = if schema.scope == Scope::Namespace && !request.namespaces.is_empty() {
            // Any failing namespace fails the whole list.
            try_join_all(
                request
                    .namespaces
                    .iter()
                    .map(|ns| self.client.list(Some(ns.as_str()), &opts)),
            )
            .await?
        } else {
            vec![self.client.list(None, &opts).await?]
        };

        let mut result = ObjectList::default();
        for list in lists {
            if !list.revision.is_empty() {
                result.revision = list.revision;
            }
            result
                .objects
                .extend(list.items.into_iter().map(|o| self.to_api(schema, o)));
        }
        debug!("listed {} {} objects", result.objects.len(), schema.id);
        Ok(result)
    }

    async fn create(&self, request: &ApiRequest, schema: &Schema, mut data: Object) -> Result<Option<Object>> {
        let namespace = self.namespace_for_create(request, schema, &data)?;
        if get_str(&data, &["metadata", "name"]).is_none_or(str::is_empty) {
            put_value(&mut data, Value::from(generated_name(schema)), &["metadata", "name"]);
        }
        if let Some(ns) = &namespace {
            put_value(&mut data, Value::from(ns.as_str()), &["metadata", "namespace"]);
        }
        if let Some(user) = request.user_name() {
            let key = format!("{}/creatorId", FIELD_DOMAIN);
            put_value(&mut data, Value::from(user), &["metadata", "annotations", key.as_str()]);
        }
        data.insert("kind".into(), Value::from(self.kind.as_str()));
        data.insert("apiVersion".into(), Value::from(self.api_version.as_str()));

        let created = self.client.create(namespace.as_deref(), data).await?;
        Ok(Some(self.to_api(schema, created)))
    }

    async fn update(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        data: Object,
        id: &str,
    ) -> Result<Option<Object>> {
        self.check_update(request, schema, &data)?;
        let (namespace, name) = self.split_id(request, schema, id);
        let client_version = get_str(&data, &["metadata", "resourceVersion"]).map(str::to_string);
        let replace = request.option("_replace") == Some("true");

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1usize;
        loop {
            let existing = self
                .client
                .get(namespace, name)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("failed to find {}", id)))?;
            let current_version = get_str(&existing, &["metadata", "resourceVersion"]).map(str::to_string);
            if attempt == 1 && client_version.is_some() && client_version != current_version {
                return Err(ApiError::new(
                    ErrorCode::Conflict,
                    format!("{} has been modified, resourceVersion is {}", id, current_version.unwrap_or_default()),
                ));
            }

            let mut merged = if replace {
                let mut replaced = data.clone();
                for key in ["kind", "apiVersion"] {
                    if let Some(value) = existing.get(key) {
                        replaced.insert(key.into(), value.clone());
                    }
                }
                put_value(&mut replaced, Value::from(name), &["metadata", "name"]);
                replaced
            } else {
                let mut merged = existing.clone();
                merge(&mut merged, &data);
                merged
            };
            if let Some(version) = &current_version {
                put_value(&mut merged, Value::from(version.as_str()), &["metadata", "resourceVersion"]);
            }

            match self.client.update(namespace, merged).await {
                Ok(updated) => return Ok(Some(self.to_api(schema, updated))),
                Err(err) if err.is_conflict() && attempt < max_attempts => {
                    let backoff_ms = self.retry.backoff_ms(attempt);
                    warn!(
                        "update of {} {} retry on conflict (attempt {} of {}): {} (backoff={}ms)",
                        schema.id, id, attempt, max_attempts, err, backoff_ms
                    );
                    self.backoff.sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// PUT must carry the version it was based on; PATCH merges without one.
    fn check_update(&self, request: &ApiRequest, _schema: &Schema, data: &Object) -> Result<()> {
        if request.method == http::Method::PUT && get_str(data, &["metadata", "resourceVersion"]).is_none() {
            return Err(ApiError::new(
                ErrorCode::InvalidBodyContent,
                "resourceVersion required",
            ));
        }
        Ok(())
    }

    async fn delete(&self, request: &ApiRequest, schema: &Schema, id: &str) -> Result<Option<Object>> {
        let (namespace, name) = self.split_id(request, schema, id);
        self.client.delete(namespace, name).await?;
        // Objects held by finalizers are still readable after delete.
        let remaining = self.client.get(namespace, name).await?;
        Ok(remaining.map(|o| self.to_api(schema, o)))
    }

    async fn watch(
        &self,
        request: &ApiRequest,
        schema: &Schema,
        _opts: &QueryOptions,
    ) -> Result<Option<mpsc::Receiver<WatchEvent>>> {
        let namespaced = schema.scope == Scope::Namespace;
        let single = match request.namespaces.as_slice() {
            [only] if namespaced => Some(only.as_str()),
            _ => None,
        };
        let mut events = self.client.watch(single).await?;
        let allowed: Vec<String> = if namespaced { request.namespaces.clone() } else { Vec::new() };
        let schema = schema.clone();
        let proxy = ProxyIds { namespaced };
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        let namespace = get_str(&event.object, &["metadata", "namespace"]).unwrap_or_default();
                        if !allowed.is_empty() && !allowed.iter().any(|ns| ns == namespace) {
                            continue;
                        }
                        let object = proxy.with_id(event.object);
                        let event = match event.kind {
                            ClientEventKind::Deleted => WatchEvent::Remove(object),
                            _ => WatchEvent::Change(object),
                        };
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("watch on {} stopped", schema.id);
        });
        Ok(Some(rx))
    }
}

/// Assigns API ids to backend objects.
struct ProxyIds {
    namespaced: bool,
}

impl ProxyIds {
    fn with_id(&self, mut object: Object) -> Object {
        let name = get_str(&object, &["metadata", "name"]).unwrap_or_default();
        let id = match get_str(&object, &["metadata", "namespace"]) {
            Some(namespace) if self.namespaced && !namespace.is_empty() => format!("{}:{}", namespace, name),
            _ => name.to_string(),
        };
        object.insert("id".into(), Value::from(id));
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::client::{ClientEvent, ClientList, StatusError};
    use crate::store::MemoryClient;
    use crate::types::{Schemas, UserInfo};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn obj(value: Value) -> Object {
        value.as_object().cloned().expect("object")
    }

    fn widget_schema() -> Schema {
        Schema::new("widget").with_scope(Scope::Namespace)
    }

    fn request(method: http::Method) -> ApiRequest {
        ApiRequest::new(Arc::new(Schemas::new()))
            .with_method(method)
            .with_namespaces(vec!["default".into()])
    }

    /// Fails the first `failures` updates with a conflict, then delegates.
    struct Contended {
        inner: MemoryClient,
        failures: AtomicUsize,
        updates: AtomicUsize,
    }

    #[async_trait]
    impl ResourceClient for Contended {
        async fn get(&self, namespace: Option<&str>, name: &str) -> std::result::Result<Option<Object>, StatusError> {
            self.inner.get(namespace, name).await
        }
        async fn list(&self, namespace: Option<&str>, opts: &ListOptions) -> std::result::Result<ClientList, StatusError> {
            self.inner.list(namespace, opts).await
        }
        async fn create(&self, namespace: Option<&str>, object: Object) -> std::result::Result<Object, StatusError> {
            self.inner.create(namespace, object).await
        }
        async fn update(&self, namespace: Option<&str>, object: Object) -> std::result::Result<Object, StatusError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StatusError::conflict("object was modified"));
            }
            self.inner.update(namespace, object).await
        }
        async fn delete(&self, namespace: Option<&str>, name: &str) -> std::result::Result<(), StatusError> {
            self.inner.delete(namespace, name).await
        }
        async fn watch(&self, namespace: Option<&str>) -> std::result::Result<mpsc::Receiver<ClientEvent>, StatusError> {
            self.inner.watch(namespace).await
        }
    }

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    struct RecordingBackoff(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Backoff for RecordingBackoff {
        async fn sleep(&self, delay: Duration) {
            self.0.lock().expect("lock").push(delay);
        }
    }

    async fn contended(failures: usize) -> (Arc<Contended>, Arc<RecordingBackoff>, ProxyStore) {
        let client = Arc::new(Contended {
            inner: MemoryClient::new(),
            failures: AtomicUsize::new(failures),
            updates: AtomicUsize::new(0),
        });
        client
            .inner
            .insert(Some("default"), obj(json!({"metadata": {"name": "w1"}, "spec": {"size": 1, "color": "red"}})))
            .await;
        let backoff = Arc::new(RecordingBackoff::default());
        let store = ProxyStore::new(client.clone(), "Widget", "example.io/v1")
            .with_retry(ConflictRetryPolicy::default(), backoff.clone());
        (client, backoff, store)
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = ConflictRetryPolicy {
            max_attempts: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 35,
        };
        let delays: Vec<u64> = (1..=4).map(|a| policy.backoff_ms(a)).collect();
        assert_eq!(delays, vec![10, 20, 35, 35]);
    }

    #[tokio::test]
    async fn create_generates_name_and_records_creator() {
        let client = Arc::new(MemoryClient::new());
        let store = ProxyStore::new(client.clone(), "Widget", "example.io/v1");
        let mut req = request(http::Method::POST);
        req.user = Some(UserInfo {
            name: "alice".into(),
            groups: vec![],
        });
        let created = store
            .create(&req, &widget_schema(), obj(json!({"spec": {"size": 2}})))
            .await
            .unwrap()
            .expect("created");

        let name = get_str(&created, &["metadata", "name"]).expect("name");
        assert!(name.starts_with("widget-"));
        assert_eq!(name.len(), "widget-".len() + 5);
        assert_eq!(created["id"], format!("default:{}", name));
        assert_eq!(created["kind"], "Widget");
        assert_eq!(
            created["metadata"]["annotations"]["field.schemapi.io/creatorId"],
            "alice"
        );
    }

    #[tokio::test]
    async fn put_without_resource_version_fails_before_backend() {
        let (client, _, store) = contended(0).await;
        let err = store
            .update(&request(http::Method::PUT), &widget_schema(), obj(json!({"spec": {"size": 3}})), "default:w1")
            .await
            .expect_err("version required");
        assert_eq!(err.code, ErrorCode::InvalidBodyContent);
        assert_eq!(err.message, "resourceVersion required");
        assert_eq!(client.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_resource_version_is_a_conflict() {
        let (_, _, store) = contended(0).await;
        let err = store
            .update(
                &request(http::Method::PUT),
                &widget_schema(),
                obj(json!({"metadata": {"resourceVersion": "0"}})),
                "default:w1",
            )
            .await
            .expect_err("stale");
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn conflicts_retry_then_merge() {
        let (client, backoff, store) = contended(2).await;
        let updated = store
            .update(
                &request(http::Method::PUT),
                &widget_schema(),
                obj(json!({"metadata": {"resourceVersion": "1"}, "spec": {"size": 3}})),
                "default:w1",
            )
            .await
            .unwrap()
            .expect("updated");
        assert_eq!(updated["spec"], json!({"size": 3, "color": "red"}));
        assert_eq!(client.updates.load(Ordering::SeqCst), 3);
        assert_eq!(backoff.0.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn conflicts_past_budget_surface() {
        let (client, _, store) = contended(10).await;
        let err = store
            .update(&request(http::Method::PATCH), &widget_schema(), obj(json!({"spec": {"size": 3}})), "default:w1")
            .await
            .expect_err("budget spent");
        assert_eq!(crate::store::translate_error(err).code, ErrorCode::Conflict);
        assert_eq!(client.updates.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn replace_drops_unspecified_fields() {
        let (_, _, store) = contended(0).await;
        let mut req = request(http::Method::PATCH);
        req.query.insert("_replace", "true");
        let updated = store
            .update(&req, &widget_schema(), obj(json!({"spec": {"size": 9}})), "default:w1")
            .await
            .unwrap()
            .expect("updated");
        assert_eq!(updated["spec"], json!({"size": 9}));
        assert!(updated.get("kind").is_none());
    }

    #[tokio::test]
    async fn list_fans_out_per_namespace() {
        let client = Arc::new(MemoryClient::new());
        for (ns, name) in [("a", "w1"), ("b", "w2"), ("c", "w3")] {
            client.insert(Some(ns), obj(json!({"metadata": {"name": name}}))).await;
        }
        let store = ProxyStore::new(client, "Widget", "example.io/v1");
        let req = request(http::Method::GET).with_namespaces(vec!["a".into(), "b".into()]);
        let list = store.list(&req, &widget_schema(), &QueryOptions::default()).await.unwrap();
        let mut ids: Vec<_> = list.objects.iter().map(|o| o["id"].as_str().unwrap_or_default().to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a:w1", "b:w2"]);
    }

    /// Fails every list for one namespace.
    struct BrokenNamespace {
        inner: MemoryClient,
        broken: &'static str,
    }

    #[async_trait]
    impl ResourceClient for BrokenNamespace {
        async fn get(&self, namespace: Option<&str>, name: &str) -> std::result::Result<Option<Object>, StatusError> {
            self.inner.get(namespace, name).await
        }
        async fn list(&self, namespace: Option<&str>, opts: &ListOptions) -> std::result::Result<ClientList, StatusError> {
            if namespace == Some(self.broken) {
                return Err(StatusError::new(503, "ServiceUnavailable", "namespace unavailable"));
            }
            self.inner.list(namespace, opts).await
        }
        async fn create(&self, namespace: Option<&str>, object: Object) -> std::result::Result<Object, StatusError> {
            self.inner.create(namespace, object).await
        }
        async fn update(&self, namespace: Option<&str>, object: Object) -> std::result::Result<Object, StatusError> {
            self.inner.update(namespace, object).await
        }
        async fn delete(&self, namespace: Option<&str>, name: &str) -> std::result::Result<(), StatusError> {
            self.inner.delete(namespace, name).await
        }
        async fn watch(&self, namespace: Option<&str>) -> std::result::Result<mpsc::Receiver<ClientEvent>, StatusError> {
            self.inner.watch(namespace).await
        }
    }

    #[tokio::test]
    async fn one_failing_namespace_fails_the_list() {
        let client = Arc::new(BrokenNamespace {
            inner: MemoryClient::new(),
            broken: "b",
        });
        for (ns, name) in [("a", "w1"), ("b", "w2")] {
            client.inner.insert(Some(ns), obj(json!({"metadata": {"name": name}}))).await;
        }
        let store = ProxyStore::new(client, "Widget", "example.io/v1");

        let req = request(http::Method::GET).with_namespaces(vec!["a".into(), "b".into()]);
        let err = store
            .list(&req, &widget_schema(), &QueryOptions::default())
            .await
            .expect_err("no partial list");
        let err = crate::store::translate_error(err);
        assert_eq!(err.code, ErrorCode::ServerError);
        assert_eq!(err.message, "namespace unavailable");

        let req = request(http::Method::GET).with_namespaces(vec!["a".into()]);
        let list = store.list(&req, &widget_schema(), &QueryOptions::default()).await.unwrap();
        assert_eq!(list.objects.len(), 1);
    }

    #[tokio::test]
    async fn delete_returns_nothing_once_gone() {
        let (_, _, store) = contended(0).await;
        let req = request(http::Method::DELETE);
        assert!(store.delete(&req, &widget_schema(), "default:w1").await.unwrap().is_none());
        assert!(store.by_id(&req, &widget_schema(), "default:w1").await.unwrap().is_none());
    }
}
