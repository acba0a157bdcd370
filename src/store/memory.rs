use super::client::{ClientEvent, ClientEventKind, ClientList, ListOptions, ResourceClient, StatusError};
use super::WATCH_BUFFER;
use crate::data::{Object, get_str, put_value};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, broadcast, mpsc};

type Key = (String, String);

/// In-process `ResourceClient` with per-write `resourceVersion` stamping and
/// broadcast watches.
pub struct MemoryClient {
    objects: RwLock<BTreeMap<Key, Object>>,
    revision: AtomicU64,
    events: broadcast::Sender<(String, ClientEvent)>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

fn key(namespace: Option<&str>, name: &str) -> Key {
    (namespace.unwrap_or_default().to_string(), name.to_string())
}

fn name_of(object: &Object) -> Option<&str> {
    get_str(object, &["metadata", "name"]).filter(|n| !n.is_empty())
}

fn matches_selector(object: &Object, selector: &str) -> bool {
    let labels = object
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(Value::as_object);
    selector
        .split(',')
        .map(str::trim)
        .filter(|req| !req.is_empty())
        .all(|req| {
            let label = |k: &str| labels.and_then(|l| l.get(k)).and_then(Value::as_str);
            match req.split_once("!=") {
                Some((k, v)) => label(k.trim()) != Some(v.trim()),
                None => match req.split_once('=') {
                    Some((k, v)) => label(k.trim()) == Some(v.trim_start_matches('=').trim()),
                    None => label(req).is_some(),
                },
            }
        })
}

impl MemoryClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            revision: AtomicU64::new(0),
            events,
        }
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn publish(&self, namespace: Option<&str>, kind: ClientEventKind, object: &Object) {
        // No subscribers is not an error.
        let _ = self.events.send((
            namespace.unwrap_or_default().to_string(),
            ClientEvent {
                kind,
                object: object.clone(),
            },
        ));
    }

    /// Stores `object` as-is apart from a fresh version, replacing any
    /// existing entry. Meant for seeding.
    pub async fn insert(&self, namespace: Option<&str>, mut object: Object) -> Object {
        let name = name_of(&object).unwrap_or_default().to_string();
        if let Some(ns) = namespace {
            put_value(&mut object, Value::from(ns), &["metadata", "namespace"]);
        }
        put_value(&mut object, Value::from(self.next_revision()), &["metadata", "resourceVersion"]);
        self.objects
            .write()
            .await
            .insert(key(namespace, &name), object.clone());
        self.publish(namespace, ClientEventKind::Added, &object);
        object
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ResourceClient for MemoryClient {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Object>, StatusError> {
        Ok(self.objects.read().await.get(&key(namespace, name)).cloned())
    }

    async fn list(&self, namespace: Option<&str>, opts: &ListOptions) -> Result<ClientList, StatusError> {
        let objects = self.objects.read().await;
        let items = objects
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns))
            .map(|(_, object)| object)
            .filter(|object| {
                opts.label_selector
                    .as_deref()
                    .is_none_or(|selector| matches_selector(object, selector))
            })
            .cloned()
            .collect();
        Ok(ClientList {
            items,
            revision: self.revision.load(Ordering::SeqCst).to_string(),
        })
    }

    async fn create(&self, namespace: Option<&str>, mut object: Object) -> Result<Object, StatusError> {
        let Some(name) = name_of(&object).map(str::to_string) else {
            return Err(StatusError::new(422, "Invalid", "metadata.name is required"));
        };
        let mut objects = self.objects.write().await;
        let key = key(namespace, &name);
        if objects.contains_key(&key) {
            return Err(StatusError::already_exists(&name));
        }
        if let Some(ns) = namespace {
            put_value(&mut object, Value::from(ns), &["metadata", "namespace"]);
        }
        put_value(&mut object, Value::from(self.next_revision()), &["metadata", "resourceVersion"]);
        objects.insert(key, object.clone());
        drop(objects);
        self.publish(namespace, ClientEventKind::Added, &object);
        Ok(object)
    }

    async fn update(&self, namespace: Option<&str>, mut object: Object) -> Result<Object, StatusError> {
        let Some(name) = name_of(&object).map(str::to_string) else {
            return Err(StatusError::new(422, "Invalid", "metadata.name is required"));
        };
        let mut objects = self.objects.write().await;
        let key = key(namespace, &name);
        let Some(current) = objects.get(&key) else {
            return Err(StatusError::not_found(&name));
        };
        let current_version = get_str(current, &["metadata", "resourceVersion"]);
        let requested = get_str(&object, &["metadata", "resourceVersion"]);
        if requested.is_some() && requested != current_version {
            return Err(StatusError::conflict(format!(
                "the object {} has been modified; please apply your changes to the latest version",
                name
            )));
        }
        put_value(&mut object, Value::from(self.next_revision()), &["metadata", "resourceVersion"]);
        objects.insert(key, object.clone());
        drop(objects);
        self.publish(namespace, ClientEventKind::Modified, &object);
        Ok(object)
    }

    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<(), StatusError> {
        let removed = self.objects.write().await.remove(&key(namespace, name));
        match removed {
            Some(object) => {
                self.publish(namespace, ClientEventKind::Deleted, &object);
                Ok(())
            }
            None => Err(StatusError::not_found(name)),
        }
    }

    async fn watch(&self, namespace: Option<&str>) -> Result<mpsc::Receiver<ClientEvent>, StatusError> {
        let mut events = self.events.subscribe();
        let wanted = namespace.map(str::to_string);
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    received = events.recv() => match received {
                        Ok((ns, event)) => {
                            if wanted.as_deref().is_some_and(|w| w != ns) {
                                continue;
                            }
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!("memory watch lagged, dropped {} events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn widget(name: &str) -> Object {
        json!({"metadata": {"name": name, "labels": {"tier": "gold"}}})
            .as_object()
            .cloned()
            .expect("object")
    }

    #[tokio::test]
    async fn create_stamps_versions_and_rejects_duplicates() {
        let client = MemoryClient::new();
        let created = client.create(Some("ns1"), widget("a")).await.unwrap();
        assert_eq!(get_str(&created, &["metadata", "resourceVersion"]), Some("1"));
        assert_eq!(get_str(&created, &["metadata", "namespace"]), Some("ns1"));

        let err = client.create(Some("ns1"), widget("a")).await.expect_err("duplicate");
        assert_eq!(err.code, 409);
        assert!(client.create(Some("ns2"), widget("a")).await.is_ok());
        assert_eq!(client.list(None, &ListOptions::default()).await.unwrap().items.len(), 2);
        assert_eq!(client.list(Some("ns1"), &ListOptions::default()).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let client = MemoryClient::new();
        let created = client.create(None, widget("a")).await.unwrap();
        let updated = client.update(None, created.clone()).await.unwrap();
        assert_eq!(get_str(&updated, &["metadata", "resourceVersion"]), Some("2"));

        let err = client.update(None, created).await.expect_err("stale version");
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn label_selector_filters_list() {
        let client = MemoryClient::new();
        client.create(None, widget("a")).await.unwrap();
        client
            .create(None, json!({"metadata": {"name": "b"}}).as_object().cloned().expect("object"))
            .await
            .unwrap();
        let opts = ListOptions {
            label_selector: Some("tier=gold".into()),
        };
        let list = client.list(None, &opts).await.unwrap();
        assert_eq!(list.items.len(), 1);
        let opts = ListOptions {
            label_selector: Some("tier!=gold".into()),
        };
        assert_eq!(client.list(None, &opts).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn watch_streams_namespace_events() {
        let client = MemoryClient::new();
        let mut rx = client.watch(Some("ns1")).await.unwrap();
        client.create(Some("ns2"), widget("skip")).await.unwrap();
        client.create(Some("ns1"), widget("a")).await.unwrap();
        client.delete(Some("ns1"), "a").await.unwrap();

        let first = rx.recv().await.expect("added");
        assert_eq!(first.kind, ClientEventKind::Added);
        assert_eq!(get_str(&first.object, &["metadata", "name"]), Some("a"));
        assert_eq!(rx.recv().await.expect("deleted").kind, ClientEventKind::Deleted);
    }
}
