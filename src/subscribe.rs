//! Change-event delivery over a websocket.
//!
//! Every watched schema gets one producer task that renders its events the
//! way reads are rendered and feeds a shared bounded channel. The session
//! task drains that channel into the socket alongside a periodic ping, while
//! a reader task consumes inbound frames. When either side ends, the channel
//! is dropped and each producer stops its backend watch.

use crate::error::{ApiError, ErrorCode, Result};
use crate::parse::query_options;
use crate::store::{WATCH_BUFFER, WatchEvent};
use crate::types::{ApiRequest, HandlerOutput, RequestHandler, Schema};
use crate::writer::convert;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Schemas named by `resourceTypes` (all when absent) that have a store and
/// that the caller may watch.
pub fn matching_schemas(request: &ApiRequest) -> Vec<Arc<Schema>> {
    let wanted: Vec<&str> = request
        .query
        .get_all("resourceTypes")
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    request
        .schemas
        .schemas()
        .iter()
        .filter(|schema| wanted.is_empty() || wanted.contains(&schema.id.as_str()))
        .filter(|schema| schema.store.is_some())
        .filter(|schema| request.access_control.can_watch(request, schema).is_ok())
        .cloned()
        .collect()
}

fn frame(event: &WatchEvent, data: Value) -> Value {
    json!({ "name": event.name(), "data": data })
}

fn spawn_producer(session: ApiRequest, mut events: mpsc::Receiver<WatchEvent>, tx: mpsc::Sender<Value>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let Some(data) = convert(&session, event.object()) else {
                        log::debug!("skipping unrenderable {} event", session.type_name);
                        continue;
                    };
                    if tx.send(frame(&event, Value::Object(data))).await.is_err() {
                        break;
                    }
                }
            }
        }
        log::debug!("stopped watching {}", session.type_name);
    });
}

/// Opens one watch per schema and merges the rendered events into a single
/// stream of frames. The stream ends once every watch has ended.
pub async fn fan_in(request: &ApiRequest, schemas: &[Arc<Schema>]) -> Result<mpsc::Receiver<Value>> {
    let (tx, rx) = mpsc::channel(WATCH_BUFFER);
    for schema in schemas {
        let Some(store) = schema.store.clone() else {
            continue;
        };
        let opts = query_options(request, schema);
        let Some(events) = store.watch(request, schema, &opts).await? else {
            continue;
        };
        log::debug!("watching {}", schema.id);
        let mut session = request.fork();
        session.type_name = schema.id.clone();
        session.schema = Some(schema.clone());
        spawn_producer(session, events, tx.clone());
    }
    Ok(rx)
}

async fn run_session(socket: WebSocket, mut frames: mpsc::Receiver<Value>) {
    let (mut sink, mut stream) = socket.split();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.tick().await;
    let ping = json!({ "name": "ping", "data": {} }).to_string();

    loop {
        let outbound = tokio::select! {
            _ = &mut reader => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame.to_string(),
                None => break,
            },
            _ = ticker.tick() => ping.clone(),
        };
        if let Err(err) = sink.send(Message::Text(outbound)).await {
            log::debug!("subscriber went away: {}", err);
            break;
        }
    }

    reader.abort();
    let _ = sink.close().await;
}

/// List handler for the `subscribe` schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeHandler;

#[async_trait]
impl RequestHandler for SubscribeHandler {
    async fn handle(&self, request: &mut ApiRequest) -> Result<HandlerOutput> {
        let schemas = matching_schemas(request);
        if schemas.is_empty() {
            return Err(ApiError::not_found("no resources types matched"));
        }
        let Some(upgrade) = request.upgrade.take() else {
            return Err(ApiError::new(
                ErrorCode::InvalidState,
                "subscribe requires a websocket upgrade",
            ));
        };
        let frames = fan_in(request, &schemas).await?;
        Ok(HandlerOutput::Response(
            upgrade.on_upgrade(move |socket| run_session(socket, frames)),
        ))
    }
}
