mod common;

use axum::http::{Method, StatusCode};
use common::{app, call, ids, seed};
use schemapi::MemoryClient;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn create_get_update_delete_widget() {
    let client = Arc::new(MemoryClient::new());
    let app = app(client.clone());

    let (status, headers, created) = call(
        &app,
        Method::POST,
        "/v1/widgets",
        Some(json!({"name": "w1", "size": 3, "tier": "gold", "bogus": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers["x-api-schemas"], "http://localhost/v1/schemas");
    assert_eq!(created["type"], "widget");
    assert_eq!(created["id"], "default:w1");
    assert_eq!(created["namespace"], "default");
    assert_eq!(created["size"], 3);
    assert_eq!(created["color"], "red");
    assert_eq!(created["tier"], "gold");
    assert!(created.get("bogus").is_none());
    assert!(created.get("kind").is_none());
    assert_eq!(created["links"]["self"], "http://localhost/v1/widgets/default:w1");
    assert_eq!(
        created["actions"]["describe"],
        "http://localhost/v1/widgets/default:w1?action=describe"
    );
    let version = created["resourceVersion"].as_str().expect("resourceVersion").to_string();

    let (status, _, fetched) = call(&app, Method::GET, "/v1/widgets/default:w1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["size"], 3);

    let (status, _, updated) = call(
        &app,
        Method::PUT,
        "/v1/widgets/default:w1",
        Some(json!({"size": 4, "resourceVersion": version})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["size"], 4);
    assert_eq!(updated["tier"], "gold");
    assert_ne!(updated["resourceVersion"], created["resourceVersion"]);

    let (status, _, body) = call(&app, Method::DELETE, "/v1/widgets/default:w1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
    assert!(client.is_empty().await);

    let (status, _, error) = call(&app, Method::GET, "/v1/widgets/default:w1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "NotFound");
}

#[tokio::test]
async fn put_without_resource_version_is_rejected() {
    let client = Arc::new(MemoryClient::new());
    seed(&client, "default", "w1", 3, "red").await;
    let app = app(client.clone());

    let (status, _, error) = call(&app, Method::PUT, "/v1/widgets/default:w1", Some(json!({"size": 9}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "InvalidBodyContent");
    assert_eq!(error["message"], "resourceVersion required");

    let (_, _, unchanged) = call(&app, Method::GET, "/v1/widgets/default:w1", None).await;
    assert_eq!(unchanged["size"], 3);

    let (status, _, error) = call(&app, Method::PUT, "/v1/widgets/default:nope", Some(json!({"size": 9}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["message"], "resourceVersion required");
}

#[tokio::test]
async fn stale_resource_version_conflicts_and_patch_merges() {
    let client = Arc::new(MemoryClient::new());
    seed(&client, "default", "w1", 3, "red").await;
    let app = app(client.clone());

    let (status, _, error) = call(
        &app,
        Method::PUT,
        "/v1/widgets/default:w1",
        Some(json!({"size": 9, "resourceVersion": "stale"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], "Conflict");

    let (status, _, patched) = call(&app, Method::PATCH, "/v1/widgets/default:w1", Some(json!({"size": 9}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["size"], 9);
    assert_eq!(patched["color"], "red");
}

#[tokio::test]
async fn invalid_input_never_reaches_the_backend() {
    let client = Arc::new(MemoryClient::new());
    let app = app(client.clone());

    let (status, _, error) = call(&app, Method::POST, "/v1/widgets", Some(json!({"name": "w1", "size": 500}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "MaxLimitExceeded");
    assert_eq!(error["fieldName"], "size");

    let (status, _, error) = call(&app, Method::POST, "/v1/widgets", Some(json!({"name": "w1", "color": "pink"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "InvalidOption");

    let response = common::send(
        &app,
        Method::POST,
        "/v1/widgets",
        &[("content-type", "application/json")],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    assert_eq!(client.len().await, 1);
}

#[tokio::test]
async fn malformed_body_is_invalid_content() {
    let app = app(Arc::new(MemoryClient::new()));
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/v1/widgets")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .expect("request should build");
    let response = tower::ServiceExt::oneshot(app, request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: serde_json::Value = serde_json::from_str(&common::text(response).await).expect("json");
    assert_eq!(error["code"], "InvalidBodyContent");
}

#[tokio::test]
async fn verbs_outside_the_schema_are_refused() {
    let app = app(Arc::new(MemoryClient::new()));

    let (status, _, error) = call(&app, Method::DELETE, "/v1/widgets", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(error["code"], "MethodNotAllowed");

    let (status, _, _) = call(&app, Method::POST, "/v1/schemas", Some(json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _, error) = call(&app, Method::GET, "/v1/widgets/a/b/c", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["message"], "No handler for path");
}

#[tokio::test]
async fn remove_action_aliases_delete() {
    let client = Arc::new(MemoryClient::new());
    seed(&client, "default", "w1", 3, "red").await;
    let app = app(client.clone());

    let (status, _, _) = call(&app, Method::POST, "/v1/widgets/default:w1?action=remove", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(client.is_empty().await);
}

#[tokio::test]
async fn list_spans_namespaces_unless_one_is_selected() {
    let client = Arc::new(MemoryClient::new());
    seed(&client, "default", "w1", 1, "red").await;
    seed(&client, "ns1", "w2", 2, "blue").await;
    seed(&client, "ns2", "w3", 3, "blue").await;
    let app = app(client.clone());

    let (_, _, all) = call(&app, Method::GET, "/v1/widgets", None).await;
    assert_eq!(ids(&all), vec!["default:w1", "ns1:w2", "ns2:w3"]);

    let (_, _, some) = call(&app, Method::GET, "/v1/widgets?namespaces=ns1,ns2", None).await;
    assert_eq!(ids(&some), vec!["ns1:w2", "ns2:w3"]);

    let (_, _, scoped) = call(&app, Method::GET, "/v1/namespaces/ns1/widgets", None).await;
    assert_eq!(ids(&scoped), vec!["ns1:w2"]);
    assert_eq!(scoped["links"]["self"], "http://localhost/v1/namespaces/ns1/widgets");
    assert_eq!(
        scoped["data"][0]["links"]["self"],
        "http://localhost/v1/namespaces/ns1/widgets/ns1:w2"
    );

    let (status, _, created) = call(
        &app,
        Method::POST,
        "/v1/namespaces/ns2/widgets",
        Some(json!({"name": "w4"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], "ns2:w4");
}
