mod common;

use axum::http::{Method, StatusCode};
use common::{app, call, ids, seed};
use schemapi::MemoryClient;
use std::sync::Arc;

async fn ten_items() -> axum::Router {
    let client = Arc::new(MemoryClient::new());
    for i in 0..10 {
        let color = if i % 2 == 0 { "red" } else { "blue" };
        seed(&client, "default", &format!("item{:02}", i), i, color).await;
    }
    app(client)
}

#[tokio::test]
async fn page_starts_at_the_marker() {
    let app = ten_items().await;
    let (status, _, page) = call(&app, Method::GET, "/v1/widgets?limit=3&marker=default:item03", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&page), vec!["default:item03", "default:item04", "default:item05"]);

    let pagination = &page["pagination"];
    assert_eq!(pagination["partial"], true);
    assert_eq!(pagination["limit"], 3);
    assert_eq!(pagination["total"], 10);
    assert_eq!(
        pagination["previous"],
        "http://localhost/v1/widgets?limit=3&marker=default%3Aitem00"
    );
    assert_eq!(
        pagination["next"],
        "http://localhost/v1/widgets?limit=3&marker=default%3Aitem06"
    );
}

#[tokio::test]
async fn limits_fall_back_and_cap() {
    let app = ten_items().await;

    let (_, _, page) = call(&app, Method::GET, "/v1/widgets?limit=-1", None).await;
    assert_eq!(page["pagination"]["limit"], 100);
    assert_eq!(page["pagination"]["partial"], false);
    assert_eq!(ids(&page).len(), 10);

    let (_, _, page) = call(&app, Method::GET, "/v1/widgets?limit=99999", None).await;
    assert_eq!(page["pagination"]["limit"], 3000);
}

#[tokio::test]
async fn filters_and_sort_apply_before_paging() {
    let app = ten_items().await;

    let (_, _, page) = call(&app, Method::GET, "/v1/widgets?color=blue&limit=2", None).await;
    assert_eq!(ids(&page), vec!["default:item01", "default:item03"]);
    assert_eq!(page["pagination"]["total"], 5);
    assert_eq!(page["filters"]["color"][0]["modifier"], "eq");
    assert_eq!(page["filters"]["color"][0]["value"], "blue");
    assert!(page["filters"]["size"].is_null());

    let (_, _, page) = call(&app, Method::GET, "/v1/widgets?name_ne=item00&sort=name&order=desc&limit=2", None).await;
    assert_eq!(ids(&page), vec!["default:item09", "default:item08"]);
    assert_eq!(page["sort"]["name"], "name");
    assert_eq!(page["sort"]["order"], "desc");

    let (_, _, page) = call(&app, Method::GET, "/v1/widgets?name_like=item", None).await;
    assert_eq!(ids(&page).len(), 10, "unknown modifiers are ignored");
}

#[tokio::test]
async fn collection_envelope_describes_itself() {
    let app = ten_items().await;
    let (_, _, page) = call(&app, Method::GET, "/v1/widgets?limit=1", None).await;
    assert_eq!(page["type"], "collection");
    assert_eq!(page["resourceType"], "widget");
    assert_eq!(page["links"]["self"], "http://localhost/v1/widgets");
    assert_eq!(page["createTypes"]["widget"], "http://localhost/v1/widgets");
    assert_eq!(page["actions"]["purge"], "http://localhost/v1/widgets?action=purge");
    assert_eq!(page["sort"]["links"]["name"], "http://localhost/v1/widgets?limit=1&sort=name");
    assert!(page["sort"]["links"].get("size").is_none());
    assert_eq!(page["revision"], "10");
}
