mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use common::{bearer, item_json, json_body, FakeGateway, GatewayMode, TestApp};
use marketplace_core::handlers::cart::{IDEMPOTENCY_KEY_HEADER, STRICT_CONFLICT_HEADER};

fn app() -> TestApp {
    TestApp::new(FakeGateway::new(GatewayMode::Pending))
}

fn add_item(owner: Uuid, version: i64, body: Value, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/cart/items")
        .header("authorization", bearer(owner))
        .header("content-type", "application/json")
        .header("if-match", version.to_string());
    if let Some(key) = key {
        builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn patch_item(owner: Uuid, item_id: &str, version: i64, quantity: i32) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(format!("/cart/items/{}", item_id))
        .header("authorization", bearer(owner))
        .header("content-type", "application/json")
        .header("if-match", version.to_string())
        .body(Body::from(json!({ "quantity": quantity }).to_string()))
        .unwrap()
}

fn get_cart(owner: Uuid) -> Request<Body> {
    Request::builder()
        .uri("/cart")
        .header("authorization", bearer(owner))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_cart_requires_authentication() {
    let app = app();
    let response = app
        .send(Request::builder().uri("/cart").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_new_cart_starts_at_version_one() {
    let app = app();
    let body = json_body(app.send(get_cart(Uuid::new_v4())).await).await;
    assert_eq!(body["cartVersion"], 1);
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_each_mutation_bumps_version_by_one() {
    let app = app();
    let owner = Uuid::new_v4();
    let product = Uuid::new_v4();

    let mut version = 1;
    for (size, quantity) in [("S", 1), ("M", 2), ("S", 3)] {
        let response = app
            .send(add_item(owner, version, item_json(product, Some(size), quantity), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["cartVersion"], version + 1);
        version += 1;
    }

    let body = json_body(app.send(get_cart(owner)).await).await;
    assert_eq!(body["cartVersion"], 4);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let small = items.iter().find(|i| i["size"] == "S").unwrap();
    assert_eq!(small["quantity"], 3);
}

#[tokio::test]
async fn test_stale_version_returns_conflict_with_current_state() {
    let app = app();
    let owner = Uuid::new_v4();
    let product = Uuid::new_v4();

    app.send(add_item(owner, 1, item_json(product, Some("S"), 1), None))
        .await;

    let response = app
        .send(add_item(owner, 1, item_json(product, Some("M"), 1), None))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = json_body(response).await;
    assert_eq!(body["status"], 409);
    assert_eq!(body["cartVersion"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    // Retrying with the version from the conflict succeeds.
    let retry = app
        .send(add_item(owner, 2, item_json(product, Some("M"), 1), None))
        .await;
    assert_eq!(retry.status(), StatusCode::OK);
    assert_eq!(json_body(retry).await["cartVersion"], 3);
}

#[tokio::test]
async fn test_idempotent_retry_applies_once() {
    let app = app();
    let owner = Uuid::new_v4();
    let product = Uuid::new_v4();

    let first = app
        .send(add_item(owner, 1, item_json(product, None, 2), Some("add-1")))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(json_body(first).await["cartVersion"], 2);

    // Same key, stale version: replayed rather than rejected.
    let replay = app
        .send(add_item(owner, 1, item_json(product, None, 2), Some("add-1")))
        .await;
    assert_eq!(replay.status(), StatusCode::OK);
    let body = json_body(replay).await;
    assert_eq!(body["cartVersion"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["quantity"], 2);
}

#[tokio::test]
async fn test_absent_and_default_selection_share_one_row() {
    let app = app();
    let owner = Uuid::new_v4();
    let product = Uuid::new_v4();

    app.send(add_item(owner, 1, item_json(product, None, 1), None))
        .await;
    let response = app
        .send(add_item(owner, 2, item_json(product, Some("default"), 4), None))
        .await;

    let body = json_body(response).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 4);
    assert_eq!(items[0]["size"], "default");
    assert_eq!(
        items[0]["key"],
        format!("{}-default-default-default", product)
    );
}

#[tokio::test]
async fn test_stale_version_is_checked_before_item_existence() {
    let app = app();
    let owner = Uuid::new_v4();
    let product = Uuid::new_v4();
    app.send(add_item(owner, 1, item_json(product, None, 1), None))
        .await;

    let missing = Uuid::new_v4().to_string();

    let stale = app.send(patch_item(owner, &missing, 1, 3)).await;
    assert_eq!(stale.status(), StatusCode::CONFLICT);

    let current = app.send(patch_item(owner, &missing, 2, 3)).await;
    assert_eq!(current.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_zero_quantity_removes_item() {
    let app = app();
    let owner = Uuid::new_v4();
    let body = json_body(
        app.send(add_item(owner, 1, item_json(Uuid::new_v4(), None, 1), None))
            .await,
    )
    .await;
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();

    let response = app.send(patch_item(owner, &item_id, 2, 0)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["cartVersion"], 3);
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_lenient_delete_tolerates_stale_version() {
    let app = app();
    let owner = Uuid::new_v4();
    let product = Uuid::new_v4();
    let body = json_body(
        app.send(add_item(owner, 1, item_json(product, Some("S"), 1), None))
            .await,
    )
    .await;
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();
    app.send(add_item(owner, 2, item_json(product, Some("M"), 1), None))
        .await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/cart/items/{}", item_id))
        .header("authorization", bearer(owner))
        .header("if-match", "1")
        .header(STRICT_CONFLICT_HEADER, "false")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["cartVersion"], 4);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["size"], "M");
}

#[tokio::test]
async fn test_missing_if_match_is_rejected() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/cart/items")
        .header("authorization", bearer(Uuid::new_v4()))
        .header("content-type", "application/json")
        .body(Body::from(item_json(Uuid::new_v4(), None, 1).to_string()))
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sync_merges_with_max_quantity_and_single_bump() {
    let app = app();
    let owner = Uuid::new_v4();
    let product = Uuid::new_v4();
    app.send(add_item(owner, 1, item_json(product, Some("S"), 3), None))
        .await;

    let mut protected = item_json(product, Some("S"), 1);
    protected["protection"] = json!(true);
    let payload = json!({
        "items": [protected, item_json(product, Some("L"), 2)]
    });
    let request = Request::builder()
        .method("POST")
        .uri("/cart/sync")
        .header("authorization", bearer(owner))
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();

    let body = json_body(app.send(request).await).await;
    assert_eq!(body["cartVersion"], 3);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let small = items.iter().find(|i| i["size"] == "S").unwrap();
    assert_eq!(small["quantity"], 3);
    assert_eq!(small["protection"], true);
}

#[tokio::test]
async fn test_concurrent_writers_with_same_version_one_wins() {
    let app = app();
    let owner = Uuid::new_v4();
    app.send(get_cart(owner)).await;

    let a = app.send(add_item(owner, 1, item_json(Uuid::new_v4(), None, 1), None));
    let b = app.send(add_item(owner, 1, item_json(Uuid::new_v4(), None, 1), None));
    let (a, b) = tokio::join!(a, b);

    let mut statuses = [a.status(), b.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);
}

#[tokio::test]
async fn test_remove_then_stale_then_missing_item() {
    let app = app();
    let owner = Uuid::new_v4();
    let product = Uuid::new_v4();
    app.send(add_item(owner, 1, item_json(product, None, 1), None))
        .await;
    let body = json_body(
        app.send(add_item(owner, 2, item_json(product, None, 2), None))
            .await,
    )
    .await;
    assert_eq!(body["cartVersion"], 3);
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();

    let removed = app.send(patch_item(owner, &item_id, 3, 0)).await;
    assert_eq!(removed.status(), StatusCode::OK);
    let body = json_body(removed).await;
    assert_eq!(body["cartVersion"], 4);
    assert!(body["items"].as_array().unwrap().is_empty());

    let stale = app.send(patch_item(owner, &item_id, 3, 0)).await;
    assert_eq!(stale.status(), StatusCode::CONFLICT);
    let body = json_body(stale).await;
    assert_eq!(body["cartVersion"], 4);
    assert!(body["items"].as_array().unwrap().is_empty());

    let missing = app.send(patch_item(owner, &item_id, 4, 0)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
