mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::{json, Value};
use uuid::Uuid;

async fn create_item(app: &TestApp, sku: &str, quantity: i32, reorder_point: i32) -> Value {
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/inventory",
            Some(json!({
                "product_id": Uuid::new_v4(),
                "sku": sku,
                "initial_quantity": quantity,
                "reorder_point": reorder_point
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");

    let (status, body) = app.request(Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"]["status"], "up");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/reservations"].is_object());
}

#[tokio::test]
async fn reservation_flow_over_http() {
    let app = TestApp::new().await;
    let item = create_item(&app, "HTTP-1", 100, 10).await;
    assert_eq!(item["status"], "IN_STOCK");
    assert_eq!(item["locations"], json!([]));
    let item_id = item["id"].as_str().unwrap().to_string();

    let order_id = Uuid::new_v4();
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/reservations",
            Some(json!({
                "items": [{"inventory_item_id": item_id, "quantity": 95}],
                "reference_id": order_id,
                "reference_type": "ORDER",
                "expiration_minutes": 15
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let reservation_id = body["data"]["reservation_ids"][0]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/reservations",
            Some(json!({
                "items": [{"inventory_item_id": item_id, "quantity": 10}],
                "reference_id": Uuid::new_v4(),
                "reference_type": "ORDER"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"]["requested"], 10);
    assert_eq!(body["details"]["available"], 5);

    let (status, body) = app
        .request(Method::GET, &format!("/api/v1/inventory/{item_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "LOW_STOCK");
    assert_eq!(body["data"]["available_quantity"], 5);

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/reservations/by-reference/ORDER/{order_id}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let cancel_uri = format!("/api/v1/reservations/{reservation_id}/cancel");
    let (status, body) = app.request(Method::POST, &cancel_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CANCELLED");

    let (status, body) = app.request(Method::POST, &cancel_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"]["from"], "CANCELLED");

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/inventory/{item_id}/transactions"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
}

#[tokio::test]
async fn location_endpoints_move_stock() {
    let app = TestApp::new().await;
    let item = create_item(&app, "HTTP-2", 0, 0).await;
    let item_id = item["id"].as_str().unwrap().to_string();
    let warehouse = Uuid::new_v4();

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/inventory/{item_id}/locations/{warehouse}/add"),
            Some(json!({"quantity": 40, "notes": "inbound"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["quantity"], 40);

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/inventory/{item_id}/locations/{warehouse}/remove"),
            Some(json!({"quantity": 50})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"]["available"], 40);

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/inventory/{item_id}/stock/add"),
            Some(json!({"quantity": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/inventory?warehouse_id={warehouse}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn error_statuses_follow_the_error_kind() {
    let app = TestApp::new().await;
    create_item(&app, "HTTP-3", 1, 0).await;

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/inventory/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/inventory",
            Some(json!({"product_id": Uuid::new_v4(), "sku": "HTTP-3"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/reservations/by-reference/ORDER/{}/archive", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(Method::GET, "/api/v1/inventory/lookup?sku=HTTP-3", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sku"], "HTTP-3");
}

#[tokio::test]
async fn sweep_endpoint_reports_expired_reservations() {
    let app = TestApp::new().await;
    let item = app.create_item("HTTP-4", 5, 0).await;
    app.reserve(item.id, None, 5, Some(0)).await.unwrap();

    let (status, body) = app
        .request(Method::POST, "/api/v1/reservations/sweep", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expired"], 1);

    let (status, body) = app
        .request(Method::GET, "/api/v1/reservations/stats", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_reservations"], 1);
    assert_eq!(body["data"]["active_reservations"], 0);
}
