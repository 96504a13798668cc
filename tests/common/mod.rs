#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use inventory_ledger::{
    app_router,
    config::AppConfig,
    db,
    entities::inventory_item,
    events::{self, EventSender},
    services::{
        inventory::{CreateInventoryItem, InventoryService, StockMovement},
        inventory_reservation_service::{
            InventoryReservationService, ReservationLine, ReservationReceipt,
            ReserveInventoryRequest,
        },
    },
    AppState,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// Application state backed by a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller tweak the configuration.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps the in-memory database alive and shared.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(1024);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let router = app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn inventory(&self) -> &InventoryService {
        &self.state.inventory_service
    }

    pub fn reservations(&self) -> &InventoryReservationService {
        &self.state.reservation_service
    }

    /// Creates an item without stock locations.
    pub async fn create_item(
        &self,
        sku: &str,
        initial_quantity: i32,
        reorder_point: i32,
    ) -> inventory_item::Model {
        self.inventory()
            .create_item(CreateInventoryItem {
                product_id: Uuid::new_v4(),
                variant_id: None,
                sku: sku.to_string(),
                initial_quantity,
                warehouse_id: None,
                reorder_point,
                reorder_quantity: 0,
                created_by: Some("tests".to_string()),
            })
            .await
            .expect("create inventory item")
            .item
    }

    /// Creates an item and stocks each `(warehouse, quantity)` pair.
    pub async fn create_located_item(
        &self,
        sku: &str,
        reorder_point: i32,
        stock: &[(Uuid, i32)],
    ) -> inventory_item::Model {
        let item = self.create_item(sku, 0, reorder_point).await;
        for (warehouse_id, quantity) in stock {
            self.inventory()
                .add_inventory_to_location(item.id, *warehouse_id, movement(*quantity))
                .await
                .expect("stock location");
        }
        self.item(item.id).await
    }

    pub async fn item(&self, id: Uuid) -> inventory_item::Model {
        self.inventory()
            .get_item(inventory_ledger::services::inventory::ItemLookup::Id(id))
            .await
            .expect("load inventory item")
            .item
    }

    /// Reserves `quantity` of one item for a fresh order reference.
    pub async fn reserve(
        &self,
        item_id: Uuid,
        warehouse_id: Option<Uuid>,
        quantity: i32,
        expiration_minutes: Option<i64>,
    ) -> Result<ReservationReceipt, inventory_ledger::errors::ServiceError> {
        self.reservations()
            .reserve_inventory(reservation_request(
                Uuid::new_v4(),
                vec![ReservationLine {
                    inventory_item_id: item_id,
                    warehouse_id,
                    quantity,
                }],
                expiration_minutes,
            ))
            .await
    }

    /// Sends one request through the full router and decodes the JSON body.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router response");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is JSON")
        };
        (status, json)
    }
}

pub fn movement(quantity: i32) -> StockMovement {
    StockMovement {
        quantity,
        reference_id: None,
        reference_type: None,
        notes: None,
        created_by: Some("tests".to_string()),
    }
}

pub fn reservation_request(
    reference_id: Uuid,
    items: Vec<ReservationLine>,
    expiration_minutes: Option<i64>,
) -> ReserveInventoryRequest {
    ReserveInventoryRequest {
        items,
        reference_id,
        reference_type: "ORDER".to_string(),
        expiration_minutes,
        created_by: Some("tests".to_string()),
    }
}
