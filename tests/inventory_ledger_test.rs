mod common;

use assert_matches::assert_matches;
use common::{movement, TestApp};
use inventory_ledger::entities::{inventory_item, InventoryStatus, TransactionType};
use inventory_ledger::errors::ServiceError;
use inventory_ledger::services::inventory::{
    AvailabilityRequest, BulkAdjustment, BulkUpdateRequest, CreateInventoryItem, InventoryFilter,
    ItemLookup, StockMovement, UpdateInventoryItem,
};
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

#[tokio::test]
async fn located_stock_sums_across_warehouses() {
    let app = TestApp::new().await;
    let (east, west) = (Uuid::new_v4(), Uuid::new_v4());

    let item = app
        .create_located_item("SKU-LOC-1", 10, &[(east, 50), (west, 30)])
        .await;

    assert_eq!(item.total_quantity, 80);
    assert_eq!(item.available_quantity, 80);
    assert_eq!(item.reserved_quantity, 0);
    assert_eq!(item.status, InventoryStatus::InStock);

    let details = app
        .inventory()
        .get_item(ItemLookup::Id(item.id))
        .await
        .unwrap();
    assert_eq!(details.locations.len(), 2);
    let on_hand: i32 = details.locations.iter().map(|l| l.quantity).sum();
    assert_eq!(on_hand, 80);
    assert!(app.inventory().verify_item(item.id).await.unwrap());

    let (rows, total) = app
        .state
        .transaction_service
        .list_transactions(item.id, None, 1, 50)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert!(rows
        .iter()
        .all(|row| row.transaction_type == TransactionType::StockAddition));
}

#[tokio::test]
async fn removing_more_than_a_location_holds_is_rejected() {
    let app = TestApp::new().await;
    let (east, west) = (Uuid::new_v4(), Uuid::new_v4());
    let item = app
        .create_located_item("SKU-LOC-2", 0, &[(east, 50), (west, 30)])
        .await;

    let err = app
        .inventory()
        .remove_inventory_from_location(item.id, east, movement(60))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientInventory {
            requested: 60,
            available: 50,
            ..
        }
    );

    let err = app
        .inventory()
        .remove_inventory_from_location(item.id, Uuid::new_v4(), movement(1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    // Items tracked per warehouse cannot be moved without one.
    let err = app
        .inventory()
        .remove_stock(item.id, None, movement(1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let location = app
        .inventory()
        .remove_inventory_from_location(item.id, west, movement(30))
        .await
        .unwrap();
    assert_eq!(location.quantity, 0);
    assert_eq!(location.available_quantity, 0);

    let item = app.item(item.id).await;
    assert_eq!(item.total_quantity, 50);
    assert!(app.inventory().verify_item(item.id).await.unwrap());
}

#[tokio::test]
async fn first_location_adopts_pool_stock() {
    let app = TestApp::new().await;
    let warehouse = Uuid::new_v4();
    let item = app.create_item("SKU-POOL-1", 20, 5).await;

    let level = app
        .inventory()
        .add_stock(item.id, Some(warehouse), movement(5))
        .await
        .unwrap();

    let location = level.location.expect("location touched");
    assert_eq!(location.quantity, 25);
    assert_eq!(location.available_quantity, 25);
    assert_eq!(level.item.total_quantity, 25);
    assert!(app.inventory().verify_item(item.id).await.unwrap());
}

#[tokio::test]
async fn pool_stock_moves_update_counters_and_log() {
    let app = TestApp::new().await;
    let item = app.create_item("SKU-POOL-2", 10, 3).await;

    let added = app
        .inventory()
        .add_stock(
            item.id,
            None,
            StockMovement {
                quantity: 15,
                reference_id: Some(Uuid::new_v4()),
                reference_type: Some("PURCHASE_ORDER".to_string()),
                notes: Some("Dock 4".to_string()),
                created_by: Some("receiving".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(added.item.total_quantity, 25);
    assert!(added.location.is_none());

    let removed = app
        .inventory()
        .remove_stock(item.id, None, movement(23))
        .await
        .unwrap();
    assert_eq!(removed.item.available_quantity, 2);
    assert_eq!(removed.item.status, InventoryStatus::LowStock);

    let err = app
        .inventory()
        .remove_stock(item.id, None, movement(3))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientInventory {
            requested: 3,
            available: 2,
            ..
        }
    );

    let (additions, total) = app
        .state
        .transaction_service
        .list_transactions(item.id, Some(TransactionType::StockAddition), 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 2);
    let receipt = additions
        .iter()
        .find(|row| row.quantity == 15)
        .expect("receipt row");
    assert_eq!(receipt.previous_quantity, 10);
    assert_eq!(receipt.new_quantity, 25);
    assert_eq!(receipt.reference_type.as_deref(), Some("PURCHASE_ORDER"));
    assert_eq!(receipt.created_by.as_deref(), Some("receiving"));

    let (_, all) = app
        .state
        .transaction_service
        .list_transactions(item.id, None, 1, 10)
        .await
        .unwrap();
    assert_eq!(all, 3);
}

#[tokio::test]
async fn non_positive_movements_are_rejected() {
    let app = TestApp::new().await;
    let item = app.create_item("SKU-POOL-3", 10, 0).await;

    for quantity in [0, -5] {
        let err = app
            .inventory()
            .add_stock(item.id, None, movement(quantity))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    let err = app
        .inventory()
        .add_stock(Uuid::new_v4(), None, movement(1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn duplicate_sku_and_product_are_rejected() {
    let app = TestApp::new().await;
    let item = app.create_item("SKU-DUP", 1, 0).await;

    let err = app
        .inventory()
        .create_item(CreateInventoryItem {
            product_id: Uuid::new_v4(),
            variant_id: None,
            sku: "SKU-DUP".to_string(),
            initial_quantity: 0,
            warehouse_id: None,
            reorder_point: 0,
            reorder_quantity: 0,
            created_by: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyExists(_));

    let err = app
        .inventory()
        .create_item(CreateInventoryItem {
            product_id: item.product_id,
            variant_id: None,
            sku: "SKU-DUP-2".to_string(),
            initial_quantity: 0,
            warehouse_id: None,
            reorder_point: 0,
            reorder_quantity: 0,
            created_by: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyExists(_));

    // A different variant of the same product is its own item.
    let variant = app
        .inventory()
        .create_item(CreateInventoryItem {
            product_id: item.product_id,
            variant_id: Some(Uuid::new_v4()),
            sku: "SKU-DUP-RED".to_string(),
            initial_quantity: 0,
            warehouse_id: None,
            reorder_point: 0,
            reorder_quantity: 0,
            created_by: None,
        })
        .await
        .unwrap();
    assert_eq!(variant.item.status, InventoryStatus::OutOfStock);
}

#[tokio::test]
async fn schema_rejects_second_item_for_a_product_without_variant() {
    let app = TestApp::new().await;
    let item = app.create_item("SKU-SCHEMA-1", 1, 0).await;

    let duplicate = |sku: &str, variant_id: Option<Uuid>| inventory_item::ActiveModel {
        product_id: Set(item.product_id),
        variant_id: Set(variant_id),
        sku: Set(sku.to_string()),
        total_quantity: Set(0),
        available_quantity: Set(0),
        reserved_quantity: Set(0),
        reorder_point: Set(0),
        reorder_quantity: Set(0),
        status: Set(InventoryStatus::OutOfStock),
        ..Default::default()
    };

    let result = duplicate("SKU-SCHEMA-2", None).insert(&*app.state.db).await;
    assert!(result.is_err(), "second variant-less row for one product was stored");

    duplicate("SKU-SCHEMA-3", Some(Uuid::new_v4()))
        .insert(&*app.state.db)
        .await
        .unwrap();
}

#[tokio::test]
async fn items_can_be_looked_up_by_sku_and_product() {
    let app = TestApp::new().await;
    let warehouse = Uuid::new_v4();
    let product_id = Uuid::new_v4();
    let variant_id = Uuid::new_v4();

    let created = app
        .inventory()
        .create_item(CreateInventoryItem {
            product_id,
            variant_id: Some(variant_id),
            sku: "SKU-LOOKUP".to_string(),
            initial_quantity: 12,
            warehouse_id: Some(warehouse),
            reorder_point: 2,
            reorder_quantity: 10,
            created_by: None,
        })
        .await
        .unwrap();
    assert_eq!(created.locations.len(), 1);
    assert_eq!(created.locations[0].quantity, 12);

    let by_sku = app
        .inventory()
        .get_item(ItemLookup::Sku("SKU-LOOKUP".to_string()))
        .await
        .unwrap();
    assert_eq!(by_sku.item.id, created.item.id);

    let by_product = app
        .inventory()
        .get_item(ItemLookup::Product {
            product_id,
            variant_id: Some(variant_id),
        })
        .await
        .unwrap();
    assert_eq!(by_product.item.id, created.item.id);
    assert_eq!(by_product.locations.len(), 1);

    let err = app
        .inventory()
        .get_item(ItemLookup::Product {
            product_id,
            variant_id: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn discontinued_status_is_sticky_until_cleared() {
    let app = TestApp::new().await;
    let item = app.create_item("SKU-DISC", 100, 10).await;

    let item = app.inventory().discontinue_item(item.id).await.unwrap();
    assert_eq!(item.status, InventoryStatus::Discontinued);

    let level = app
        .inventory()
        .add_stock(item.id, None, movement(5))
        .await
        .unwrap();
    assert_eq!(level.item.status, InventoryStatus::Discontinued);

    let level = app
        .inventory()
        .remove_stock(item.id, None, movement(100))
        .await
        .unwrap();
    assert_eq!(level.item.available_quantity, 5);
    assert_eq!(level.item.status, InventoryStatus::Discontinued);

    let item = app
        .inventory()
        .update_item(
            item.id,
            UpdateInventoryItem {
                status: Some(InventoryStatus::InStock),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(item.status, InventoryStatus::LowStock);
}

#[tokio::test]
async fn changing_the_reorder_point_rederives_status() {
    let app = TestApp::new().await;
    let item = app.create_item("SKU-REORDER", 20, 5).await;
    assert_eq!(item.status, InventoryStatus::InStock);

    let item = app
        .inventory()
        .update_item(
            item.id,
            UpdateInventoryItem {
                reorder_point: Some(25),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(item.status, InventoryStatus::LowStock);
    assert_eq!(item.total_quantity, 20);
}

#[tokio::test]
async fn bulk_update_is_all_or_nothing() {
    let app = TestApp::new().await;
    let first = app.create_item("SKU-BULK-1", 10, 0).await;
    let second = app.create_item("SKU-BULK-2", 5, 0).await;

    let err = app
        .inventory()
        .bulk_update(BulkUpdateRequest {
            adjustments: vec![
                BulkAdjustment {
                    inventory_item_id: first.id,
                    warehouse_id: None,
                    delta: 5,
                    notes: None,
                },
                BulkAdjustment {
                    inventory_item_id: second.id,
                    warehouse_id: None,
                    delta: -10,
                    notes: None,
                },
            ],
            reference_id: None,
            reference_type: Some("CYCLE_COUNT".to_string()),
            created_by: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientInventory { .. });
    assert_eq!(app.item(first.id).await.total_quantity, 10);
    assert_eq!(app.item(second.id).await.total_quantity, 5);

    let items = app
        .inventory()
        .bulk_update(BulkUpdateRequest {
            adjustments: vec![
                BulkAdjustment {
                    inventory_item_id: first.id,
                    warehouse_id: None,
                    delta: -3,
                    notes: Some("damaged".to_string()),
                },
                BulkAdjustment {
                    inventory_item_id: second.id,
                    warehouse_id: None,
                    delta: 2,
                    notes: None,
                },
                BulkAdjustment {
                    inventory_item_id: first.id,
                    warehouse_id: None,
                    delta: 1,
                    notes: Some("found".to_string()),
                },
            ],
            reference_id: None,
            reference_type: Some("CYCLE_COUNT".to_string()),
            created_by: Some("auditor".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(items.len(), 2);

    let updated_first = items.iter().find(|i| i.id == first.id).unwrap();
    let updated_second = items.iter().find(|i| i.id == second.id).unwrap();
    assert_eq!(updated_first.total_quantity, 8);
    assert_eq!(updated_second.total_quantity, 7);

    let (_, adjustments) = app
        .state
        .transaction_service
        .list_transactions(first.id, Some(TransactionType::Adjustment), 1, 10)
        .await
        .unwrap();
    assert_eq!(adjustments, 2);
}

#[tokio::test]
async fn bulk_update_rejects_zero_deltas() {
    let app = TestApp::new().await;
    let item = app.create_item("SKU-BULK-3", 10, 0).await;

    let err = app
        .inventory()
        .bulk_update(BulkUpdateRequest {
            adjustments: vec![BulkAdjustment {
                inventory_item_id: item.id,
                warehouse_id: None,
                delta: 0,
                notes: None,
            }],
            reference_id: None,
            reference_type: None,
            created_by: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn list_items_filters_by_status_and_warehouse() {
    let app = TestApp::new().await;
    let warehouse = Uuid::new_v4();

    let stocked = app.create_item("A-1", 100, 10).await;
    app.create_item("A-2", 5, 10).await;
    app.create_item("A-3", 0, 0).await;
    app.inventory()
        .add_stock(stocked.id, Some(warehouse), movement(1))
        .await
        .unwrap();

    let (low, total) = app
        .inventory()
        .list_items(
            &InventoryFilter {
                low_stock_only: true,
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(total, 2);
    let skus: Vec<_> = low.iter().map(|i| i.sku.as_str()).collect();
    assert_eq!(skus, vec!["A-2", "A-3"]);

    let (in_stock, _) = app
        .inventory()
        .list_items(
            &InventoryFilter {
                status: Some(InventoryStatus::InStock),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(in_stock.len(), 1);
    assert_eq!(in_stock[0].total_quantity, 101);

    let (in_warehouse, _) = app
        .inventory()
        .list_items(
            &InventoryFilter {
                warehouse_id: Some(warehouse),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(in_warehouse.len(), 1);
    assert_eq!(in_warehouse[0].id, stocked.id);

    let (page_two, total) = app
        .inventory()
        .list_items(&InventoryFilter::default(), 2, 2)
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(page_two.len(), 1);
    assert_eq!(page_two[0].sku, "A-3");

    let err = app
        .inventory()
        .list_items(&InventoryFilter::default(), 0, 2)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn availability_check_reports_each_line() {
    let app = TestApp::new().await;
    let item = app.create_item("SKU-AVAIL", 10, 0).await;
    let retired = app.create_item("SKU-AVAIL-OLD", 10, 0).await;
    app.inventory().discontinue_item(retired.id).await.unwrap();

    let lines = app
        .inventory()
        .check_availability(vec![
            AvailabilityRequest {
                inventory_item_id: item.id,
                warehouse_id: None,
                quantity: 5,
            },
            AvailabilityRequest {
                inventory_item_id: item.id,
                warehouse_id: None,
                quantity: 20,
            },
            AvailabilityRequest {
                inventory_item_id: retired.id,
                warehouse_id: None,
                quantity: 1,
            },
        ])
        .await
        .unwrap();

    assert!(lines[0].is_available);
    assert!(!lines[1].is_available);
    assert_eq!(lines[1].available, 10);
    assert!(!lines[2].is_available);

    let err = app
        .inventory()
        .check_availability(vec![AvailabilityRequest {
            inventory_item_id: Uuid::new_v4(),
            warehouse_id: None,
            quantity: 1,
        }])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
