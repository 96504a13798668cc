use utoipa::OpenApi;

use crate::handlers::{health, inventory, reservations};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Inventory Ledger API",
        version = "0.1.0",
        description = r#"
# Inventory Ledger

Stock per item and warehouse, reservations against available stock and the
audit trail of every quantity change.

## Quantities

For every item and location `total_quantity = available_quantity + reserved_quantity`.
Items with warehouse locations carry the sums of their locations.

## Reservations

`PENDING` holds move units from available to reserved. They end as `CONFIRMED`
(units stay reserved), `FULFILLED` (units leave stock), `CANCELLED` or `EXPIRED`
(units return to available).

## Errors

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient inventory for item ...: requested 10, available 5",
  "details": {"requested": 10, "available": 5},
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    paths(
        health::liveness_check,
        health::readiness_check,
        inventory::list_inventory,
        inventory::create_inventory,
        inventory::get_inventory,
        inventory::lookup_inventory,
        inventory::update_inventory,
        inventory::discontinue_inventory,
        inventory::list_transactions,
        inventory::add_pool_stock,
        inventory::remove_pool_stock,
        inventory::add_inventory_to_location,
        inventory::remove_inventory_from_location,
        inventory::check_availability,
        inventory::bulk_update_inventory,
        reservations::reserve_inventory,
        reservations::list_reservations,
        reservations::get_reservation,
        reservations::confirm_reservation,
        reservations::cancel_reservation,
        reservations::fulfill_reservation,
        reservations::list_by_reference,
        reservations::transition_by_reference,
        reservations::reservation_stats,
        reservations::sweep_expired,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::InventoryStatus,
        crate::entities::ReservationStatus,
        crate::entities::TransactionType,
        crate::entities::inventory_item::Model,
        crate::entities::inventory_location::Model,
        crate::entities::inventory_transaction::Model,
        crate::entities::inventory_reservation::Model,
        crate::services::inventory::CreateInventoryItem,
        crate::services::inventory::UpdateInventoryItem,
        crate::services::inventory::StockMovement,
        crate::services::inventory::BulkAdjustment,
        crate::services::inventory::BulkUpdateRequest,
        crate::services::inventory::AvailabilityRequest,
        crate::services::inventory::AvailabilityLine,
        crate::services::inventory::InventoryItemDetails,
        crate::services::inventory::StockLevel,
        crate::services::inventory_reservation_service::ReservationLine,
        crate::services::inventory_reservation_service::ReserveInventoryRequest,
        crate::services::inventory_reservation_service::ReservationReceipt,
        crate::services::inventory_reservation_service::ReservationStats,
        crate::services::reservation_sweeper::SweepReport,
        inventory::AvailabilityCheckRequest,
    )),
    tags(
        (name = "inventory", description = "Items, locations and stock movements"),
        (name = "reservations", description = "Temporary holds on available stock"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;
