//! Quantity ledger: inventory items, their warehouse locations and every stock
//! movement that changes their counters.
//!
//! Every write runs inside one database transaction that locks the item row,
//! then any location row, applies the change, recomputes the item counters as
//! `SUM` over its locations, re-derives status and appends one audit row.

use metrics::counter;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::inventory_item::{self, Entity as InventoryItemEntity};
use crate::entities::inventory_location::{self, Entity as InventoryLocationEntity};
use crate::entities::{InventoryStatus, TransactionType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory_status::{crossed_into_low_stock, derive_status};
use crate::services::inventory_transactions::{record, LedgerEntry};

/// Signed change to the three counters of an item or location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CounterDelta {
    pub total: i32,
    pub available: i32,
    pub reserved: i32,
}

impl CounterDelta {
    /// Stock received (`delta > 0`) or removed (`delta < 0`).
    pub fn stock(delta: i32) -> Self {
        Self {
            total: delta,
            available: delta,
            reserved: 0,
        }
    }

    /// Moves `quantity` from available to reserved.
    pub fn hold(quantity: i32) -> Self {
        Self {
            total: 0,
            available: -quantity,
            reserved: quantity,
        }
    }

    /// Moves `quantity` from reserved back to available.
    pub fn release(quantity: i32) -> Self {
        Self {
            total: 0,
            available: quantity,
            reserved: -quantity,
        }
    }

    /// Permanently removes reserved units.
    pub fn consume(quantity: i32) -> Self {
        Self {
            total: -quantity,
            available: 0,
            reserved: -quantity,
        }
    }
}

/// `(total, available, reserved)` after applying `delta`, or the error the
/// change would cause.
pub(crate) fn shift_counters(
    inventory_item_id: Uuid,
    warehouse_id: Option<Uuid>,
    current: (i32, i32, i32),
    delta: CounterDelta,
) -> Result<(i32, i32, i32), ServiceError> {
    let (total, available, reserved) = current;
    let overflow = || ServiceError::ValidationError("Quantity out of range".to_string());

    let new_total = total.checked_add(delta.total).ok_or_else(overflow)?;
    let new_available = available.checked_add(delta.available).ok_or_else(overflow)?;
    let new_reserved = reserved.checked_add(delta.reserved).ok_or_else(overflow)?;

    if new_available < 0 {
        return Err(ServiceError::insufficient(
            inventory_item_id,
            warehouse_id,
            delta.available.saturating_neg(),
            available,
        ));
    }
    if new_reserved < 0 || new_total < 0 {
        return Err(ServiceError::InvalidOperation(format!(
            "Reserved quantity for item {} would become negative",
            inventory_item_id
        )));
    }

    Ok((new_total, new_available, new_reserved))
}

/// Result of one ledger write: the item before and after, plus the location
/// that was touched, if any.
#[derive(Debug, Clone)]
pub(crate) struct LedgerWrite {
    pub before: inventory_item::Model,
    pub item: inventory_item::Model,
    pub location: Option<inventory_location::Model>,
}

impl LedgerWrite {
    pub fn low_stock_event(&self) -> Option<Event> {
        crossed_into_low_stock(self.before.status, self.item.status).then(|| {
            Event::LowStockDetected {
                inventory_item_id: self.item.id,
                sku: self.item.sku.clone(),
                available_quantity: self.item.available_quantity,
                reorder_point: self.item.reorder_point,
                status: self.item.status,
            }
        })
    }
}

/// Reads an item with `SELECT ... FOR UPDATE`.
pub(crate) async fn lock_item<C: ConnectionTrait>(
    conn: &C,
    inventory_item_id: Uuid,
) -> Result<inventory_item::Model, ServiceError> {
    InventoryItemEntity::find_by_id(inventory_item_id)
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Inventory item {} not found", inventory_item_id))
        })
}

async fn lock_location<C: ConnectionTrait>(
    conn: &C,
    inventory_item_id: Uuid,
    warehouse_id: Uuid,
) -> Result<Option<inventory_location::Model>, ServiceError> {
    InventoryLocationEntity::find()
        .filter(inventory_location::Column::InventoryItemId.eq(inventory_item_id))
        .filter(inventory_location::Column::WarehouseId.eq(warehouse_id))
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Locks every location of an item, most available stock first.
pub(crate) async fn lock_locations_by_availability<C: ConnectionTrait>(
    conn: &C,
    inventory_item_id: Uuid,
) -> Result<Vec<inventory_location::Model>, ServiceError> {
    InventoryLocationEntity::find()
        .filter(inventory_location::Column::InventoryItemId.eq(inventory_item_id))
        .order_by_desc(inventory_location::Column::AvailableQuantity)
        .order_by_asc(inventory_location::Column::WarehouseId)
        .lock_exclusive()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub(crate) async fn location_count<C: ConnectionTrait>(
    conn: &C,
    inventory_item_id: Uuid,
) -> Result<u64, ServiceError> {
    InventoryLocationEntity::find()
        .filter(inventory_location::Column::InventoryItemId.eq(inventory_item_id))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Writes new counters to the item and re-derives its status.
async fn write_item_counters<C: ConnectionTrait>(
    conn: &C,
    item: inventory_item::Model,
    (total, available, reserved): (i32, i32, i32),
) -> Result<inventory_item::Model, ServiceError> {
    let status = derive_status(available, item.reorder_point, item.status);
    let mut active: inventory_item::ActiveModel = item.into();
    active.total_quantity = Set(total);
    active.available_quantity = Set(available);
    active.reserved_quantity = Set(reserved);
    active.status = Set(status);
    active.update(conn).await.map_err(ServiceError::db_error)
}

/// Replaces the item counters with the sums over its locations.
pub(crate) async fn recompute_from_locations<C: ConnectionTrait>(
    conn: &C,
    item: inventory_item::Model,
) -> Result<inventory_item::Model, ServiceError> {
    let sums: Option<(Option<i64>, Option<i64>, Option<i64>)> = InventoryLocationEntity::find()
        .select_only()
        .column_as(
            Expr::col(inventory_location::Column::Quantity).sum(),
            "total_quantity",
        )
        .column_as(
            Expr::col(inventory_location::Column::AvailableQuantity).sum(),
            "available_quantity",
        )
        .column_as(
            Expr::col(inventory_location::Column::ReservedQuantity).sum(),
            "reserved_quantity",
        )
        .filter(inventory_location::Column::InventoryItemId.eq(item.id))
        .into_tuple()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let (total, available, reserved) = sums.unwrap_or((None, None, None));
    let narrow = |value: Option<i64>| {
        i32::try_from(value.unwrap_or(0))
            .map_err(|_| ServiceError::ValidationError("Quantity out of range".to_string()))
    };

    write_item_counters(
        conn,
        item,
        (narrow(total)?, narrow(available)?, narrow(reserved)?),
    )
    .await
}

/// Applies `delta` to an already locked item.
///
/// With a warehouse the location row is locked, created on first stock
/// allocation and updated, then the item is recomputed from its locations.
/// Without a warehouse the item must be pool-tracked (no locations) and its
/// counters are changed directly.
pub(crate) async fn apply_delta<C: ConnectionTrait>(
    conn: &C,
    item: inventory_item::Model,
    warehouse_id: Option<Uuid>,
    delta: CounterDelta,
) -> Result<LedgerWrite, ServiceError> {
    let before = item.clone();

    let Some(warehouse_id) = warehouse_id else {
        if location_count(conn, item.id).await? > 0 {
            return Err(ServiceError::ValidationError(format!(
                "Inventory item {} is tracked per warehouse; warehouse_id is required",
                item.id
            )));
        }
        let counters = shift_counters(
            item.id,
            None,
            (
                item.total_quantity,
                item.available_quantity,
                item.reserved_quantity,
            ),
            delta,
        )?;
        let item = write_item_counters(conn, item, counters).await?;
        return Ok(LedgerWrite {
            before,
            item,
            location: None,
        });
    };

    let location = match lock_location(conn, item.id, warehouse_id).await? {
        Some(location) => {
            let (quantity, available, reserved) = shift_counters(
                item.id,
                Some(warehouse_id),
                (
                    location.quantity,
                    location.available_quantity,
                    location.reserved_quantity,
                ),
                delta,
            )?;
            let mut active: inventory_location::ActiveModel = location.into();
            active.quantity = Set(quantity);
            active.available_quantity = Set(available);
            active.reserved_quantity = Set(reserved);
            active.update(conn).await.map_err(ServiceError::db_error)?
        }
        None if delta.total > 0 && delta.reserved == 0 => {
            // First allocation of a pool-tracked item adopts its pool stock.
            let base = if location_count(conn, item.id).await? == 0 {
                if item.reserved_quantity > 0 {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Inventory item {} has {} reserved pool units; release them before allocating to a warehouse",
                        item.id, item.reserved_quantity
                    )));
                }
                (item.total_quantity, item.available_quantity, 0)
            } else {
                (0, 0, 0)
            };
            let (quantity, available, reserved) =
                shift_counters(item.id, Some(warehouse_id), base, delta)?;
            inventory_location::ActiveModel {
                inventory_item_id: Set(item.id),
                warehouse_id: Set(warehouse_id),
                quantity: Set(quantity),
                available_quantity: Set(available),
                reserved_quantity: Set(reserved),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(|e| ServiceError::from_insert_error(e, "Inventory location"))?
        }
        None => {
            return Err(ServiceError::NotFound(format!(
                "Inventory item {} has no stock location in warehouse {}",
                item.id, warehouse_id
            )))
        }
    };

    let item = recompute_from_locations(conn, item).await?;
    Ok(LedgerWrite {
        before,
        item,
        location: Some(location),
    })
}

fn adjusted_event(
    write: &LedgerWrite,
    transaction_type: TransactionType,
    quantity: i32,
    reference_id: Option<Uuid>,
) -> Event {
    Event::InventoryAdjusted {
        inventory_item_id: write.item.id,
        warehouse_id: write.location.as_ref().map(|l| l.warehouse_id),
        transaction_type,
        quantity,
        previous_total: write.before.total_quantity,
        new_total: write.item.total_quantity,
        reference_id,
    }
}

/// Input for `CreateInventoryItem`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateInventoryItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub sku: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub initial_quantity: i32,
    /// When set, the initial quantity is placed in this warehouse.
    pub warehouse_id: Option<Uuid>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub reorder_point: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub reorder_quantity: i32,
    pub created_by: Option<String>,
}

/// Input for `UpdateInventoryItem`. Quantities only change through stock
/// movements and reservations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateInventoryItem {
    #[validate(length(min = 1, max = 255))]
    pub sku: Option<String>,
    #[validate(range(min = 0))]
    pub reorder_point: Option<i32>,
    #[validate(range(min = 0))]
    pub reorder_quantity: Option<i32>,
    /// `DISCONTINUED` discontinues the item; any other value clears a
    /// discontinuation and lets status be derived again.
    pub status: Option<InventoryStatus>,
}

/// Quantity and audit context of a stock addition or removal.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StockMovement {
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub reference_id: Option<Uuid>,
    #[validate(length(max = 64))]
    pub reference_type: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

/// One line of `BulkUpdateInventory`: a signed adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkAdjustment {
    pub inventory_item_id: Uuid,
    pub warehouse_id: Option<Uuid>,
    pub delta: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct BulkUpdateRequest {
    #[validate(length(min = 1, max = 500))]
    pub adjustments: Vec<BulkAdjustment>,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityRequest {
    pub inventory_item_id: Uuid,
    pub warehouse_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityLine {
    pub inventory_item_id: Uuid,
    pub warehouse_id: Option<Uuid>,
    pub requested: i32,
    pub available: i32,
    pub is_available: bool,
}

/// An item together with its warehouse locations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryItemDetails {
    #[serde(flatten)]
    pub item: inventory_item::Model,
    pub locations: Vec<inventory_location::Model>,
}

/// Item counters after a stock movement, with the location it touched.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockLevel {
    pub item: inventory_item::Model,
    pub location: Option<inventory_location::Model>,
}

/// How `GetInventoryItem` identifies the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemLookup {
    Id(Uuid),
    Product {
        product_id: Uuid,
        variant_id: Option<Uuid>,
    },
    Sku(String),
}

impl std::fmt::Display for ItemLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemLookup::Id(id) => write!(f, "{}", id),
            ItemLookup::Product {
                product_id,
                variant_id: Some(variant_id),
            } => write!(f, "for product {} variant {}", product_id, variant_id),
            ItemLookup::Product { product_id, .. } => write!(f, "for product {}", product_id),
            ItemLookup::Sku(sku) => write!(f, "with SKU {}", sku),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryFilter {
    pub status: Option<InventoryStatus>,
    pub warehouse_id: Option<Uuid>,
    pub low_stock_only: bool,
}

/// Service for managing inventory
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    /// Creates a new inventory service instance
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates the stock record for a product or variant.
    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_item(
        &self,
        input: CreateInventoryItem,
    ) -> Result<InventoryItemDetails, ServiceError> {
        input.validate()?;
        let db = &*self.db_pool;
        let created_by = input.created_by.clone();

        let details = db
            .transaction::<_, InventoryItemDetails, ServiceError>(move |txn| {
                Box::pin(async move {
                    let sku_taken = InventoryItemEntity::find()
                        .filter(inventory_item::Column::Sku.eq(input.sku.as_str()))
                        .count(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        > 0;
                    if sku_taken {
                        return Err(ServiceError::AlreadyExists(format!(
                            "Inventory item with SKU {} already exists",
                            input.sku
                        )));
                    }

                    let variant_filter = match input.variant_id {
                        Some(variant_id) => inventory_item::Column::VariantId.eq(variant_id),
                        None => inventory_item::Column::VariantId.is_null(),
                    };
                    let product_taken = InventoryItemEntity::find()
                        .filter(inventory_item::Column::ProductId.eq(input.product_id))
                        .filter(variant_filter)
                        .count(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        > 0;
                    if product_taken {
                        return Err(ServiceError::AlreadyExists(format!(
                            "Inventory item for product {} already exists",
                            input.product_id
                        )));
                    }

                    let quantity = input.initial_quantity;
                    let item = inventory_item::ActiveModel {
                        product_id: Set(input.product_id),
                        variant_id: Set(input.variant_id),
                        sku: Set(input.sku.clone()),
                        total_quantity: Set(quantity),
                        available_quantity: Set(quantity),
                        reserved_quantity: Set(0),
                        reorder_point: Set(input.reorder_point),
                        reorder_quantity: Set(input.reorder_quantity),
                        status: Set(derive_status(
                            quantity,
                            input.reorder_point,
                            InventoryStatus::InStock,
                        )),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .map_err(|e| ServiceError::from_insert_error(e, "Inventory item"))?;

                    let mut locations = Vec::new();
                    if let Some(warehouse_id) = input.warehouse_id {
                        let location = inventory_location::ActiveModel {
                            inventory_item_id: Set(item.id),
                            warehouse_id: Set(warehouse_id),
                            quantity: Set(quantity),
                            available_quantity: Set(quantity),
                            reserved_quantity: Set(0),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await
                        .map_err(|e| ServiceError::from_insert_error(e, "Inventory location"))?;
                        locations.push(location);
                    }

                    if quantity > 0 {
                        record(
                            txn,
                            LedgerEntry::new(
                                item.id,
                                input.warehouse_id,
                                TransactionType::StockAddition,
                                quantity,
                            )
                            .totals(0, quantity)
                            .notes(Some("Initial stock".to_string()))
                            .created_by(input.created_by.clone()),
                        )
                        .await?;
                    }

                    Ok(InventoryItemDetails { item, locations })
                })
            })
            .await?;

        info!(
            inventory_item_id = %details.item.id,
            created_by = ?created_by,
            "inventory item created"
        );
        counter!("inventory_ledger.items.created", 1);

        self.event_sender
            .publish_all(vec![Event::InventoryItemCreated {
                inventory_item_id: details.item.id,
                product_id: details.item.product_id,
                sku: details.item.sku.clone(),
                initial_quantity: details.item.total_quantity,
            }])
            .await;

        Ok(details)
    }

    /// Fetches an item with its locations.
    #[instrument(skip(self))]
    pub async fn get_item(&self, lookup: ItemLookup) -> Result<InventoryItemDetails, ServiceError> {
        let db = &*self.db_pool;

        let query = match &lookup {
            ItemLookup::Id(id) => InventoryItemEntity::find_by_id(*id),
            ItemLookup::Product {
                product_id,
                variant_id,
            } => {
                let variant_filter = match variant_id {
                    Some(variant_id) => inventory_item::Column::VariantId.eq(*variant_id),
                    None => inventory_item::Column::VariantId.is_null(),
                };
                InventoryItemEntity::find()
                    .filter(inventory_item::Column::ProductId.eq(*product_id))
                    .filter(variant_filter)
            }
            ItemLookup::Sku(sku) => {
                InventoryItemEntity::find().filter(inventory_item::Column::Sku.eq(sku.as_str()))
            }
        };

        let item = query
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Inventory item {} not found", lookup)))?;

        let locations = InventoryLocationEntity::find()
            .filter(inventory_location::Column::InventoryItemId.eq(item.id))
            .order_by_asc(inventory_location::Column::WarehouseId)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(InventoryItemDetails { item, locations })
    }

    /// Updates descriptive fields and the discontinued flag.
    #[instrument(skip(self, update))]
    pub async fn update_item(
        &self,
        inventory_item_id: Uuid,
        update: UpdateInventoryItem,
    ) -> Result<inventory_item::Model, ServiceError> {
        update.validate()?;
        let db = &*self.db_pool;

        let item = db
            .transaction::<_, inventory_item::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let item = lock_item(txn, inventory_item_id).await?;

                    if let Some(sku) = update.sku.as_deref().filter(|sku| *sku != item.sku) {
                        let taken = InventoryItemEntity::find()
                            .filter(inventory_item::Column::Sku.eq(sku))
                            .count(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            > 0;
                        if taken {
                            return Err(ServiceError::AlreadyExists(format!(
                                "Inventory item with SKU {} already exists",
                                sku
                            )));
                        }
                    }

                    let reorder_point = update.reorder_point.unwrap_or(item.reorder_point);
                    let status = match update.status {
                        Some(InventoryStatus::Discontinued) => InventoryStatus::Discontinued,
                        Some(_) => derive_status(
                            item.available_quantity,
                            reorder_point,
                            InventoryStatus::InStock,
                        ),
                        None => derive_status(item.available_quantity, reorder_point, item.status),
                    };

                    let mut active: inventory_item::ActiveModel = item.into();
                    if let Some(sku) = update.sku {
                        active.sku = Set(sku);
                    }
                    if let Some(reorder_quantity) = update.reorder_quantity {
                        active.reorder_quantity = Set(reorder_quantity);
                    }
                    active.reorder_point = Set(reorder_point);
                    active.status = Set(status);

                    active
                        .update(txn)
                        .await
                        .map_err(|e| ServiceError::from_insert_error(e, "Inventory item SKU"))
                })
            })
            .await?;

        info!(inventory_item_id = %item.id, status = %item.status, "inventory item updated");
        Ok(item)
    }

    /// Marks an item `DISCONTINUED`. The status sticks until cleared by an update.
    #[instrument(skip(self))]
    pub async fn discontinue_item(
        &self,
        inventory_item_id: Uuid,
    ) -> Result<inventory_item::Model, ServiceError> {
        self.update_item(
            inventory_item_id,
            UpdateInventoryItem {
                status: Some(InventoryStatus::Discontinued),
                ..Default::default()
            },
        )
        .await
    }

    /// Lists items page by page (1-based), ordered by SKU.
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        filter: &InventoryFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<inventory_item::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }

        let mut query = InventoryItemEntity::find();

        if let Some(status) = filter.status {
            query = query.filter(inventory_item::Column::Status.eq(status));
        }

        if filter.low_stock_only {
            query = query.filter(
                inventory_item::Column::Status
                    .is_in([InventoryStatus::LowStock, InventoryStatus::OutOfStock]),
            );
        }

        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(
                inventory_item::Column::Id.in_subquery(
                    Query::select()
                        .column(inventory_location::Column::InventoryItemId)
                        .from(InventoryLocationEntity)
                        .and_where(inventory_location::Column::WarehouseId.eq(warehouse_id))
                        .to_owned(),
                ),
            );
        }

        let paginator = query
            .order_by_asc(inventory_item::Column::Sku)
            .paginate(&*self.db_pool, limit.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((items, total))
    }

    /// Adds stock to an item, in a warehouse or to its pool.
    #[instrument(skip(self, movement))]
    pub async fn add_stock(
        &self,
        inventory_item_id: Uuid,
        warehouse_id: Option<Uuid>,
        movement: StockMovement,
    ) -> Result<StockLevel, ServiceError> {
        movement.validate()?;
        self.move_stock(
            inventory_item_id,
            warehouse_id,
            movement,
            TransactionType::StockAddition,
        )
        .await
    }

    /// Removes available stock from an item, in a warehouse or from its pool.
    #[instrument(skip(self, movement))]
    pub async fn remove_stock(
        &self,
        inventory_item_id: Uuid,
        warehouse_id: Option<Uuid>,
        movement: StockMovement,
    ) -> Result<StockLevel, ServiceError> {
        movement.validate()?;
        self.move_stock(
            inventory_item_id,
            warehouse_id,
            movement,
            TransactionType::StockRemoval,
        )
        .await
    }

    /// `AddInventoryToLocation`: returns the updated location.
    pub async fn add_inventory_to_location(
        &self,
        inventory_item_id: Uuid,
        warehouse_id: Uuid,
        movement: StockMovement,
    ) -> Result<inventory_location::Model, ServiceError> {
        self.add_stock(inventory_item_id, Some(warehouse_id), movement)
            .await?
            .location
            .ok_or_else(|| ServiceError::InternalError("Location missing after write".to_string()))
    }

    /// `RemoveInventoryFromLocation`: returns the updated location.
    pub async fn remove_inventory_from_location(
        &self,
        inventory_item_id: Uuid,
        warehouse_id: Uuid,
        movement: StockMovement,
    ) -> Result<inventory_location::Model, ServiceError> {
        self.remove_stock(inventory_item_id, Some(warehouse_id), movement)
            .await?
            .location
            .ok_or_else(|| ServiceError::InternalError("Location missing after write".to_string()))
    }

    async fn move_stock(
        &self,
        inventory_item_id: Uuid,
        warehouse_id: Option<Uuid>,
        movement: StockMovement,
        transaction_type: TransactionType,
    ) -> Result<StockLevel, ServiceError> {
        let db = &*self.db_pool;
        let delta = match transaction_type {
            TransactionType::StockRemoval => CounterDelta::stock(-movement.quantity),
            _ => CounterDelta::stock(movement.quantity),
        };
        let quantity = movement.quantity;
        let reference_id = movement.reference_id;

        let write = db
            .transaction::<_, LedgerWrite, ServiceError>(move |txn| {
                Box::pin(async move {
                    let item = lock_item(txn, inventory_item_id).await?;
                    let write = apply_delta(txn, item, warehouse_id, delta).await?;

                    record(
                        txn,
                        LedgerEntry::new(inventory_item_id, warehouse_id, transaction_type, quantity)
                            .totals(write.before.total_quantity, write.item.total_quantity)
                            .reference(movement.reference_id, movement.reference_type)
                            .notes(movement.notes)
                            .created_by(movement.created_by),
                    )
                    .await?;

                    Ok(write)
                })
            })
            .await?;

        info!(
            %inventory_item_id,
            warehouse_id = ?warehouse_id,
            %transaction_type,
            quantity,
            total = write.item.total_quantity,
            available = write.item.available_quantity,
            "stock moved"
        );

        let mut events = vec![adjusted_event(&write, transaction_type, quantity, reference_id)];
        events.extend(write.low_stock_event());
        self.event_sender.publish_all(events).await;

        Ok(StockLevel {
            item: write.item,
            location: write.location,
        })
    }

    /// Applies signed adjustments atomically. Items are locked in ascending id
    /// order; one `ADJUSTMENT` row is appended per line. Returns the final
    /// state of each touched item.
    #[instrument(skip(self, request), fields(lines = request.adjustments.len()))]
    pub async fn bulk_update(
        &self,
        request: BulkUpdateRequest,
    ) -> Result<Vec<inventory_item::Model>, ServiceError> {
        request.validate()?;
        if let Some(line) = request.adjustments.iter().find(|line| line.delta == 0) {
            return Err(ServiceError::ValidationError(format!(
                "Adjustment for item {} must be non-zero",
                line.inventory_item_id
            )));
        }

        let db = &*self.db_pool;
        let reference_id = request.reference_id;

        let (items, events) = db
            .transaction::<_, (Vec<inventory_item::Model>, Vec<Event>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let mut lines = request.adjustments;
                        lines.sort_by_key(|line| line.inventory_item_id);

                        let mut items: Vec<inventory_item::Model> = Vec::new();
                        let mut events = Vec::new();

                        for line in lines {
                            let item = match items.pop() {
                                Some(last) if last.id == line.inventory_item_id => last,
                                last => {
                                    items.extend(last);
                                    lock_item(txn, line.inventory_item_id).await?
                                }
                            };

                            let write = apply_delta(
                                txn,
                                item,
                                line.warehouse_id,
                                CounterDelta::stock(line.delta),
                            )
                            .await?;

                            record(
                                txn,
                                LedgerEntry::new(
                                    line.inventory_item_id,
                                    line.warehouse_id,
                                    TransactionType::Adjustment,
                                    line.delta,
                                )
                                .totals(write.before.total_quantity, write.item.total_quantity)
                                .reference(request.reference_id, request.reference_type.clone())
                                .notes(line.notes)
                                .created_by(request.created_by.clone()),
                            )
                            .await?;

                            events.push(adjusted_event(
                                &write,
                                TransactionType::Adjustment,
                                line.delta,
                                reference_id,
                            ));
                            events.extend(write.low_stock_event());
                            items.push(write.item);
                        }

                        Ok((items, events))
                    })
                },
            )
            .await?;

        info!(items = items.len(), "bulk inventory update applied");
        counter!("inventory_ledger.bulk_updates", 1);
        self.event_sender.publish_all(events).await;

        Ok(items)
    }

    /// Advisory availability check. Reads without locks; the answer may be
    /// stale by the time a reservation is attempted.
    #[instrument(skip(self, lines))]
    pub async fn check_availability(
        &self,
        lines: Vec<AvailabilityRequest>,
    ) -> Result<Vec<AvailabilityLine>, ServiceError> {
        let db = &*self.db_pool;
        let mut result = Vec::with_capacity(lines.len());

        for line in lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Requested quantity for item {} must be positive",
                    line.inventory_item_id
                )));
            }

            let item = InventoryItemEntity::find_by_id(line.inventory_item_id)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Inventory item {} not found",
                        line.inventory_item_id
                    ))
                })?;

            let available = match line.warehouse_id {
                Some(warehouse_id) => InventoryLocationEntity::find()
                    .filter(inventory_location::Column::InventoryItemId.eq(item.id))
                    .filter(inventory_location::Column::WarehouseId.eq(warehouse_id))
                    .one(db)
                    .await
                    .map_err(ServiceError::db_error)?
                    .map(|location| location.available_quantity)
                    .unwrap_or(0),
                None => item.available_quantity,
            };

            result.push(AvailabilityLine {
                inventory_item_id: item.id,
                warehouse_id: line.warehouse_id,
                requested: line.quantity,
                available,
                is_available: !item.is_discontinued() && available >= line.quantity,
            });
        }

        Ok(result)
    }

    /// Checks both counter invariants for one item without locking.
    #[instrument(skip(self))]
    pub async fn verify_item(&self, inventory_item_id: Uuid) -> Result<bool, ServiceError> {
        let details = self.get_item(ItemLookup::Id(inventory_item_id)).await?;
        if !details.item.counters_balanced() {
            return Ok(false);
        }
        if details.locations.is_empty() {
            return Ok(true);
        }
        let sum: i64 = details.locations.iter().map(|l| i64::from(l.quantity)).sum();
        let locations_balanced = details.locations.iter().all(|l| {
            l.quantity == l.available_quantity + l.reserved_quantity
                && l.available_quantity >= 0
                && l.reserved_quantity >= 0
        });
        Ok(locations_balanced && sum == i64::from(details.item.total_quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn hold_moves_available_to_reserved() {
        let item = Uuid::new_v4();
        let shifted = shift_counters(item, None, (100, 100, 0), CounterDelta::hold(95)).unwrap();
        assert_eq!(shifted, (100, 5, 95));
    }

    #[test]
    fn hold_beyond_available_is_insufficient() {
        let item = Uuid::new_v4();
        let err = shift_counters(item, None, (100, 5, 95), CounterDelta::hold(10)).unwrap_err();
        assert_matches!(
            err,
            ServiceError::InsufficientInventory {
                requested: 10,
                available: 5,
                ..
            }
        );
    }

    #[test]
    fn consume_reduces_total_and_reserved() {
        let item = Uuid::new_v4();
        let shifted = shift_counters(item, None, (100, 5, 95), CounterDelta::consume(95)).unwrap();
        assert_eq!(shifted, (5, 5, 0));
    }

    #[test]
    fn release_of_unreserved_units_is_rejected() {
        let item = Uuid::new_v4();
        let err = shift_counters(item, None, (10, 10, 0), CounterDelta::release(1)).unwrap_err();
        assert_matches!(err, ServiceError::InvalidOperation(_));
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let item = Uuid::new_v4();
        let err =
            shift_counters(item, None, (i32::MAX, i32::MAX, 0), CounterDelta::stock(1)).unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    proptest! {
        #[test]
        fn successful_shifts_preserve_the_counter_identity(
            available in 0i32..10_000,
            reserved in 0i32..10_000,
            amount in 1i32..20_000,
            kind in 0u8..4,
        ) {
            let delta = match kind {
                0 => CounterDelta::stock(amount),
                1 => CounterDelta::stock(-amount),
                2 => CounterDelta::hold(amount),
                _ => CounterDelta::release(amount),
            };
            let current = (available + reserved, available, reserved);
            if let Ok((total, available, reserved)) =
                shift_counters(Uuid::nil(), None, current, delta)
            {
                prop_assert_eq!(total, available + reserved);
                prop_assert!(available >= 0);
                prop_assert!(reserved >= 0);
            }
        }
    }
}
