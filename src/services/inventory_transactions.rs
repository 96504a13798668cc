//! Append-only transaction log.
//!
//! Rows are written only through [`record`], always on the connection of the
//! database transaction that performs the quantity change.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::inventory_transaction::{self, Entity as InventoryTransactionEntity};
use crate::entities::TransactionType;
use crate::errors::ServiceError;

/// One audit row about to be appended.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub inventory_item_id: Uuid,
    pub warehouse_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub quantity: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl LedgerEntry {
    pub fn new(
        inventory_item_id: Uuid,
        warehouse_id: Option<Uuid>,
        transaction_type: TransactionType,
        quantity: i32,
    ) -> Self {
        Self {
            inventory_item_id,
            warehouse_id,
            transaction_type,
            quantity,
            previous_quantity: 0,
            new_quantity: 0,
            reference_id: None,
            reference_type: None,
            notes: None,
            created_by: None,
        }
    }

    /// Item `total_quantity` before and after the change.
    pub fn totals(mut self, previous: i32, new: i32) -> Self {
        self.previous_quantity = previous;
        self.new_quantity = new;
        self
    }

    pub fn reference(mut self, reference_id: Option<Uuid>, reference_type: Option<String>) -> Self {
        self.reference_id = reference_id;
        self.reference_type = reference_type;
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn created_by(mut self, created_by: Option<String>) -> Self {
        self.created_by = created_by;
        self
    }
}

/// Appends one row to `inventory_transactions`.
pub(crate) async fn record<C: ConnectionTrait>(
    conn: &C,
    entry: LedgerEntry,
) -> Result<inventory_transaction::Model, ServiceError> {
    debug!(
        inventory_item_id = %entry.inventory_item_id,
        transaction_type = %entry.transaction_type,
        quantity = entry.quantity,
        "appending ledger row"
    );

    let row = inventory_transaction::ActiveModel {
        inventory_item_id: Set(entry.inventory_item_id),
        warehouse_id: Set(entry.warehouse_id),
        transaction_type: Set(entry.transaction_type),
        quantity: Set(entry.quantity),
        previous_quantity: Set(entry.previous_quantity),
        new_quantity: Set(entry.new_quantity),
        reference_id: Set(entry.reference_id),
        reference_type: Set(entry.reference_type),
        notes: Set(entry.notes),
        created_by: Set(entry.created_by),
        ..Default::default()
    };

    row.insert(conn).await.map_err(ServiceError::db_error)
}

/// Read side of the transaction log.
#[derive(Clone)]
pub struct InventoryTransactionService {
    db_pool: Arc<DatabaseConnection>,
}

impl InventoryTransactionService {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    /// Lists an item's audit rows, newest first.
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        inventory_item_id: Uuid,
        transaction_type: Option<TransactionType>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<inventory_transaction::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }

        let mut query = InventoryTransactionEntity::find()
            .filter(inventory_transaction::Column::InventoryItemId.eq(inventory_item_id));

        if let Some(kind) = transaction_type {
            query = query.filter(inventory_transaction::Column::TransactionType.eq(kind));
        }

        let paginator = query
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .order_by_desc(inventory_transaction::Column::Id)
            .paginate(&*self.db_pool, limit.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let rows = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((rows, total))
    }
}
