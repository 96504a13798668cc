use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::{inventory_item, inventory_location, inventory_transaction};
use crate::entities::{InventoryStatus, TransactionType};
use crate::errors::ServiceError;
use crate::handlers::{page_params, AppState};
use crate::services::inventory::{
    AvailabilityLine, AvailabilityRequest, BulkUpdateRequest, CreateInventoryItem,
    InventoryFilter, InventoryItemDetails, ItemLookup, StockLevel, StockMovement,
    UpdateInventoryItem,
};
use crate::{ApiResponse, ApiResult, PaginatedResponse};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct InventoryFilters {
    pub status: Option<InventoryStatus>,
    pub warehouse_id: Option<Uuid>,
    #[serde(default)]
    pub low_stock_only: bool,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct InventoryLookupQuery {
    pub sku: Option<String>,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TransactionFilters {
    pub transaction_type: Option<TransactionType>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityCheckRequest {
    pub items: Vec<AvailabilityRequest>,
}

/// Inventory endpoints, mounted under `/api/v1`.
pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(list_inventory).post(create_inventory))
        .route("/inventory/lookup", get(lookup_inventory))
        .route("/inventory/availability", post(check_availability))
        .route("/inventory/bulk", post(bulk_update_inventory))
        .route("/inventory/:id", get(get_inventory).put(update_inventory))
        .route("/inventory/:id/discontinue", post(discontinue_inventory))
        .route("/inventory/:id/transactions", get(list_transactions))
        .route("/inventory/:id/stock/add", post(add_pool_stock))
        .route("/inventory/:id/stock/remove", post(remove_pool_stock))
        .route(
            "/inventory/:id/locations/:warehouse_id/add",
            post(add_inventory_to_location),
        )
        .route(
            "/inventory/:id/locations/:warehouse_id/remove",
            post(remove_inventory_from_location),
        )
}

/// List inventory items with optional filtering
#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    params(InventoryFilters),
    responses(
        (status = 200, description = "Inventory list returned", body = ApiResponse<PaginatedResponse<inventory_item::Model>>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn list_inventory(
    State(state): State<AppState>,
    Query(filters): Query<InventoryFilters>,
) -> ApiResult<PaginatedResponse<inventory_item::Model>> {
    let (page, limit) = page_params(&state, filters.page, filters.limit);
    let filter = InventoryFilter {
        status: filters.status,
        warehouse_id: filters.warehouse_id,
        low_stock_only: filters.low_stock_only,
    };

    let (items, total) = state
        .inventory_service
        .list_items(&filter, page, limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

/// Create the stock record for a product or variant
#[utoipa::path(
    post,
    path = "/api/v1/inventory",
    request_body = CreateInventoryItem,
    responses(
        (status = 201, description = "Inventory item created", body = ApiResponse<InventoryItemDetails>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU or product already tracked", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn create_inventory(
    State(state): State<AppState>,
    Json(payload): Json<CreateInventoryItem>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state.inventory_service.create_item(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(details))))
}

/// Get an inventory item with its locations
#[utoipa::path(
    get,
    path = "/api/v1/inventory/{id}",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    responses(
        (status = 200, description = "Inventory item returned", body = ApiResponse<InventoryItemDetails>),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_inventory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<InventoryItemDetails> {
    let details = state.inventory_service.get_item(ItemLookup::Id(id)).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Find an inventory item by SKU or by product and variant
#[utoipa::path(
    get,
    path = "/api/v1/inventory/lookup",
    params(InventoryLookupQuery),
    responses(
        (status = 200, description = "Inventory item returned", body = ApiResponse<InventoryItemDetails>),
        (status = 400, description = "Neither sku nor product_id given", body = crate::errors::ErrorResponse),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn lookup_inventory(
    State(state): State<AppState>,
    Query(query): Query<InventoryLookupQuery>,
) -> ApiResult<InventoryItemDetails> {
    let lookup = match (query.sku, query.product_id) {
        (Some(sku), _) => ItemLookup::Sku(sku),
        (None, Some(product_id)) => ItemLookup::Product {
            product_id,
            variant_id: query.variant_id,
        },
        (None, None) => {
            return Err(ServiceError::ValidationError(
                "Either sku or product_id is required".to_string(),
            ))
        }
    };

    let details = state.inventory_service.get_item(lookup).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Update SKU, reorder settings or discontinued status
#[utoipa::path(
    put,
    path = "/api/v1/inventory/{id}",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    request_body = UpdateInventoryItem,
    responses(
        (status = 200, description = "Inventory item updated", body = ApiResponse<inventory_item::Model>),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already in use", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn update_inventory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateInventoryItem>,
) -> ApiResult<inventory_item::Model> {
    let item = state.inventory_service.update_item(id, payload).await?;
    Ok(Json(ApiResponse::success(item)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/{id}/discontinue",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    responses(
        (status = 200, description = "Inventory item discontinued", body = ApiResponse<inventory_item::Model>),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn discontinue_inventory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<inventory_item::Model> {
    let item = state.inventory_service.discontinue_item(id).await?;
    Ok(Json(ApiResponse::success(item)))
}

/// Audit trail of an item, newest first
#[utoipa::path(
    get,
    path = "/api/v1/inventory/{id}/transactions",
    params(("id" = Uuid, Path, description = "Inventory item ID"), TransactionFilters),
    responses(
        (status = 200, description = "Transactions returned", body = ApiResponse<PaginatedResponse<inventory_transaction::Model>>)
    ),
    tag = "inventory"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(filters): Query<TransactionFilters>,
) -> ApiResult<PaginatedResponse<inventory_transaction::Model>> {
    let (page, limit) = page_params(&state, filters.page, filters.limit);
    let (rows, total) = state
        .transaction_service
        .list_transactions(id, filters.transaction_type, page, limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        rows, total, page, limit,
    ))))
}

/// Receive stock into an item that is not tracked per warehouse
#[utoipa::path(
    post,
    path = "/api/v1/inventory/{id}/stock/add",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    request_body = StockMovement,
    responses(
        (status = 200, description = "Stock added", body = ApiResponse<StockLevel>),
        (status = 400, description = "Item is tracked per warehouse", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn add_pool_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(movement): Json<StockMovement>,
) -> ApiResult<StockLevel> {
    let level = state.inventory_service.add_stock(id, None, movement).await?;
    Ok(Json(ApiResponse::success(level)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/{id}/stock/remove",
    params(("id" = Uuid, Path, description = "Inventory item ID")),
    request_body = StockMovement,
    responses(
        (status = 200, description = "Stock removed", body = ApiResponse<StockLevel>),
        (status = 422, description = "Not enough available stock", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn remove_pool_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(movement): Json<StockMovement>,
) -> ApiResult<StockLevel> {
    let level = state
        .inventory_service
        .remove_stock(id, None, movement)
        .await?;
    Ok(Json(ApiResponse::success(level)))
}

/// Add stock to one warehouse location of an item
#[utoipa::path(
    post,
    path = "/api/v1/inventory/{id}/locations/{warehouse_id}/add",
    params(
        ("id" = Uuid, Path, description = "Inventory item ID"),
        ("warehouse_id" = Uuid, Path, description = "Warehouse ID")
    ),
    request_body = StockMovement,
    responses(
        (status = 200, description = "Location updated", body = ApiResponse<inventory_location::Model>),
        (status = 404, description = "Inventory item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn add_inventory_to_location(
    State(state): State<AppState>,
    Path((id, warehouse_id)): Path<(Uuid, Uuid)>,
    Json(movement): Json<StockMovement>,
) -> ApiResult<inventory_location::Model> {
    let location = state
        .inventory_service
        .add_inventory_to_location(id, warehouse_id, movement)
        .await?;
    Ok(Json(ApiResponse::success(location)))
}

/// Remove available stock from one warehouse location of an item
#[utoipa::path(
    post,
    path = "/api/v1/inventory/{id}/locations/{warehouse_id}/remove",
    params(
        ("id" = Uuid, Path, description = "Inventory item ID"),
        ("warehouse_id" = Uuid, Path, description = "Warehouse ID")
    ),
    request_body = StockMovement,
    responses(
        (status = 200, description = "Location updated", body = ApiResponse<inventory_location::Model>),
        (status = 404, description = "Item or location not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough available stock", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn remove_inventory_from_location(
    State(state): State<AppState>,
    Path((id, warehouse_id)): Path<(Uuid, Uuid)>,
    Json(movement): Json<StockMovement>,
) -> ApiResult<inventory_location::Model> {
    let location = state
        .inventory_service
        .remove_inventory_from_location(id, warehouse_id, movement)
        .await?;
    Ok(Json(ApiResponse::success(location)))
}

/// Advisory availability check for a set of lines
#[utoipa::path(
    post,
    path = "/api/v1/inventory/availability",
    request_body = AvailabilityCheckRequest,
    responses(
        (status = 200, description = "Availability per line", body = ApiResponse<Vec<AvailabilityLine>>),
        (status = 404, description = "Unknown inventory item", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn check_availability(
    State(state): State<AppState>,
    Json(payload): Json<AvailabilityCheckRequest>,
) -> ApiResult<Vec<AvailabilityLine>> {
    let lines = state
        .inventory_service
        .check_availability(payload.items)
        .await?;
    Ok(Json(ApiResponse::success(lines)))
}

/// Apply signed adjustments to many items in one transaction
#[utoipa::path(
    post,
    path = "/api/v1/inventory/bulk",
    request_body = BulkUpdateRequest,
    responses(
        (status = 200, description = "Adjustments applied", body = ApiResponse<Vec<inventory_item::Model>>),
        (status = 422, description = "An adjustment exceeds available stock", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn bulk_update_inventory(
    State(state): State<AppState>,
    Json(payload): Json<BulkUpdateRequest>,
) -> ApiResult<Vec<inventory_item::Model>> {
    let items = state.inventory_service.bulk_update(payload).await?;
    Ok(Json(ApiResponse::success(items)))
}
