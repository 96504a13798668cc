use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::entities::{inventory_reservation, ReservationStatus};
use crate::errors::ServiceError;
use crate::handlers::{page_params, AppState};
use crate::services::inventory_reservation_service::{
    ReservationFilter, ReservationReceipt, ReservationStats, ReserveInventoryRequest,
};
use crate::services::reservation_sweeper::SweepReport;
use crate::{ApiResponse, ApiResult, PaginatedResponse};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ReservationFilters {
    pub status: Option<ReservationStatus>,
    pub inventory_item_id: Option<Uuid>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Reservation endpoints, mounted under `/api/v1`.
pub fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route("/reservations", get(list_reservations).post(reserve_inventory))
        .route("/reservations/stats", get(reservation_stats))
        .route("/reservations/sweep", post(sweep_expired))
        .route(
            "/reservations/by-reference/:reference_type/:reference_id",
            get(list_by_reference),
        )
        .route(
            "/reservations/by-reference/:reference_type/:reference_id/:action",
            post(transition_by_reference),
        )
        .route("/reservations/:id", get(get_reservation))
        .route("/reservations/:id/confirm", post(confirm_reservation))
        .route("/reservations/:id/cancel", post(cancel_reservation))
        .route("/reservations/:id/fulfill", post(fulfill_reservation))
}

/// Hold stock for every line of a request, all or nothing
#[utoipa::path(
    post,
    path = "/api/v1/reservations",
    request_body = ReserveInventoryRequest,
    responses(
        (status = 201, description = "Reservations created", body = ApiResponse<ReservationReceipt>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown inventory item or location", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough available stock", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn reserve_inventory(
    State(state): State<AppState>,
    Json(payload): Json<ReserveInventoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipt = state.reservation_service.reserve_inventory(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(receipt))))
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations",
    params(ReservationFilters),
    responses(
        (status = 200, description = "Reservations returned", body = ApiResponse<PaginatedResponse<inventory_reservation::Model>>)
    ),
    tag = "reservations"
)]
pub async fn list_reservations(
    State(state): State<AppState>,
    Query(filters): Query<ReservationFilters>,
) -> ApiResult<PaginatedResponse<inventory_reservation::Model>> {
    let (page, limit) = page_params(&state, filters.page, filters.limit);
    let filter = ReservationFilter {
        status: filters.status,
        inventory_item_id: filters.inventory_item_id,
    };

    let (rows, total) = state
        .reservation_service
        .list_reservations(&filter, page, limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        rows, total, page, limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/{id}",
    params(("id" = Uuid, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation returned", body = ApiResponse<inventory_reservation::Model>),
        (status = 404, description = "Reservation not found", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<inventory_reservation::Model> {
    let reservation = state.reservation_service.get_reservation(id).await?;
    Ok(Json(ApiResponse::success(reservation)))
}

/// Confirm a pending reservation; units stay reserved
#[utoipa::path(
    post,
    path = "/api/v1/reservations/{id}/confirm",
    params(("id" = Uuid, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation confirmed", body = ApiResponse<inventory_reservation::Model>),
        (status = 404, description = "Reservation not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Reservation is not pending", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn confirm_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<inventory_reservation::Model> {
    let reservation = state.reservation_service.confirm_reservation(id).await?;
    Ok(Json(ApiResponse::success(reservation)))
}

/// Cancel a pending reservation and release its units
#[utoipa::path(
    post,
    path = "/api/v1/reservations/{id}/cancel",
    params(("id" = Uuid, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation cancelled", body = ApiResponse<inventory_reservation::Model>),
        (status = 404, description = "Reservation not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Reservation is not pending", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<inventory_reservation::Model> {
    let reservation = state.reservation_service.cancel_reservation(id).await?;
    Ok(Json(ApiResponse::success(reservation)))
}

/// Fulfill a reservation, deducting its units from stock
#[utoipa::path(
    post,
    path = "/api/v1/reservations/{id}/fulfill",
    params(("id" = Uuid, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation fulfilled", body = ApiResponse<inventory_reservation::Model>),
        (status = 404, description = "Reservation not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Reservation already closed", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn fulfill_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<inventory_reservation::Model> {
    let reservation = state.reservation_service.fulfill_reservation(id).await?;
    Ok(Json(ApiResponse::success(reservation)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/by-reference/{reference_type}/{reference_id}",
    params(
        ("reference_type" = String, Path, description = "Reference type, e.g. ORDER"),
        ("reference_id" = Uuid, Path, description = "Reference ID")
    ),
    responses(
        (status = 200, description = "Reservations of the reference", body = ApiResponse<Vec<inventory_reservation::Model>>)
    ),
    tag = "reservations"
)]
pub async fn list_by_reference(
    State(state): State<AppState>,
    Path((reference_type, reference_id)): Path<(String, Uuid)>,
) -> ApiResult<Vec<inventory_reservation::Model>> {
    let rows = state
        .reservation_service
        .list_reservations_by_reference(reference_id, &reference_type)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

/// Confirm, cancel or fulfill every reservation of a reference
#[utoipa::path(
    post,
    path = "/api/v1/reservations/by-reference/{reference_type}/{reference_id}/{action}",
    params(
        ("reference_type" = String, Path, description = "Reference type, e.g. ORDER"),
        ("reference_id" = Uuid, Path, description = "Reference ID"),
        ("action" = String, Path, description = "One of confirm, cancel, fulfill")
    ),
    responses(
        (status = 200, description = "Reservations updated", body = ApiResponse<Vec<inventory_reservation::Model>>),
        (status = 404, description = "No reservations for the reference", body = crate::errors::ErrorResponse),
        (status = 409, description = "No reservation permits the transition", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn transition_by_reference(
    State(state): State<AppState>,
    Path((reference_type, reference_id, action)): Path<(String, Uuid, String)>,
) -> ApiResult<Vec<inventory_reservation::Model>> {
    let service = &state.reservation_service;
    let rows = match action.as_str() {
        "confirm" => {
            service
                .confirm_by_reference(reference_id, &reference_type)
                .await?
        }
        "cancel" => {
            service
                .cancel_by_reference(reference_id, &reference_type)
                .await?
        }
        "fulfill" => {
            service
                .fulfill_by_reference(reference_id, &reference_type)
                .await?
        }
        other => {
            return Err(ServiceError::ValidationError(format!(
                "Unknown reservation action: {}",
                other
            )))
        }
    };
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/stats",
    responses(
        (status = 200, description = "Reservation statistics", body = ApiResponse<ReservationStats>)
    ),
    tag = "reservations"
)]
pub async fn reservation_stats(State(state): State<AppState>) -> ApiResult<ReservationStats> {
    let stats = state.reservation_service.get_reservation_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// Run one expiration sweep immediately
#[utoipa::path(
    post,
    path = "/api/v1/reservations/sweep",
    responses(
        (status = 200, description = "Sweep finished", body = ApiResponse<SweepReport>)
    ),
    tag = "reservations"
)]
pub async fn sweep_expired(State(state): State<AppState>) -> ApiResult<SweepReport> {
    let report = state.sweeper.run_once().await?;
    Ok(Json(ApiResponse::success(report)))
}
