use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use sea_orm::TransactionError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::ReservationStatus;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "message": "Insufficient inventory for item 550e8400-e29b-41d4-a716-446655440000: requested 10, available 5",
    "details": {"inventory_item_id": "550e8400-e29b-41d4-a716-446655440000", "requested": 10, "available": 5},
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable context for business-rule failures
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error(
        "Insufficient inventory for item {inventory_item_id}: requested {requested}, available {available}"
    )]
    InsufficientInventory {
        inventory_item_id: Uuid,
        warehouse_id: Option<Uuid>,
        requested: i32,
        available: i32,
    },

    #[error("Invalid transition for reservation {reservation_id}: {from} -> {to}")]
    InvalidTransition {
        reservation_id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
            TransactionError::Transaction(service_err) => service_err,
        }
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    pub fn insufficient(
        inventory_item_id: Uuid,
        warehouse_id: Option<Uuid>,
        requested: i32,
        available: i32,
    ) -> Self {
        ServiceError::InsufficientInventory {
            inventory_item_id,
            warehouse_id,
            requested,
            available,
        }
    }

    /// Maps unique-constraint violations to `AlreadyExists`, everything else to a
    /// database error.
    pub fn from_insert_error(error: DbErr, what: impl Into<String>) -> Self {
        match error.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::AlreadyExists(what.into())
            }
            _ => ServiceError::DatabaseError(error),
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::InsufficientInventory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Structured context for errors a caller can act on.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientInventory {
                inventory_item_id,
                warehouse_id,
                requested,
                available,
            } => Some(json!({
                "inventory_item_id": inventory_item_id,
                "warehouse_id": warehouse_id,
                "requested": requested,
                "available": available,
            })),
            Self::InvalidTransition {
                reservation_id,
                from,
                to,
            } => Some(json!({
                "reservation_id": reservation_id,
                "from": from,
                "to": to,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::body::to_bytes;

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::AlreadyExists("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::insufficient(Uuid::nil(), None, 10, 5).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InvalidTransition {
                reservation_id: Uuid::nil(),
                from: ReservationStatus::Cancelled,
                to: ReservationStatus::Cancelled,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::db_error("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn service_error_response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::db_error("connection reset by peer").response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::InternalError("sensitive".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::NotFound("Reservation abc not found".into()).response_message(),
            "Not found: Reservation abc not found"
        );
    }

    #[test]
    fn transaction_error_unwraps_service_error() {
        let err: ServiceError =
            TransactionError::Transaction(ServiceError::NotFound("gone".into())).into();
        assert_matches!(err, ServiceError::NotFound(_));

        let err: ServiceError =
            TransactionError::<ServiceError>::Connection(DbErr::Custom("down".into())).into();
        assert_matches!(err, ServiceError::DatabaseError(_));
    }

    #[tokio::test]
    async fn insufficient_inventory_response_carries_details() {
        let item = Uuid::new_v4();
        let response = ServiceError::insufficient(item, None, 10, 5).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        let details = payload.details.expect("details present");
        assert_eq!(details["requested"], 10);
        assert_eq!(details["available"], 5);
        assert_eq!(details["inventory_item_id"], item.to_string());
    }
}
