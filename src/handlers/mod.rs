pub mod health;
pub mod inventory;
pub mod reservations;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Resolves 1-based `page` and clamped `limit` query values.
pub(crate) fn page_params(state: &AppState, page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
    (page.unwrap_or(1).max(1), state.config.page_size(limit))
}
