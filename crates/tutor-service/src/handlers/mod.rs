//! API handlers.

pub mod bookings;
pub mod chat;
pub mod credits;
pub mod health;
pub mod lessons;
pub mod users;

use std::str::FromStr;
use std::sync::Arc;

use tutor_store::{RocksStore, StoreError};

use crate::error::ApiError;
use crate::state::AppState;

/// Parse an id from a path segment or query value.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {what} id: {raw}")))
}

/// Run a store write on the blocking pool. It may wait on row locks for up to
/// the configured lock timeout.
pub(crate) async fn blocking<T, F>(state: &AppState, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&RocksStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || call(&store))
        .await
        .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
        .map_err(ApiError::from)
}
