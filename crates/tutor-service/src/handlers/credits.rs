//! Credit ledger handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tutor_core::{CreditTransaction, LedgerAudit, LedgerSummary, UserId};
use tutor_store::{LedgerEntry, Store};

use super::{blocking, parse_id};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 200;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// User ID.
    pub user_id: UserId,
    /// Current balance.
    pub balance: i64,
    /// Number of ledger entries written for this user.
    pub sequence: u64,
    /// Configured maximum balance.
    pub max_balance: i64,
}

/// Manual top-up request.
#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    /// Credits to add. Must be positive.
    pub amount: i64,
    /// Reason recorded in the ledger.
    pub reason: String,
    /// Administrator performing the top-up.
    pub performed_by: Option<UserId>,
}

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum number of entries (default 50, max 200).
    pub limit: Option<usize>,
    /// Entries to skip.
    pub offset: Option<usize>,
}

/// Transaction list response.
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    /// Entries, newest first.
    pub transactions: Vec<CreditTransaction>,
    /// Whether more entries may follow.
    pub has_more: bool,
}

/// Current balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let credit = state
        .store
        .get_credit(&user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("no credit balance for user {user_id}")))?;

    Ok(Json(BalanceResponse {
        user_id,
        balance: credit.balance,
        sequence: credit.sequence,
        max_balance: state.store.options().max_balance,
    }))
}

/// Add credits (purchase, grant or manual correction).
pub async fn add_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(user_id): Path<String>,
    Json(body): Json<AddCreditsRequest>,
) -> Result<Json<LedgerEntry>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    if body.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("reason must not be empty".into()));
    }

    let amount = body.amount;
    let entry = blocking(&state, move |store| {
        store.add_credits(&user_id, body.amount, body.reason.trim(), body.performed_by)
    })
    .await?;

    tracing::info!(
        user_id = %user_id,
        amount,
        new_balance = entry.balance,
        service = %auth.service_name,
        "Credits added via API"
    );

    Ok(Json(entry))
}

/// Ledger history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = page.offset.unwrap_or(0);

    let transactions = state
        .store
        .list_transactions_by_user(&user_id, limit, offset)?;
    let has_more = transactions.len() == limit;

    Ok(Json(TransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Replay the ledger against the stored balance.
pub async fn audit(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<LedgerAudit>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    Ok(Json(state.store.audit_ledger(&user_id)?))
}

/// Lifetime totals and credits committed to active bookings.
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<LedgerSummary>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    Ok(Json(state.store.ledger_summary(&user_id)?))
}
