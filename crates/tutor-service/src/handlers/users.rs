//! User registry handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use tutor_core::{Role, User, UserId};
use tutor_store::{CascadeReport, Store};

use super::{blocking, parse_id};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Create user request.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Optional caller-chosen id; generated when absent.
    pub id: Option<UserId>,
    /// Role for the new user.
    pub role: Role,
    /// Profile name.
    pub display_name: String,
}

/// Rename request.
#[derive(Debug, Deserialize)]
pub struct RenameUserRequest {
    /// New profile name.
    pub display_name: String,
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("display_name must not be empty".into()));
    }
    Ok(name.to_string())
}

/// Register a user. A zero credit balance is created with it.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<CreateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let name = validate_name(&body.display_name)?;
    let user = User::new(body.id.unwrap_or_else(UserId::generate), body.role, name);
    let user = blocking(&state, move |store| {
        store.create_user(&user)?;
        Ok(user)
    })
    .await?;

    tracing::info!(
        user_id = %user.id,
        role = %user.role,
        service = %auth.service_name,
        "User registered"
    );

    Ok(Json(user))
}

/// Get a user, including soft-deleted ones.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let user = state
        .store
        .get_user(&user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {user_id}")))?;
    Ok(Json(user))
}

/// Change a user's display name.
pub async fn rename_user(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(user_id): Path<String>,
    Json(body): Json<RenameUserRequest>,
) -> Result<Json<User>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let name = validate_name(&body.display_name)?;
    let user = blocking(&state, move |store| store.rename_user(&user_id, &name)).await?;
    Ok(Json(user))
}

/// Soft-delete a user and cascade to lessons, bookings and chat rooms.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(user_id): Path<String>,
) -> Result<Json<CascadeReport>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user")?;
    let report = blocking(&state, move |store| store.delete_user(&user_id)).await?;

    tracing::info!(
        user_id = %user_id,
        service = %auth.service_name,
        bookings = report.bookings,
        chat_rooms = report.chat_rooms,
        "User deleted via API"
    );

    Ok(Json(report))
}
