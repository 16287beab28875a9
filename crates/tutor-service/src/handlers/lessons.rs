//! Lesson handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tutor_core::{
    Booking, Lesson, LessonId, SeatAvailability, UserId, DEFAULT_LESSON_CREDIT_COST,
};
use tutor_store::{CascadeReport, Store};

use super::{blocking, parse_id};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Create lesson request.
#[derive(Debug, Deserialize)]
pub struct CreateLessonRequest {
    /// Optional caller-chosen id; generated when absent.
    pub id: Option<LessonId>,
    /// Owning teacher.
    pub teacher_id: UserId,
    /// Title.
    pub title: String,
    /// Seat count.
    pub capacity: u32,
    /// Credits charged per activated booking (default 1).
    pub credit_cost: Option<i64>,
    /// Scheduled start.
    pub starts_at: DateTime<Utc>,
    /// Scheduled end.
    pub ends_at: DateTime<Utc>,
}

/// Capacity edit request.
#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    /// New seat count.
    pub capacity: u32,
}

/// Bookings of a lesson.
#[derive(Debug, Serialize)]
pub struct LessonBookingsResponse {
    /// Live bookings in any status.
    pub bookings: Vec<Booking>,
}

/// Create a lesson owned by a live teacher.
pub async fn create_lesson(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<CreateLessonRequest>,
) -> Result<Json<Lesson>, ApiError> {
    if body.ends_at <= body.starts_at {
        return Err(ApiError::BadRequest("ends_at must be after starts_at".into()));
    }

    let mut lesson = Lesson::new(
        body.id.unwrap_or_else(LessonId::generate),
        body.teacher_id,
        body.title,
        body.capacity,
        body.starts_at,
        body.ends_at,
    );
    lesson.credit_cost = body.credit_cost.unwrap_or(DEFAULT_LESSON_CREDIT_COST);
    let lesson = blocking(&state, move |store| {
        store.create_lesson(&lesson)?;
        Ok(lesson)
    })
    .await?;

    Ok(Json(lesson))
}

/// Get a lesson, including soft-deleted ones.
pub async fn get_lesson(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<String>,
) -> Result<Json<Lesson>, ApiError> {
    let lesson_id: LessonId = parse_id(&lesson_id, "lesson")?;
    let lesson = state
        .store
        .get_lesson(&lesson_id)?
        .ok_or_else(|| ApiError::NotFound(format!("lesson not found: {lesson_id}")))?;
    Ok(Json(lesson))
}

/// Change a lesson's capacity. The next activation sees the new value.
pub async fn set_capacity(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(lesson_id): Path<String>,
    Json(body): Json<CapacityRequest>,
) -> Result<Json<Lesson>, ApiError> {
    let lesson_id: LessonId = parse_id(&lesson_id, "lesson")?;
    let capacity = body.capacity;
    let lesson =
        blocking(&state, move |store| store.set_lesson_capacity(&lesson_id, capacity)).await?;

    tracing::info!(
        lesson_id = %lesson_id,
        capacity,
        service = %auth.service_name,
        "Capacity updated via API"
    );

    Ok(Json(lesson))
}

/// Seats taken and free.
pub async fn seat_availability(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<String>,
) -> Result<Json<SeatAvailability>, ApiError> {
    let lesson_id: LessonId = parse_id(&lesson_id, "lesson")?;
    Ok(Json(state.store.seat_availability(&lesson_id)?))
}

/// Live bookings of a lesson.
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<String>,
) -> Result<Json<LessonBookingsResponse>, ApiError> {
    let lesson_id: LessonId = parse_id(&lesson_id, "lesson")?;
    let bookings = state.store.list_lesson_bookings(&lesson_id)?;
    Ok(Json(LessonBookingsResponse { bookings }))
}

/// Soft-delete a lesson and its bookings.
pub async fn delete_lesson(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(lesson_id): Path<String>,
) -> Result<Json<CascadeReport>, ApiError> {
    let lesson_id: LessonId = parse_id(&lesson_id, "lesson")?;
    let report = blocking(&state, move |store| store.delete_lesson(&lesson_id)).await?;
    Ok(Json(report))
}
