//! Booking handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use tutor_core::{Booking, BookingId, BookingStatus, LessonId, RefundOutcome, UserId};
use tutor_store::{BookingReceipt, CascadeReport, NewBooking, Store, TransitionRequest};

use super::{blocking, parse_id};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Upper bound on one import batch.
const MAX_IMPORT_BATCH: usize = 500;

/// Create booking request.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    /// Optional caller-chosen id; generated when absent.
    pub id: Option<BookingId>,
    /// Lesson to book.
    pub lesson_id: LessonId,
    /// Booking student.
    pub student_id: UserId,
    /// `pending` (default) or `active`.
    #[serde(default = "pending")]
    pub status: BookingStatus,
}

const fn pending() -> BookingStatus {
    BookingStatus::Pending
}

impl CreateBookingRequest {
    fn into_new_booking(self) -> NewBooking {
        NewBooking {
            id: self.id.unwrap_or_else(BookingId::generate),
            lesson_id: self.lesson_id,
            student_id: self.student_id,
            status: self.status,
        }
    }
}

/// Bulk import request.
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Bookings to insert in one transaction.
    pub bookings: Vec<CreateBookingRequest>,
}

/// Bulk import response.
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    /// Inserted bookings.
    pub bookings: Vec<Booking>,
}

/// Status change request. Lesson and student must match the stored booking.
#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    /// Lesson of the booking.
    pub lesson_id: LessonId,
    /// Student of the booking.
    pub student_id: UserId,
    /// Target status.
    pub status: BookingStatus,
}

/// Standalone refund request.
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// Student who paid for the booking.
    pub student_id: UserId,
    /// Credits to return.
    pub amount: i64,
}

/// Completion sweep response.
#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    /// Bookings moved to `completed`.
    pub completed: usize,
}

/// Create a booking. `active` runs guard, ledger and chat in one transaction.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<BookingReceipt>, ApiError> {
    let new = body.into_new_booking();
    let receipt = blocking(&state, move |store| store.create_booking(&new)).await?;
    Ok(Json(receipt))
}

/// Administrative bulk insert. Chat rooms are left to reconciliation.
pub async fn import_bookings(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    if body.bookings.is_empty() {
        return Err(ApiError::BadRequest("bookings must not be empty".into()));
    }
    if body.bookings.len() > MAX_IMPORT_BATCH {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_IMPORT_BATCH} bookings per import"
        )));
    }

    let batch: Vec<NewBooking> = body
        .bookings
        .into_iter()
        .map(CreateBookingRequest::into_new_booking)
        .collect();
    let bookings = blocking(&state, move |store| store.import_bookings(&batch)).await?;

    tracing::info!(
        count = bookings.len(),
        service = %auth.service_name,
        "Bookings imported via API"
    );

    Ok(Json(ImportResponse { bookings }))
}

/// Get a booking, including soft-deleted ones.
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let booking_id: BookingId = parse_id(&booking_id, "booking")?;
    let booking = state
        .store
        .get_booking(&booking_id)?
        .ok_or_else(|| ApiError::NotFound(format!("booking not found: {booking_id}")))?;
    Ok(Json(booking))
}

/// Move a booking to another status.
pub async fn transition_booking(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(booking_id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Result<Json<BookingReceipt>, ApiError> {
    let booking_id: BookingId = parse_id(&booking_id, "booking")?;
    let request = TransitionRequest {
        booking_id,
        lesson_id: body.lesson_id,
        student_id: body.student_id,
        target: body.status,
    };
    let receipt = blocking(&state, move |store| store.transition_booking(&request)).await?;
    Ok(Json(receipt))
}

/// Refund a booking charge outside a cancellation. Repeats are no-ops.
pub async fn refund_booking(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(booking_id): Path<String>,
    Json(body): Json<RefundRequest>,
) -> Result<Json<RefundOutcome>, ApiError> {
    let booking_id: BookingId = parse_id(&booking_id, "booking")?;
    let student_id = body.student_id;
    let outcome = blocking(&state, move |store| {
        store.refund_credits(&student_id, body.amount, &booking_id)
    })
    .await?;

    tracing::info!(
        booking_id = %booking_id,
        student_id = %student_id,
        duplicate = matches!(outcome, RefundOutcome::DuplicateRefund { .. }),
        service = %auth.service_name,
        "Refund requested via API"
    );

    Ok(Json(outcome))
}

/// Soft-delete a booking. Its seat is released; no refund is issued.
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(booking_id): Path<String>,
) -> Result<Json<CascadeReport>, ApiError> {
    let booking_id: BookingId = parse_id(&booking_id, "booking")?;
    let report = blocking(&state, move |store| store.delete_booking(&booking_id)).await?;
    Ok(Json(report))
}

/// Run the completion sweep now.
pub async fn complete_finished(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
) -> Result<Json<CompletionResponse>, ApiError> {
    let now = Utc::now();
    let completed = blocking(&state, move |store| store.complete_finished_bookings(now)).await?;
    Ok(Json(CompletionResponse { completed }))
}
