//! Request and response types for the tutor client.

use serde::{Deserialize, Serialize};

use tutor_core::{
    Booking, BookingId, BookingStatus, CreditTransaction, LessonId, ProvisionOutcome,
    RefundOutcome, UserId,
};

/// Balance of a user.
#[derive(Debug, Clone, Deserialize)]
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
#[derive(Debug, Clone, Serialize)]
pub struct AddCreditsRequest {
    /// Credits to add.
    pub amount: i64,
    /// Reason recorded in the ledger.
    pub reason: String,
    /// Administrator performing the top-up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performed_by: Option<UserId>,
}

/// A ledger write and the balance it produced.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerEntry {
    /// Balance after the write.
    pub balance: i64,
    /// The ledger entry.
    pub transaction: CreditTransaction,
}

/// Create booking request.
#[derive(Debug, Clone, Serialize)]
pub struct CreateBookingRequest {
    /// Caller-chosen id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<BookingId>,
    /// Lesson to book.
    pub lesson_id: LessonId,
    /// Booking student.
    pub student_id: UserId,
    /// `pending` or `active`.
    pub status: BookingStatus,
}

/// Status change request.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionRequest {
    /// Lesson of the booking.
    pub lesson_id: LessonId,
    /// Student of the booking.
    pub student_id: UserId,
    /// Target status.
    pub status: BookingStatus,
}

/// Everything a booking write did.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingReceipt {
    /// Booking after the write.
    pub booking: Booking,
    /// False when the booking was already in the requested status.
    pub changed: bool,
    /// Charge taken on activation.
    pub deduction: Option<LedgerEntry>,
    /// Refund issued on cancellation.
    pub refund: Option<RefundOutcome>,
    /// Chat room provisioned on activation.
    pub chat: Option<ProvisionOutcome>,
}

/// Standalone refund request.
#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    /// Student who paid for the booking.
    pub student_id: UserId,
    /// Credits to return.
    pub amount: i64,
}

/// Post message request.
#[derive(Debug, Clone, Serialize)]
pub struct PostMessageRequest {
    /// Author.
    pub sender_id: UserId,
    /// Text body.
    pub body: String,
}

/// Rows touched by a soft delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CascadeReport {
    /// Users deleted.
    pub users: usize,
    /// Lessons deleted.
    pub lessons: usize,
    /// Bookings deleted.
    pub bookings: usize,
    /// Seats freed by deleted active bookings.
    pub seats_released: usize,
    /// Chat rooms deleted.
    pub chat_rooms: usize,
}

/// API error response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    pub messages: Vec<tutor_core::Message>,
}
