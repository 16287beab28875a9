//! Transactional storage and consistency engine for tutor bookings.
//!
//! This crate persists users, lessons, bookings, credits and chat rooms in
//! `RocksDB`, and runs every mutation that touches more than one of them as an
//! explicit transaction script over a pessimistic `TransactionDB`:
//!
//! - **Ledger** (`ledger`): add / deduct / refund with an append-only log.
//! - **Overbooking guard** (`guard`): seat claims under the lesson row lock.
//! - **Booking state machine** (`booking`): guard → ledger → chat, all or nothing.
//! - **Chat provisioner** (`chat`, `reconcile`): one room per pair.
//! - **Soft-delete cascade** (`cascade`): logical deletion of dependents.
//!
//! # Locking
//!
//! Row locks are taken in a fixed order: lesson → booking → user → credit →
//! chat pair. Locks are held until commit. A lock timeout or a detected
//! deadlock rolls the transaction back and returns `StoreError::Conflict`.
//!
//! # Example
//!
//! ```no_run
//! use tutor_core::{Role, User, UserId};
//! use tutor_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/tutor-db").unwrap();
//!
//! let student = User::new(UserId::generate(), Role::Student, "Ada");
//! store.create_user(&student).unwrap();
//!
//! let entry = store
//!     .add_credits(&student.id, 10, "Starter pack", None)
//!     .unwrap();
//! assert_eq!(entry.balance, 10);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod booking;
mod cascade;
mod chat;
pub mod error;
mod guard;
pub mod keys;
mod ledger;
mod reconcile;
mod registry;
pub mod rocks;
pub mod schema;
mod tx;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use error::{Result, StoreError};
pub use rocks::{EngineOptions, RocksStore};

use tutor_core::{
    Booking, BookingId, BookingStatus, ChatRoom, ChatRoomId, Credit, CreditTransaction,
    LedgerAudit, LedgerSummary, Lesson, LessonId, Message, MessageId, ModerationStatus,
    ProvisionOutcome, ReconcileReport, RefundOutcome, SeatAvailability, User, UserId,
};

/// A booking to insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewBooking {
    /// ID chosen by the caller.
    pub id: BookingId,
    /// Lesson to book.
    pub lesson_id: LessonId,
    /// Booking student.
    pub student_id: UserId,
    /// Initial status: `Pending`, or `Active` to activate on insert.
    pub status: BookingStatus,
}

/// A request to move a booking to another status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRequest {
    /// Booking to change.
    pub booking_id: BookingId,
    /// Lesson the caller believes the booking belongs to.
    pub lesson_id: LessonId,
    /// Student the caller believes owns the booking.
    pub student_id: UserId,
    /// Requested status.
    pub target: BookingStatus,
}

/// A ledger write: the resulting balance and the entry that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Balance after the write.
    pub balance: i64,
    /// The appended entry.
    pub transaction: CreditTransaction,
}

/// Everything a booking mutation did.
#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    /// The booking after the mutation.
    pub booking: Booking,
    /// Whether the status actually changed.
    pub changed: bool,
    /// Deduction written on activation.
    pub deduction: Option<LedgerEntry>,
    /// Refund written (or found) on cancellation.
    pub refund: Option<RefundOutcome>,
    /// Chat room provisioned on activation.
    pub chat: Option<ProvisionOutcome>,
}

impl BookingReceipt {
    pub(crate) const fn unchanged(booking: Booking) -> Self {
        Self {
            booking,
            changed: false,
            deduction: None,
            refund: None,
            chat: None,
        }
    }
}

/// Rows touched by a soft delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Users newly marked deleted.
    pub users: usize,
    /// Lessons newly marked deleted.
    pub lessons: usize,
    /// Bookings newly marked deleted.
    pub bookings: usize,
    /// Seats released because an active booking was deleted.
    pub seats_released: usize,
    /// Chat rooms newly marked deleted.
    pub chat_rooms: usize,
}

/// The storage trait defining all engine operations.
///
/// Every mutating method is a single atomic unit: it either applies all of
/// its effects or returns an error having applied none.
pub trait Store: Send + Sync {
    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user together with a zero credit balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the ID is taken.
    fn create_user(&self, user: &User) -> Result<()>;

    /// Get a user by ID, including soft-deleted users.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;

    /// Change a live user's display name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::OrphanReference` for missing or deleted users.
    fn rename_user(&self, user_id: &UserId, display_name: &str) -> Result<User>;

    /// Soft-delete a user and cascade to their lessons, bookings and rooms.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    fn delete_user(&self, user_id: &UserId) -> Result<CascadeReport>;

    // =========================================================================
    // Lessons
    // =========================================================================

    /// Insert a lesson owned by a live teacher.
    ///
    /// # Errors
    ///
    /// - `StoreError::OrphanReference` if the teacher is missing or deleted.
    /// - `EngineError::RoleMismatch` if the owner is not a teacher.
    fn create_lesson(&self, lesson: &Lesson) -> Result<()>;

    /// Get a lesson by ID, including soft-deleted lessons.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_lesson(&self, lesson_id: &LessonId) -> Result<Option<Lesson>>;

    /// Change a lesson's seat count.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CapacityBelowActive` if the new capacity is
    /// lower than the seats already taken.
    fn set_lesson_capacity(&self, lesson_id: &LessonId, capacity: u32) -> Result<Lesson>;

    /// Current seat availability of a live lesson.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::OrphanReference` for missing or deleted lessons.
    fn seat_availability(&self, lesson_id: &LessonId) -> Result<SeatAvailability>;

    /// Live bookings of a lesson.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_lesson_bookings(&self, lesson_id: &LessonId) -> Result<Vec<Booking>>;

    /// Soft-delete a lesson and its bookings.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the lesson doesn't exist.
    fn delete_lesson(&self, lesson_id: &LessonId) -> Result<CascadeReport>;

    // =========================================================================
    // Bookings
    // =========================================================================

    /// Insert a booking. An `Active` status runs the full activation script.
    ///
    /// # Errors
    ///
    /// - `StoreError::OrphanReference` if the lesson or student is missing or deleted.
    /// - `EngineError::CapacityExceeded` / `EngineError::InsufficientBalance`
    ///   when inserting as active fails the guard or the ledger.
    fn create_booking(&self, booking: &NewBooking) -> Result<BookingReceipt>;

    /// Get a booking by ID, including soft-deleted bookings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_booking(&self, booking_id: &BookingId) -> Result<Option<Booking>>;

    /// Move a booking to another status.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidTransition` for moves the lifecycle forbids.
    /// - `EngineError::CapacityExceeded` if no seat is left.
    /// - `EngineError::InsufficientBalance` if the student cannot pay.
    /// - `EngineError::LessonNotFinished` when completing early.
    fn transition_booking(&self, request: &TransitionRequest) -> Result<BookingReceipt>;

    /// Administrative bulk insert. Capacity and ledger rules apply, but chat
    /// rooms are left for the reconciliation pass.
    ///
    /// # Errors
    ///
    /// Any failure rejects the whole batch.
    fn import_bookings(&self, bookings: &[NewBooking]) -> Result<Vec<Booking>>;

    /// Complete active bookings whose lesson ended at or before `now`.
    /// Returns how many bookings were completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails; per-booking failures are skipped.
    fn complete_finished_bookings(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Soft-delete a booking, releasing its seat if it held one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the booking doesn't exist.
    fn delete_booking(&self, booking_id: &BookingId) -> Result<CascadeReport>;

    // =========================================================================
    // Credits
    // =========================================================================

    /// Get a user's credit row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_credit(&self, user_id: &UserId) -> Result<Option<Credit>>;

    /// Add credits to a live user.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidAmount` if `amount <= 0`.
    /// - `EngineError::BalanceCeilingExceeded` above the configured maximum.
    fn add_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        reason: &str,
        performed_by: Option<UserId>,
    ) -> Result<LedgerEntry>;

    /// Refund a booking charge. `amount` must equal the credits the booking
    /// was charged. A second refund for the same booking returns
    /// `RefundOutcome::DuplicateRefund` without touching the balance. The
    /// balance ceiling does not apply to refunds.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::OrphanReference` if the booking is missing or deleted,
    /// `EngineError::RefundMismatch` if the booking was never charged or the
    /// amount differs, and `EngineError::InvalidTransition` for completed bookings.
    fn refund_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        booking_id: &BookingId,
    ) -> Result<RefundOutcome>;

    /// List ledger entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;

    /// Replay a user's ledger against the stored balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user has no credit row.
    fn audit_ledger(&self, user_id: &UserId) -> Result<LedgerAudit>;

    /// Aggregate figures for a user's ledger.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user has no credit row.
    fn ledger_summary(&self, user_id: &UserId) -> Result<LedgerSummary>;

    // =========================================================================
    // Chat
    // =========================================================================

    /// The room for a teacher/student pair, if one was ever created.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chat_room(&self, teacher_id: &UserId, student_id: &UserId) -> Result<Option<ChatRoom>>;

    /// A room by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_chat_room_by_id(&self, room_id: &ChatRoomId) -> Result<Option<ChatRoom>>;

    /// Create missing rooms for every live relationship that needs one.
    ///
    /// # Errors
    ///
    /// Returns an error only if the scan itself fails; per-pair failures are
    /// counted as skipped.
    fn reconcile_chat_rooms(&self) -> Result<ReconcileReport>;

    /// Post a message to a live room.
    ///
    /// # Errors
    ///
    /// - `StoreError::OrphanReference` if the room is missing or deleted.
    /// - `StoreError::NotParticipant` if the sender is not in the room.
    fn post_message(&self, room_id: &ChatRoomId, sender_id: &UserId, body: &str)
        -> Result<Message>;

    /// Messages of a room, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_messages(&self, room_id: &ChatRoomId, limit: usize) -> Result<Vec<Message>>;

    /// Set a message's moderation status.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the message doesn't exist.
    fn moderate_message(
        &self,
        room_id: &ChatRoomId,
        message_id: &MessageId,
        status: ModerationStatus,
    ) -> Result<Message>;
}
