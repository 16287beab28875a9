//! Core types and rules for the tutoring booking engine.
//!
//! This crate holds the entities and the pure invariant checks used by the
//! storage layer's transaction scripts:
//!
//! - **Identifiers**: `UserId`, `LessonId`, `BookingId`, `ChatRoomId`, `TransactionId`
//! - **Ledger**: `Credit`, `CreditTransaction`, `OperationType`, `LedgerAudit`
//! - **Bookings**: `Booking`, `BookingStatus`, `Transition`
//! - **Lessons**: `Lesson`, `SeatAvailability`
//! - **Chat**: `ChatRoom`, `Message`, `ProvisionOutcome`, `ReconcileReport`
//!
//! # Credits
//!
//! Balances are whole credits stored as `i64`. A balance is never negative
//! and never above the configured maximum.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod booking;
pub mod chat;
pub mod credits;
pub mod error;
pub mod ids;
pub mod lesson;
pub mod soft_delete;
pub mod user;

pub use booking::{Booking, BookingStatus, Transition};
pub use chat::{
    ChatRoom, Message, ModerationStatus, ProvisionOutcome, ProvisionSource, ReconcileReport,
};
pub use credits::{
    Credit, CreditTransaction, LedgerAudit, LedgerSummary, OperationType, RefundOutcome,
    DEFAULT_MAX_BALANCE,
};
pub use error::{EngineError, Result};
pub use ids::{BookingId, ChatRoomId, IdError, LessonId, MessageId, TransactionId, UserId};
pub use lesson::{Lesson, SeatAvailability, DEFAULT_LESSON_CREDIT_COST};
pub use soft_delete::SoftDelete;
pub use user::{Role, User};
