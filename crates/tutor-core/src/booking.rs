//! Booking lifecycle.
//!
//! ```text
//! pending ──► active ──► completed
//!    │           │
//!    └──► cancelled ◄──┘
//! ```
//!
//! `completed` and `cancelled` are terminal. A student who wants the seat
//! again needs a new booking.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::soft_delete::impl_soft_delete;
use crate::{BookingId, LessonId, UserId};

/// Status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Reserved but not confirmed. Holds no seat and no credits.
    Pending,
    /// Confirmed. Holds a seat and has been charged.
    Active,
    /// Released. Terminal.
    Cancelled,
    /// The lesson took place. Terminal.
    Completed,
}

impl BookingStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Whether a booking in this status ever established a teacher/student
    /// relationship that needs a chat room.
    #[must_use]
    pub const fn needs_chat_room(self) -> bool {
        matches!(self, Self::Active | Self::Completed)
    }

    /// Decide what moving from `self` to `target` entails.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidTransition` for moves the lifecycle
    /// does not allow.
    pub fn plan_transition(self, target: Self) -> Result<Transition> {
        match (self, target) {
            (from, to) if from == to => Ok(Transition::Unchanged),
            (Self::Pending, Self::Active) => Ok(Transition::Activate),
            (Self::Pending, Self::Cancelled) => Ok(Transition::Cancel { release: false }),
            (Self::Active, Self::Cancelled) => Ok(Transition::Cancel { release: true }),
            (Self::Active, Self::Completed) => Ok(Transition::Complete),
            (from, to) => Err(EngineError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// The side effects a status change requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Already in the requested status; nothing to do.
    Unchanged,
    /// Guard check, credit deduction, chat provisioning.
    Activate,
    /// Cancellation. `release` is set when a seat and credits are held.
    Cancel {
        /// Seat release and refund are needed.
        release: bool,
    },
    /// Mark the lesson as taken place.
    Complete,
}

/// A student's booking of a lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    /// The booking ID.
    pub id: BookingId,

    /// Booked lesson.
    pub lesson_id: LessonId,

    /// Booking student.
    pub student_id: UserId,

    /// Current lifecycle status.
    pub status: BookingStatus,

    /// Credits deducted on activation; refunded on cancellation.
    pub charged_credits: Option<i64>,

    /// When the booking was created.
    pub created_at: DateTime<Utc>,

    /// When the booking last changed.
    pub updated_at: DateTime<Utc>,

    /// When the booking became active.
    pub activated_at: Option<DateTime<Utc>>,

    /// When the booking reached a terminal status.
    pub closed_at: Option<DateTime<Utc>>,

    /// Set once the booking is soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Create a pending booking.
    #[must_use]
    pub fn new(id: BookingId, lesson_id: LessonId, student_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id,
            lesson_id,
            student_id,
            status: BookingStatus::Pending,
            charged_credits: None,
            created_at: now,
            updated_at: now,
            activated_at: None,
            closed_at: None,
            deleted_at: None,
        }
    }

    /// Whether the booking currently holds a seat.
    #[must_use]
    pub fn holds_seat(&self) -> bool {
        self.status == BookingStatus::Active && self.deleted_at.is_none()
    }

    /// Record activation after the guard and ledger steps succeeded.
    pub fn mark_active(&mut self, charged: i64, at: DateTime<Utc>) {
        self.status = BookingStatus::Active;
        self.charged_credits = Some(charged);
        self.activated_at = Some(at);
        self.updated_at = at;
    }

    /// The amount a refund of this booking returns.
    ///
    /// Only the full charge of an active or cancelled booking can be
    /// refunded; a completed lesson keeps its charge.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` for completed bookings, `RefundMismatch` if the
    /// booking was never charged or `requested` differs from the charge.
    pub fn refundable(&self, requested: i64) -> Result<i64> {
        if self.status == BookingStatus::Completed {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: BookingStatus::Cancelled,
            });
        }
        match self.charged_credits {
            Some(charged) if charged > 0 && charged == requested => Ok(charged),
            charged => Err(EngineError::RefundMismatch {
                charged: charged.unwrap_or(0),
                requested,
            }),
        }
    }

    /// Record a terminal status.
    pub fn mark_closed(&mut self, status: BookingStatus, at: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.closed_at = Some(at);
        self.updated_at = at;
    }
}

impl_soft_delete!(Booking);
