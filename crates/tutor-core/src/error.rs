//! Rule violations raised by the engine's invariant checks.

use crate::booking::BookingStatus;
use crate::ids::{IdError, LessonId};

/// Result type for engine rule checks.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A request that would break one of the engine's invariants.
///
/// These are detected before anything is written, so returning one of them
/// always means the enclosing operation had no effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Credit amounts must be strictly positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// The deduction would take the balance below zero.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Balance at check time.
        balance: i64,
        /// Amount that was requested.
        required: i64,
    },

    /// The addition would push the balance over the configured maximum.
    #[error("balance ceiling exceeded: balance={balance}, amount={amount}, max={max}")]
    BalanceCeilingExceeded {
        /// Balance at check time.
        balance: i64,
        /// Amount that was requested.
        amount: i64,
        /// Configured maximum balance.
        max: i64,
    },

    /// Every seat of the lesson is already taken.
    #[error("capacity exceeded for lesson {lesson_id}: {active}/{capacity} seats taken")]
    CapacityExceeded {
        /// The full lesson.
        lesson_id: LessonId,
        /// Capacity at check time.
        capacity: u32,
        /// Active bookings at check time.
        active: u32,
    },

    /// A capacity edit would drop below the seats already taken.
    #[error("capacity {capacity} is below the {active} active bookings")]
    CapacityBelowActive {
        /// Requested capacity.
        capacity: u32,
        /// Active bookings at check time.
        active: u32,
    },

    /// The booking cannot move between these states.
    #[error("invalid booking transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: BookingStatus,
        /// Requested status.
        to: BookingStatus,
    },

    /// A refund must return exactly what the booking was charged.
    #[error("refund of {requested} does not match the {charged} credits charged")]
    RefundMismatch {
        /// Credits the booking was charged (zero if never activated).
        charged: i64,
        /// Amount that was requested.
        requested: i64,
    },

    /// Completion was requested before the lesson ended.
    #[error("lesson {lesson_id} has not finished yet")]
    LessonNotFinished {
        /// The lesson still in progress or upcoming.
        lesson_id: LessonId,
    },

    /// The user does not hold the role the operation needs.
    #[error("user must be a {expected}")]
    RoleMismatch {
        /// Role that was required.
        expected: crate::Role,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
