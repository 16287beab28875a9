//! Lessons and the seat-capacity rules attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::soft_delete::impl_soft_delete;
use crate::{LessonId, UserId};

/// Default number of credits an activated booking costs.
pub const DEFAULT_LESSON_CREDIT_COST: i64 = 1;

/// A scheduled lesson owned by a teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    /// The lesson ID.
    pub id: LessonId,

    /// Owning teacher.
    pub teacher_id: UserId,

    /// Title shown to students.
    pub title: String,

    /// Seat count. Editable by administrators.
    pub capacity: u32,

    /// Active, non-deleted bookings referencing this lesson.
    ///
    /// Only ever changed under the lesson's row lock, in the same
    /// transaction as the booking status change it reflects.
    pub current_students: u32,

    /// Credits deducted from a student when a booking is activated.
    pub credit_cost: i64,

    /// Scheduled start.
    pub starts_at: DateTime<Utc>,

    /// Scheduled end. Bookings can be completed only after this.
    pub ends_at: DateTime<Utc>,

    /// When the lesson was created.
    pub created_at: DateTime<Utc>,

    /// When the lesson was last changed.
    pub updated_at: DateTime<Utc>,

    /// Set once the lesson is soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Lesson {
    /// Create a lesson with no seats taken.
    #[must_use]
    pub fn new(
        id: LessonId,
        teacher_id: UserId,
        title: impl Into<String>,
        capacity: u32,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            teacher_id,
            title: title.into(),
            capacity,
            current_students: 0,
            credit_cost: DEFAULT_LESSON_CREDIT_COST,
            starts_at,
            ends_at,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Seats still free at the current capacity.
    #[must_use]
    pub const fn seats_available(&self) -> u32 {
        self.capacity.saturating_sub(self.current_students)
    }

    /// Claim one seat, failing if the lesson is full.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CapacityExceeded` when no seat is free.
    pub fn take_seat(&mut self) -> Result<()> {
        if self.current_students >= self.capacity {
            return Err(EngineError::CapacityExceeded {
                lesson_id: self.id,
                capacity: self.capacity,
                active: self.current_students,
            });
        }
        self.current_students += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Give back a seat held by a booking leaving the active state.
    pub fn release_seat(&mut self) {
        self.current_students = self.current_students.saturating_sub(1);
        self.updated_at = Utc::now();
    }

    /// Change the seat count.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CapacityBelowActive` if fewer seats than active
    /// bookings are requested.
    pub fn set_capacity(&mut self, capacity: u32) -> Result<()> {
        if capacity < self.current_students {
            return Err(EngineError::CapacityBelowActive {
                capacity,
                active: self.current_students,
            });
        }
        self.capacity = capacity;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the lesson's end time is at or before `now`.
    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.ends_at <= now
    }
}

impl_soft_delete!(Lesson);

/// Read-only view of a lesson's seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAvailability {
    /// The lesson.
    pub lesson_id: LessonId,
    /// Seat count at read time.
    pub capacity: u32,
    /// Seats held by active bookings.
    pub active: u32,
    /// Seats still free.
    pub available: u32,
}

impl From<&Lesson> for SeatAvailability {
    fn from(lesson: &Lesson) -> Self {
        Self {
            lesson_id: lesson.id,
            capacity: lesson.capacity,
            active: lesson.current_students,
            available: lesson.seats_available(),
        }
    }
}
