//! Overbooking guard.
//!
//! The lesson row is locked by the caller before any of these run, so the
//! capacity check and the counter update happen under the same lock as the
//! booking status write.

use tutor_core::{EngineError, Lesson, SoftDelete};

use crate::error::{Result, StoreError};
use crate::tx::EngineTx;

/// Claim a seat on a locked lesson and persist the new counter.
pub(crate) fn claim_seat(tx: &EngineTx<'_>, lesson: &mut Lesson) -> Result<()> {
    if !lesson.is_live() {
        return Err(StoreError::orphan("lesson", lesson.id));
    }

    if let Err(err) = lesson.take_seat() {
        if let EngineError::CapacityExceeded {
            capacity, active, ..
        } = &err
        {
            tracing::info!(
                lesson_id = %lesson.id,
                capacity,
                active,
                "Activation rejected: lesson is full"
            );
        }
        return Err(err.into());
    }

    tx.put_lesson(lesson)
}

/// Release a seat on a locked lesson and persist the new counter.
pub(crate) fn release_seat(tx: &EngineTx<'_>, lesson: &mut Lesson) -> Result<()> {
    lesson.release_seat();
    tx.put_lesson(lesson)
}
