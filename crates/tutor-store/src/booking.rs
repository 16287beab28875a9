//! Booking state machine.
//!
//! Each status change is one transaction script. For activation the order is
//! fixed: overbooking guard, then ledger deduction, then chat provisioning.
//! Any failing step drops the transaction, so a rejected activation leaves no
//! deducted balance, no claimed seat and no room behind.

use chrono::{DateTime, Utc};

use tutor_core::{
    Booking, BookingStatus, EngineError, Lesson, ProvisionSource, Role, SoftDelete, Transition,
};

use crate::error::{Result, StoreError};
use crate::rocks::RocksStore;
use crate::schema::cf;
use crate::tx::EngineTx;
use crate::{chat, guard, keys, ledger, BookingReceipt, NewBooking, TransitionRequest};

/// Whether activation provisions the chat room inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatStep {
    Inline,
    /// Left to the reconciliation pass (administrative imports).
    Deferred,
}

/// Guard, ledger and provisioner for a booking becoming active.
///
/// The lesson must already be locked by the caller.
fn activate(
    tx: &EngineTx<'_>,
    lesson: &mut Lesson,
    booking: &mut Booking,
    chat_step: ChatStep,
) -> Result<BookingReceipt> {
    let student = tx.live_user(&booking.student_id)?;
    let teacher = tx.live_user(&lesson.teacher_id)?;

    guard::claim_seat(tx, lesson)?;
    let deduction = ledger::deduct(tx, &student.id, lesson.credit_cost, &booking.id)?;

    booking.mark_active(lesson.credit_cost, Utc::now());
    tx.put_booking(booking)?;

    let chat = match chat_step {
        ChatStep::Inline => Some(chat::provision(
            tx,
            &teacher.id,
            &student.id,
            ProvisionSource::Activation,
        )?),
        ChatStep::Deferred => None,
    };

    Ok(BookingReceipt {
        booking: booking.clone(),
        changed: true,
        deduction: Some(deduction),
        refund: None,
        chat,
    })
}

fn cancel(
    tx: &EngineTx<'_>,
    lesson: &mut Lesson,
    booking: &mut Booking,
    release: bool,
) -> Result<BookingReceipt> {
    let refund = if release {
        guard::release_seat(tx, lesson)?;
        match booking.charged_credits {
            Some(charged) if charged > 0 => Some(ledger::refund(
                tx,
                &booking.student_id,
                charged,
                &booking.id,
            )?),
            _ => None,
        }
    } else {
        None
    };

    booking.mark_closed(BookingStatus::Cancelled, Utc::now());
    tx.put_booking(booking)?;

    Ok(BookingReceipt {
        booking: booking.clone(),
        changed: true,
        deduction: None,
        refund,
        chat: None,
    })
}

fn complete(
    tx: &EngineTx<'_>,
    lesson: &mut Lesson,
    booking: &mut Booking,
    now: DateTime<Utc>,
) -> Result<BookingReceipt> {
    if !lesson.has_ended(now) {
        return Err(EngineError::LessonNotFinished {
            lesson_id: lesson.id,
        }
        .into());
    }

    // The lesson is over; the counter only tracks active bookings.
    guard::release_seat(tx, lesson)?;
    booking.mark_closed(BookingStatus::Completed, now);
    tx.put_booking(booking)?;

    Ok(BookingReceipt {
        booking: booking.clone(),
        changed: true,
        deduction: None,
        refund: None,
        chat: None,
    })
}

/// Write a new booking row and its indexes, activating it if requested.
fn insert(
    tx: &EngineTx<'_>,
    lesson: &mut Lesson,
    new: &NewBooking,
    chat_step: ChatStep,
) -> Result<BookingReceipt> {
    let key = keys::booking_key(&new.id);
    if tx.lock_raw(cf::BOOKINGS, &key)?.is_some() {
        return Err(StoreError::AlreadyExists {
            entity: "booking",
            id: new.id.to_string(),
        });
    }

    let mut booking = Booking::new(new.id, new.lesson_id, new.student_id);
    tx.put_raw(
        cf::BOOKINGS_BY_LESSON,
        &keys::lesson_booking_key(&new.lesson_id, &new.id),
        &[],
    )?;
    tx.put_raw(
        cf::BOOKINGS_BY_STUDENT,
        &keys::student_booking_key(&new.student_id, &new.id),
        &[],
    )?;

    let student = tx.live_user(&new.student_id)?;
    if student.role != Role::Student {
        return Err(EngineError::RoleMismatch {
            expected: Role::Student,
        }
        .into());
    }

    match new.status {
        BookingStatus::Pending => {
            tx.put_booking(&booking)?;
            Ok(BookingReceipt {
                booking,
                changed: true,
                deduction: None,
                refund: None,
                chat: None,
            })
        }
        BookingStatus::Active => activate(tx, lesson, &mut booking, chat_step),
        other => Err(EngineError::InvalidTransition {
            from: BookingStatus::Pending,
            to: other,
        }
        .into()),
    }
}

pub(crate) fn create(store: &RocksStore, new: &NewBooking) -> Result<BookingReceipt> {
    let tx = store.begin();
    let mut lesson = tx.lock_live_lesson(&new.lesson_id)?;
    let receipt = insert(&tx, &mut lesson, new, ChatStep::Inline)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %new.id,
        lesson_id = %new.lesson_id,
        student_id = %new.student_id,
        status = %receipt.booking.status,
        room_id = ?receipt.chat.as_ref().map(tutor_core::ProvisionOutcome::room_id),
        "Booking created"
    );

    Ok(receipt)
}

pub(crate) fn transition(store: &RocksStore, request: &TransitionRequest) -> Result<BookingReceipt> {
    let tx = store.begin();

    let mut lesson = match tx.lock_lesson(&request.lesson_id) {
        Err(StoreError::NotFound { .. }) => {
            return Err(StoreError::orphan("lesson", request.lesson_id))
        }
        other => other?,
    };
    let mut booking = tx.lock_booking(&request.booking_id)?;

    if booking.lesson_id != request.lesson_id {
        return Err(StoreError::BookingMismatch {
            booking_id: booking.id.to_string(),
            field: "lesson",
        });
    }
    if booking.student_id != request.student_id {
        return Err(StoreError::BookingMismatch {
            booking_id: booking.id.to_string(),
            field: "student",
        });
    }
    if !booking.is_live() {
        return Err(StoreError::orphan("booking", booking.id));
    }

    let from = booking.status;
    let receipt = match from.plan_transition(request.target)? {
        Transition::Unchanged => return Ok(BookingReceipt::unchanged(booking)),
        Transition::Activate => activate(&tx, &mut lesson, &mut booking, ChatStep::Inline)?,
        Transition::Cancel { release } => cancel(&tx, &mut lesson, &mut booking, release)?,
        Transition::Complete => complete(&tx, &mut lesson, &mut booking, Utc::now())?,
    };
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        lesson_id = %booking.lesson_id,
        student_id = %booking.student_id,
        from = %from,
        to = %booking.status,
        seats_taken = lesson.current_students,
        "Booking transitioned"
    );

    Ok(receipt)
}

pub(crate) fn import(store: &RocksStore, bookings: &[NewBooking]) -> Result<Vec<Booking>> {
    let tx = store.begin();

    // Lock each lesson once, in a stable order.
    let mut lesson_ids: Vec<_> = bookings.iter().map(|b| b.lesson_id).collect();
    lesson_ids.sort();
    lesson_ids.dedup();
    let mut lessons = std::collections::BTreeMap::new();
    for id in lesson_ids {
        lessons.insert(id, tx.lock_live_lesson(&id)?);
    }

    let mut inserted = Vec::with_capacity(bookings.len());
    for new in bookings {
        let lesson = lessons
            .get_mut(&new.lesson_id)
            .ok_or_else(|| StoreError::orphan("lesson", new.lesson_id))?;
        let receipt = insert(&tx, lesson, new, ChatStep::Deferred)?;
        inserted.push(receipt.booking);
    }
    tx.commit()?;

    tracing::info!(
        count = inserted.len(),
        active = inserted
            .iter()
            .filter(|b| b.status == BookingStatus::Active)
            .count(),
        "Bookings imported without inline chat provisioning"
    );

    Ok(inserted)
}

pub(crate) fn complete_finished(store: &RocksStore, now: DateTime<Utc>) -> Result<usize> {
    let cf = store.cf(cf::BOOKINGS)?;
    let mut due = Vec::new();
    for item in store.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
        let (_, value) = item?;
        let booking: Booking = RocksStore::deserialize(&value)?;
        if booking.holds_seat() {
            due.push(booking);
        }
    }
    drop(cf);

    let mut completed = 0;
    for booking in due {
        let ended = store
            .read::<Lesson>(cf::LESSONS, &keys::lesson_key(&booking.lesson_id))?
            .is_some_and(|lesson| lesson.has_ended(now));
        if !ended {
            continue;
        }

        let request = TransitionRequest {
            booking_id: booking.id,
            lesson_id: booking.lesson_id,
            student_id: booking.student_id,
            target: BookingStatus::Completed,
        };
        match transition(store, &request) {
            Ok(receipt) if receipt.changed => completed += 1,
            Ok(_) => {}
            Err(e) => tracing::warn!(
                booking_id = %booking.id,
                error = %e,
                "Skipping booking in completion sweep"
            ),
        }
    }

    if completed > 0 {
        tracing::info!(completed, "Completed bookings of finished lessons");
    }
    Ok(completed)
}
