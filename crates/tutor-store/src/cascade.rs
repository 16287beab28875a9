//! Soft-delete cascade.
//!
//! Deleting a user, lesson or booking stamps `deleted_at` on the row and on
//! every dependent row in one transaction. Rows are never removed. A deleted
//! active booking gives its seat back; no refund is issued.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use tutor_core::{
    Booking, BookingId, ChatRoom, ChatRoomId, Lesson, LessonId, SoftDelete, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::rocks::RocksStore;
use crate::schema::cf;
use crate::tx::EngineTx;
use crate::CascadeReport;

/// Mark one booking deleted under an already locked lesson.
fn delete_booking_row(
    tx: &EngineTx<'_>,
    lesson: &mut Lesson,
    booking_id: &BookingId,
    now: DateTime<Utc>,
    report: &mut CascadeReport,
) -> Result<()> {
    let mut booking = tx.lock_booking(booking_id)?;
    if !booking.is_live() {
        return Ok(());
    }

    if booking.holds_seat() {
        lesson.release_seat();
        report.seats_released += 1;
    }
    booking.mark_deleted(now);
    tx.put_booking(&booking)?;
    report.bookings += 1;
    Ok(())
}

/// Mark a locked lesson and all of its bookings deleted.
fn delete_lesson_rows(
    tx: &EngineTx<'_>,
    lesson: &mut Lesson,
    now: DateTime<Utc>,
    report: &mut CascadeReport,
) -> Result<()> {
    for key in tx.scan_keys(cf::BOOKINGS_BY_LESSON, lesson.id.as_bytes())? {
        if let Some(child) = keys::child_id(&key) {
            delete_booking_row(tx, lesson, &BookingId::from_bytes(child), now, report)?;
        }
    }

    if lesson.is_live() {
        lesson.mark_deleted(now);
        report.lessons += 1;
    }
    tx.put_lesson(lesson)
}

/// Lessons and bookings hanging off a user, read from the indexes without locking.
struct Dependents {
    lessons: Vec<LessonId>,
    bookings: Vec<(BookingId, LessonId)>,
}

impl Dependents {
    fn scan(tx: &EngineTx<'_>, user_id: &UserId) -> Result<Self> {
        let mut lessons = Vec::new();
        for key in tx.scan_keys(cf::LESSONS_BY_TEACHER, user_id.as_bytes())? {
            if let Some(child) = keys::child_id(&key) {
                lessons.push(LessonId::from_bytes(child));
            }
        }

        let mut bookings = Vec::new();
        for key in tx.scan_keys(cf::BOOKINGS_BY_STUDENT, user_id.as_bytes())? {
            let Some(child) = keys::child_id(&key) else {
                continue;
            };
            let booking_id = BookingId::from_bytes(child);
            if let Some(peek) = tx.get::<Booking>(cf::BOOKINGS, &keys::booking_key(&booking_id))? {
                if peek.is_live() {
                    bookings.push((booking_id, peek.lesson_id));
                }
            }
        }

        Ok(Self { lessons, bookings })
    }

    fn lesson_ids(&self) -> BTreeSet<LessonId> {
        self.lessons
            .iter()
            .copied()
            .chain(self.bookings.iter().map(|(_, lesson_id)| *lesson_id))
            .collect()
    }

    /// Every lesson named here must already be locked in `lessons`.
    fn delete(
        &self,
        tx: &EngineTx<'_>,
        lessons: &mut BTreeMap<LessonId, Lesson>,
        now: DateTime<Utc>,
        report: &mut CascadeReport,
    ) -> Result<()> {
        for lesson_id in &self.lessons {
            if let Some(lesson) = lessons.get_mut(lesson_id) {
                delete_lesson_rows(tx, lesson, now, report)?;
            }
        }
        for (booking_id, lesson_id) in &self.bookings {
            if let Some(lesson) = lessons.get_mut(lesson_id) {
                delete_booking_row(tx, lesson, booking_id, now, report)?;
            }
        }
        Ok(())
    }
}

fn lock_lessons(
    tx: &EngineTx<'_>,
    ids: BTreeSet<LessonId>,
    locked: &mut BTreeMap<LessonId, Lesson>,
) -> Result<()> {
    for id in ids {
        if let Entry::Vacant(slot) = locked.entry(id) {
            slot.insert(tx.lock_lesson(&id)?);
        }
    }
    Ok(())
}

fn delete_room(
    tx: &EngineTx<'_>,
    room_id: &ChatRoomId,
    now: DateTime<Utc>,
    report: &mut CascadeReport,
) -> Result<()> {
    let room_key = keys::chat_room_key(room_id);
    let Some(peek) = tx.get::<ChatRoom>(cf::CHAT_ROOMS, &room_key)? else {
        return Ok(());
    };

    // Serialize with provisioning of the same pair.
    tx.lock_raw(
        cf::CHAT_ROOMS_BY_PAIR,
        &keys::chat_pair_key(&peek.teacher_id, &peek.student_id),
    )?;
    let Some(mut room) = tx.lock::<ChatRoom>(cf::CHAT_ROOMS, &room_key)? else {
        return Ok(());
    };
    if room.is_live() {
        room.mark_deleted(now);
        tx.put(cf::CHAT_ROOMS, &room_key, &room)?;
        report.chat_rooms += 1;
    }
    Ok(())
}

pub(crate) fn delete_user(store: &RocksStore, user_id: &UserId) -> Result<CascadeReport> {
    let tx = store.begin();
    let now = Utc::now();
    let mut report = CascadeReport::default();

    let peek: User = tx
        .get(cf::USERS, &keys::user_key(user_id))?
        .ok_or_else(|| StoreError::not_found("user", user_id))?;
    if !peek.is_live() {
        return Ok(report);
    }

    // Lessons and bookings precede the user in the lock order.
    let mut lessons = BTreeMap::new();
    let dependents = Dependents::scan(&tx, user_id)?;
    lock_lessons(&tx, dependents.lesson_ids(), &mut lessons)?;
    dependents.delete(&tx, &mut lessons, now, &mut report)?;

    let mut user = tx.lock_user(user_id)?;
    if !user.is_live() {
        return Ok(CascadeReport::default());
    }
    user.mark_deleted(now);
    tx.put_user(&user)?;
    report.users = 1;

    // Rows indexed between the scan and the user lock. Later inserts see the
    // deleted user and fail.
    let late = Dependents::scan(&tx, user_id)?;
    lock_lessons(&tx, late.lesson_ids(), &mut lessons)?;
    late.delete(&tx, &mut lessons, now, &mut report)?;

    for lesson in lessons.values() {
        tx.put_lesson(lesson)?;
    }

    for key in tx.scan_keys(cf::CHAT_ROOMS_BY_USER, user_id.as_bytes())? {
        if let Some(child) = keys::child_id(&key) {
            delete_room(&tx, &ChatRoomId::from_bytes(child), now, &mut report)?;
        }
    }

    tx.commit()?;

    tracing::info!(
        user_id = %user_id,
        lessons = report.lessons,
        bookings = report.bookings,
        seats_released = report.seats_released,
        chat_rooms = report.chat_rooms,
        "User soft-deleted"
    );

    Ok(report)
}

pub(crate) fn delete_lesson(store: &RocksStore, lesson_id: &LessonId) -> Result<CascadeReport> {
    let tx = store.begin();
    let mut report = CascadeReport::default();

    let mut lesson = tx.lock_lesson(lesson_id)?;
    if !lesson.is_live() {
        return Ok(report);
    }
    delete_lesson_rows(&tx, &mut lesson, Utc::now(), &mut report)?;
    tx.commit()?;

    tracing::info!(
        lesson_id = %lesson_id,
        bookings = report.bookings,
        seats_released = report.seats_released,
        "Lesson soft-deleted"
    );

    Ok(report)
}

pub(crate) fn delete_booking(store: &RocksStore, booking_id: &BookingId) -> Result<CascadeReport> {
    let tx = store.begin();
    let mut report = CascadeReport::default();

    let peek: Booking = tx
        .get(cf::BOOKINGS, &keys::booking_key(booking_id))?
        .ok_or_else(|| StoreError::not_found("booking", booking_id))?;
    let mut lesson = tx.lock_lesson(&peek.lesson_id)?;
    delete_booking_row(&tx, &mut lesson, booking_id, Utc::now(), &mut report)?;
    tx.put_lesson(&lesson)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking_id,
        seats_released = report.seats_released,
        "Booking soft-deleted"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rocks::tests::{add_lesson, add_user, book, request, Fixture};
    use crate::Store;
    use tutor_core::{BookingStatus, EngineError, Role};

    #[test]
    fn deleting_student_cascades_bookings_and_rooms() {
        let fx = Fixture::new(2, 5);
        let receipt = book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();
        let room_id = receipt.chat.unwrap().room_id();

        let report = fx.store.delete_user(&fx.student).unwrap();
        assert_eq!(
            report,
            CascadeReport {
                users: 1,
                lessons: 0,
                bookings: 1,
                seats_released: 1,
                chat_rooms: 1,
            }
        );

        let booking = fx.store.get_booking(&receipt.booking.id).unwrap().unwrap();
        assert!(booking.deleted_at.is_some());
        let room = fx.store.get_chat_room_by_id(&room_id).unwrap().unwrap();
        assert!(room.deleted_at.is_some());
        assert_eq!(fx.store.seat_availability(&fx.lesson).unwrap().active, 0);

        // Rows stay readable; the balance is untouched.
        assert_eq!(fx.balance(fx.student), 4);
        assert!(fx.store.get_user(&fx.student).unwrap().unwrap().deleted_at.is_some());
    }

    #[test]
    fn deleting_teacher_cascades_lessons() {
        let fx = Fixture::new(2, 5);
        let second = add_lesson(&fx.store, fx.teacher, 1);
        book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();
        book(&fx.store, second, fx.student, BookingStatus::Pending).unwrap();

        let report = fx.store.delete_user(&fx.teacher).unwrap();
        assert_eq!(report.lessons, 2);
        assert_eq!(report.bookings, 2);
        assert_eq!(report.chat_rooms, 1);

        let err = fx.store.seat_availability(&fx.lesson).unwrap_err();
        assert!(matches!(err, StoreError::OrphanReference { entity: "lesson", .. }));
    }

    #[test]
    fn deleting_teacher_races_activation_without_conflict() {
        for _ in 0..16 {
            let fx = Fixture::new(2, 5);
            let pending = book(&fx.store, fx.lesson, fx.student, BookingStatus::Pending).unwrap();

            let (deleted, activated) = std::thread::scope(|scope| {
                let store = &fx.store;
                let teacher = fx.teacher;
                let booking = &pending.booking;
                let delete = scope.spawn(move || store.delete_user(&teacher));
                let activate = scope.spawn(move || {
                    store.transition_booking(&request(booking, BookingStatus::Active))
                });
                (delete.join().unwrap(), activate.join().unwrap())
            });

            assert_eq!(deleted.unwrap().users, 1);
            match activated {
                Ok(_) => assert_eq!(fx.balance(fx.student), 4),
                Err(StoreError::OrphanReference { .. }) => assert_eq!(fx.balance(fx.student), 5),
                Err(other) => panic!("activation failed with {other:?}"),
            }
            let booking = fx.store.get_booking(&pending.booking.id).unwrap().unwrap();
            assert!(booking.deleted_at.is_some());
        }
    }

    #[test]
    fn deleted_rows_block_new_activity() {
        let fx = Fixture::new(2, 5);
        let pending = book(&fx.store, fx.lesson, fx.student, BookingStatus::Pending).unwrap();
        fx.store.delete_booking(&pending.booking.id).unwrap();

        let err = fx
            .store
            .transition_booking(&request(&pending.booking, BookingStatus::Active))
            .unwrap_err();
        assert!(matches!(err, StoreError::OrphanReference { entity: "booking", .. }));

        fx.store.delete_user(&fx.student).unwrap();
        let err = fx.store.add_credits(&fx.student, 1, "top-up", None).unwrap_err();
        assert!(matches!(err, StoreError::OrphanReference { entity: "user", .. }));
    }

    #[test]
    fn deleting_active_booking_frees_seat_without_refund() {
        let fx = Fixture::new(1, 5);
        let active = book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();

        let report = fx.store.delete_booking(&active.booking.id).unwrap();
        assert_eq!(report.seats_released, 1);
        assert_eq!(fx.balance(fx.student), 4);

        let other = add_user(&fx.store, Role::Student);
        fx.store.add_credits(&other, 1, "seed", None).unwrap();
        book(&fx.store, fx.lesson, other, BookingStatus::Active).unwrap();
        let err = book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap_err();
        assert!(matches!(err, StoreError::Engine(EngineError::CapacityExceeded { .. })));
    }

    #[test]
    fn deleting_twice_changes_nothing() {
        let fx = Fixture::new(1, 5);
        assert_eq!(fx.store.delete_lesson(&fx.lesson).unwrap().lessons, 1);
        assert_eq!(fx.store.delete_lesson(&fx.lesson).unwrap(), CascadeReport::default());
        assert_eq!(fx.store.delete_user(&fx.student).unwrap().users, 1);
        assert_eq!(fx.store.delete_user(&fx.student).unwrap(), CascadeReport::default());
    }

    #[test]
    fn deleting_unknown_rows_is_not_found() {
        let fx = Fixture::new(1, 5);
        let err = fx.store.delete_user(&UserId::generate()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "user", .. }));
        let err = fx.store.delete_booking(&BookingId::generate()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "booking", .. }));
    }
}
