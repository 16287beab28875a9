//! Chat room reconciliation.
//!
//! Finds every live teacher/student relationship backed by an active or
//! completed booking and provisions the missing rooms. The scan reads a
//! snapshot; each pair is then re-checked and provisioned in its own
//! transaction, so a failure on one pair never blocks the others.

use std::collections::{BTreeMap, HashMap};

use rocksdb::IteratorMode;

use tutor_core::{
    Booking, BookingId, Lesson, LessonId, ProvisionSource, ReconcileReport, SoftDelete, UserId,
};

use crate::chat;
use crate::error::Result;
use crate::keys;
use crate::rocks::RocksStore;
use crate::schema::cf;

type Pair = (UserId, UserId);

/// Pairs that need a room, with the bookings that justify each one.
fn collect_pairs(store: &RocksStore) -> Result<BTreeMap<Pair, Vec<BookingId>>> {
    let snapshot = store.db.snapshot();
    let bookings_cf = store.cf(cf::BOOKINGS)?;
    let lessons_cf = store.cf(cf::LESSONS)?;

    let mut teachers: HashMap<LessonId, Option<UserId>> = HashMap::new();
    let mut pairs: BTreeMap<Pair, Vec<BookingId>> = BTreeMap::new();

    for item in snapshot.iterator_cf(&bookings_cf, IteratorMode::Start) {
        let (_, value) = item?;
        let booking: Booking = RocksStore::deserialize(&value)?;
        if !booking.is_live() || !booking.status.needs_chat_room() {
            continue;
        }

        let teacher = match teachers.get(&booking.lesson_id) {
            Some(teacher) => *teacher,
            None => {
                let teacher = snapshot
                    .get_cf(&lessons_cf, keys::lesson_key(&booking.lesson_id))?
                    .map(|raw| RocksStore::deserialize::<Lesson>(&raw))
                    .transpose()?
                    .filter(|lesson| lesson.is_live())
                    .map(|lesson| lesson.teacher_id);
                teachers.insert(booking.lesson_id, teacher);
                teacher
            }
        };

        if let Some(teacher) = teacher {
            pairs
                .entry((teacher, booking.student_id))
                .or_default()
                .push(booking.id);
        }
    }

    Ok(pairs)
}

/// Re-verify one pair and provision its room. Returns whether a room was created.
fn reconcile_pair(
    store: &RocksStore,
    teacher: &UserId,
    student: &UserId,
    bookings: &[BookingId],
) -> Result<bool> {
    let tx = store.begin();

    let mut still_needed = false;
    for booking_id in bookings {
        let booking: Option<Booking> = tx.get(cf::BOOKINGS, &keys::booking_key(booking_id))?;
        if booking.is_some_and(|b| b.is_live() && b.status.needs_chat_room()) {
            still_needed = true;
            break;
        }
    }
    if !still_needed {
        return Ok(false);
    }

    tx.live_user(teacher)?;
    tx.live_user(student)?;

    let outcome = chat::provision(&tx, teacher, student, ProvisionSource::Reconciliation)?;
    tx.commit()?;
    Ok(outcome.created())
}

pub(crate) fn run(store: &RocksStore) -> Result<ReconcileReport> {
    let pairs = collect_pairs(store)?;
    let mut report = ReconcileReport {
        scanned: pairs.len(),
        ..ReconcileReport::default()
    };

    for ((teacher, student), bookings) in &pairs {
        match reconcile_pair(store, teacher, student, bookings) {
            Ok(true) => report.created += 1,
            Ok(false) => {}
            Err(e) => {
                report.skipped += 1;
                tracing::warn!(
                    teacher_id = %teacher,
                    student_id = %student,
                    error = %e,
                    "Chat reconciliation skipped pair"
                );
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        created = report.created,
        skipped = report.skipped,
        "Chat reconciliation finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use crate::rocks::tests::{add_lesson, add_user, book, create_test_store, Fixture};
    use crate::{NewBooking, Store};
    use tutor_core::{BookingId, BookingStatus, ProvisionSource, Role};

    #[test]
    fn import_then_reconcile_creates_missing_rooms_once() {
        let (store, _dir) = create_test_store();
        let teacher = add_user(&store, Role::Teacher);
        let lesson = add_lesson(&store, teacher, 10);

        let mut batch = Vec::new();
        let mut students = Vec::new();
        for _ in 0..10 {
            let student = add_user(&store, Role::Student);
            store.add_credits(&student, 3, "seed", None).unwrap();
            students.push(student);
            batch.push(NewBooking {
                id: BookingId::generate(),
                lesson_id: lesson,
                student_id: student,
                status: BookingStatus::Active,
            });
        }

        // One pair already has a room from a normal activation.
        let other_lesson = add_lesson(&store, teacher, 1);
        book(&store, other_lesson, students[0], BookingStatus::Active).unwrap();

        store.import_bookings(&batch).unwrap();
        assert!(store.get_chat_room(&teacher, &students[1]).unwrap().is_none());

        let first = store.reconcile_chat_rooms().unwrap();
        assert_eq!(first.scanned, 10);
        assert_eq!(first.created, 9);
        assert_eq!(first.skipped, 0);

        for student in &students {
            let room = store.get_chat_room(&teacher, student).unwrap().unwrap();
            assert_eq!(room.teacher_id, teacher);
        }
        let reconciled = store.get_chat_room(&teacher, &students[1]).unwrap().unwrap();
        assert_eq!(reconciled.source, ProvisionSource::Reconciliation);

        let second = store.reconcile_chat_rooms().unwrap();
        assert_eq!(second.created, 0);
    }

    #[test]
    fn reconcile_ignores_pending_bookings() {
        let fx = Fixture::new(2, 5);
        book(&fx.store, fx.lesson, fx.student, BookingStatus::Pending).unwrap();

        let report = fx.store.reconcile_chat_rooms().unwrap();
        assert_eq!(report.scanned, 0);
        assert!(fx.store.get_chat_room(&fx.teacher, &fx.student).unwrap().is_none());
    }

    #[test]
    fn reconcile_does_not_revive_deleted_rooms() {
        let fx = Fixture::new(2, 5);
        let other = add_user(&fx.store, Role::Student);
        fx.store.add_credits(&other, 5, "seed", None).unwrap();
        book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();
        book(&fx.store, fx.lesson, other, BookingStatus::Active).unwrap();

        fx.store.delete_user(&other).unwrap();
        let room = fx.store.get_chat_room(&fx.teacher, &other).unwrap().unwrap();
        assert!(room.deleted_at.is_some());

        let report = fx.store.reconcile_chat_rooms().unwrap();
        assert_eq!(report.created, 0);
        let room = fx.store.get_chat_room(&fx.teacher, &other).unwrap().unwrap();
        assert!(room.deleted_at.is_some());
    }
}
