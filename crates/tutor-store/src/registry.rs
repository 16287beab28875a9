//! Users and lessons: the rows the engine's scripts hang off.

use tutor_core::{
    Booking, Credit, EngineError, Lesson, LessonId, Role, SeatAvailability, SoftDelete, User,
    UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::rocks::RocksStore;
use crate::schema::cf;

pub(crate) fn create_user(store: &RocksStore, user: &User) -> Result<()> {
    let tx = store.begin();
    let key = keys::user_key(&user.id);

    if tx.lock_raw(cf::USERS, &key)?.is_some() {
        return Err(StoreError::AlreadyExists {
            entity: "user",
            id: user.id.to_string(),
        });
    }

    tx.put_user(user)?;
    tx.put_credit(&Credit::new(user.id))?;
    tx.commit()?;

    tracing::info!(user_id = %user.id, role = %user.role, "User created");
    Ok(())
}

pub(crate) fn rename_user(
    store: &RocksStore,
    user_id: &UserId,
    display_name: &str,
) -> Result<User> {
    let tx = store.begin();
    let mut user = match tx.lock_user(user_id) {
        Ok(user) if user.is_live() => user,
        Ok(_) | Err(StoreError::NotFound { .. }) => {
            return Err(StoreError::orphan("user", user_id))
        }
        Err(e) => return Err(e),
    };

    user.display_name = display_name.to_string();
    user.updated_at = chrono::Utc::now();
    tx.put_user(&user)?;
    tx.commit()?;

    Ok(user)
}

pub(crate) fn create_lesson(store: &RocksStore, lesson: &Lesson) -> Result<()> {
    if lesson.credit_cost <= 0 {
        return Err(EngineError::InvalidAmount(lesson.credit_cost).into());
    }

    let tx = store.begin();
    let teacher = tx.live_user(&lesson.teacher_id)?;
    if teacher.role != Role::Teacher {
        return Err(EngineError::RoleMismatch {
            expected: Role::Teacher,
        }
        .into());
    }

    let key = keys::lesson_key(&lesson.id);
    if tx.lock_raw(cf::LESSONS, &key)?.is_some() {
        return Err(StoreError::AlreadyExists {
            entity: "lesson",
            id: lesson.id.to_string(),
        });
    }

    // Seats are only ever claimed through bookings.
    let mut row = lesson.clone();
    row.current_students = 0;
    tx.put_lesson(&row)?;
    tx.put_raw(
        cf::LESSONS_BY_TEACHER,
        &keys::teacher_lesson_key(&lesson.teacher_id, &lesson.id),
        &[],
    )?;
    tx.commit()?;

    tracing::info!(
        lesson_id = %lesson.id,
        teacher_id = %lesson.teacher_id,
        capacity = lesson.capacity,
        credit_cost = lesson.credit_cost,
        "Lesson created"
    );
    Ok(())
}

pub(crate) fn set_lesson_capacity(
    store: &RocksStore,
    lesson_id: &LessonId,
    capacity: u32,
) -> Result<Lesson> {
    let tx = store.begin();
    let mut lesson = tx.lock_live_lesson(lesson_id)?;
    let previous = lesson.capacity;
    lesson.set_capacity(capacity)?;
    tx.put_lesson(&lesson)?;
    tx.commit()?;

    tracing::info!(
        lesson_id = %lesson_id,
        previous,
        capacity,
        active = lesson.current_students,
        "Lesson capacity changed"
    );
    Ok(lesson)
}

pub(crate) fn seat_availability(
    store: &RocksStore,
    lesson_id: &LessonId,
) -> Result<SeatAvailability> {
    match store.read::<Lesson>(cf::LESSONS, &keys::lesson_key(lesson_id))? {
        Some(lesson) if lesson.is_live() => Ok(SeatAvailability::from(&lesson)),
        _ => Err(StoreError::orphan("lesson", lesson_id)),
    }
}

pub(crate) fn list_lesson_bookings(
    store: &RocksStore,
    lesson_id: &LessonId,
) -> Result<Vec<Booking>> {
    let bookings: Vec<Booking> =
        store.read_children(cf::BOOKINGS_BY_LESSON, lesson_id.as_bytes(), cf::BOOKINGS)?;
    Ok(bookings.into_iter().filter(|b| b.is_live()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rocks::tests::{add_lesson, add_user, book, create_test_store, Fixture};
    use crate::Store;
    use chrono::{Duration, Utc};
    use tutor_core::BookingStatus;

    #[test]
    fn new_user_starts_with_zero_balance() {
        let (store, _dir) = create_test_store();
        let user = add_user(&store, Role::Student);
        let credit = store.get_credit(&user).unwrap().unwrap();
        assert_eq!(credit.balance, 0);
        assert_eq!(credit.sequence, 0);
    }

    #[test]
    fn duplicate_user_is_rejected() {
        let (store, _dir) = create_test_store();
        let user = User::new(UserId::generate(), Role::Admin, "Root");
        store.create_user(&user).unwrap();
        let err = store.create_user(&user).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { entity: "user", .. }));
    }

    #[test]
    fn rename_requires_live_user() {
        let (store, _dir) = create_test_store();
        let user = add_user(&store, Role::Student);
        let renamed = store.rename_user(&user, "Grace").unwrap();
        assert_eq!(renamed.display_name, "Grace");

        store.delete_user(&user).unwrap();
        let err = store.rename_user(&user, "Ghost").unwrap_err();
        assert!(matches!(err, StoreError::OrphanReference { .. }));
    }

    #[test]
    fn lessons_need_a_live_teacher() {
        let (store, _dir) = create_test_store();
        let student = add_user(&store, Role::Student);
        let start = Utc::now() + Duration::days(1);
        let lesson = Lesson::new(
            LessonId::generate(),
            student,
            "Algebra",
            3,
            start,
            start + Duration::hours(1),
        );
        let err = store.create_lesson(&lesson).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Engine(EngineError::RoleMismatch {
                expected: Role::Teacher
            })
        ));

        let orphan = Lesson {
            teacher_id: UserId::generate(),
            ..lesson
        };
        let err = store.create_lesson(&orphan).unwrap_err();
        assert!(matches!(err, StoreError::OrphanReference { entity: "user", .. }));
    }

    #[test]
    fn lesson_price_must_be_positive() {
        let (store, _dir) = create_test_store();
        let teacher = add_user(&store, Role::Teacher);
        let start = Utc::now() + Duration::days(1);
        let mut lesson = Lesson::new(
            LessonId::generate(),
            teacher,
            "Free lunch",
            3,
            start,
            start + Duration::hours(1),
        );
        lesson.credit_cost = 0;
        let err = store.create_lesson(&lesson).unwrap_err();
        assert!(matches!(err, StoreError::Engine(EngineError::InvalidAmount(0))));
    }

    #[test]
    fn capacity_cannot_drop_below_active() {
        let fx = Fixture::new(2, 5);
        book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();
        book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();

        let err = fx.store.set_lesson_capacity(&fx.lesson, 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Engine(EngineError::CapacityBelowActive {
                capacity: 1,
                active: 2
            })
        ));

        let lesson = fx.store.set_lesson_capacity(&fx.lesson, 4).unwrap();
        assert_eq!(lesson.seats_available(), 2);
    }

    #[test]
    fn availability_reflects_bookings() {
        let fx = Fixture::new(3, 5);
        book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();
        book(&fx.store, fx.lesson, fx.student, BookingStatus::Pending).unwrap();

        let seats = fx.store.seat_availability(&fx.lesson).unwrap();
        assert_eq!(seats.capacity, 3);
        assert_eq!(seats.active, 1);
        assert_eq!(seats.available, 2);
        assert_eq!(fx.store.list_lesson_bookings(&fx.lesson).unwrap().len(), 2);

        let other = add_lesson(&fx.store, fx.teacher, 1);
        assert!(fx.store.list_lesson_bookings(&other).unwrap().is_empty());
    }
}
