//! Column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// User records, keyed by `user_id`.
    pub const USERS: &str = "users";

    /// Lesson records, keyed by `lesson_id`.
    pub const LESSONS: &str = "lessons";

    /// Index: lessons by teacher, keyed by `teacher_id || lesson_id`.
    pub const LESSONS_BY_TEACHER: &str = "lessons_by_teacher";

    /// Booking records, keyed by `booking_id`.
    pub const BOOKINGS: &str = "bookings";

    /// Index: bookings by lesson, keyed by `lesson_id || booking_id`.
    pub const BOOKINGS_BY_LESSON: &str = "bookings_by_lesson";

    /// Index: bookings by student, keyed by `student_id || booking_id`.
    pub const BOOKINGS_BY_STUDENT: &str = "bookings_by_student";

    /// Credit balances, keyed by `user_id`.
    pub const CREDITS: &str = "credits";

    /// Ledger entries, keyed by `transaction_id`.
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: ledger entries by user, keyed by `user_id || sequence`.
    /// Value is the `transaction_id`.
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Refund marker per booking, keyed by `booking_id`.
    /// Value is the refund's `transaction_id`.
    pub const REFUNDS_BY_BOOKING: &str = "refunds_by_booking";

    /// Chat rooms, keyed by `room_id`.
    pub const CHAT_ROOMS: &str = "chat_rooms";

    /// Unique index: one room per pair, keyed by `teacher_id || student_id`.
    /// Value is the `room_id`.
    pub const CHAT_ROOMS_BY_PAIR: &str = "chat_rooms_by_pair";

    /// Index: rooms by participant, keyed by `user_id || room_id`.
    pub const CHAT_ROOMS_BY_USER: &str = "chat_rooms_by_user";

    /// Messages, keyed by `room_id || message_id`.
    pub const MESSAGES: &str = "messages";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::USERS,
        cf::LESSONS,
        cf::LESSONS_BY_TEACHER,
        cf::BOOKINGS,
        cf::BOOKINGS_BY_LESSON,
        cf::BOOKINGS_BY_STUDENT,
        cf::CREDITS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::REFUNDS_BY_BOOKING,
        cf::CHAT_ROOMS,
        cf::CHAT_ROOMS_BY_PAIR,
        cf::CHAT_ROOMS_BY_USER,
        cf::MESSAGES,
    ]
}
