//! Key encoding utilities for `RocksDB`.
//!
//! Entity keys are the 16 raw id bytes. Index keys concatenate the parent id
//! with the child id so a prefix scan over the parent lists its children.

use tutor_core::{BookingId, ChatRoomId, LessonId, MessageId, TransactionId, UserId};

/// Length of every id in a key.
pub const ID_LEN: usize = 16;

fn concat(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}

/// Key for a user row (also used for the user's credit row).
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Key for a lesson row.
#[must_use]
pub fn lesson_key(lesson_id: &LessonId) -> Vec<u8> {
    lesson_id.as_bytes().to_vec()
}

/// Key for a booking row.
#[must_use]
pub fn booking_key(booking_id: &BookingId) -> Vec<u8> {
    booking_id.as_bytes().to_vec()
}

/// Key for a ledger entry.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Key for a chat room row.
#[must_use]
pub fn chat_room_key(room_id: &ChatRoomId) -> Vec<u8> {
    room_id.as_bytes().to_vec()
}

/// Index key `teacher_id || lesson_id`.
#[must_use]
pub fn teacher_lesson_key(teacher_id: &UserId, lesson_id: &LessonId) -> Vec<u8> {
    concat(teacher_id.as_bytes(), lesson_id.as_bytes())
}

/// Index key `lesson_id || booking_id`.
#[must_use]
pub fn lesson_booking_key(lesson_id: &LessonId, booking_id: &BookingId) -> Vec<u8> {
    concat(lesson_id.as_bytes(), booking_id.as_bytes())
}

/// Index key `student_id || booking_id`.
#[must_use]
pub fn student_booking_key(student_id: &UserId, booking_id: &BookingId) -> Vec<u8> {
    concat(student_id.as_bytes(), booking_id.as_bytes())
}

/// Index key `user_id || sequence` (big-endian, so keys sort by sequence).
#[must_use]
pub fn user_sequence_key(user_id: &UserId, sequence: u64) -> Vec<u8> {
    concat(user_id.as_bytes(), &sequence.to_be_bytes())
}

/// Unique key for a teacher/student pair.
#[must_use]
pub fn chat_pair_key(teacher_id: &UserId, student_id: &UserId) -> Vec<u8> {
    concat(teacher_id.as_bytes(), student_id.as_bytes())
}

/// Index key `user_id || room_id`.
#[must_use]
pub fn user_room_key(user_id: &UserId, room_id: &ChatRoomId) -> Vec<u8> {
    concat(user_id.as_bytes(), room_id.as_bytes())
}

/// Key `room_id || message_id`.
#[must_use]
pub fn message_key(room_id: &ChatRoomId, message_id: &MessageId) -> Vec<u8> {
    concat(room_id.as_bytes(), &message_id.to_bytes())
}

/// The 16 id bytes that follow the parent prefix of an index key.
#[must_use]
pub fn child_id(key: &[u8]) -> Option<[u8; ID_LEN]> {
    key.get(ID_LEN..2 * ID_LEN)?.try_into().ok()
}

/// Read a 16-byte id stored as an index value.
#[must_use]
pub fn id_value(value: &[u8]) -> Option<[u8; ID_LEN]> {
    value.try_into().ok()
}
