//! Error types for tutor storage.

use tutor_core::EngineError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
///
/// Every variant is raised before the enclosing transaction commits, so the
/// caller never has to undo a partial write.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A row lock could not be acquired in time, or a deadlock was broken.
    /// The transaction was rolled back and can be retried.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Requested ID.
        id: String,
    },

    /// The request references a parent row that is missing or soft-deleted.
    #[error("orphan reference: {entity} {id} is missing or deleted")]
    OrphanReference {
        /// Kind of parent record.
        entity: &'static str,
        /// Referenced ID.
        id: String,
    },

    /// The request's lesson or student does not match the stored booking.
    #[error("booking {booking_id} does not match the supplied {field}")]
    BookingMismatch {
        /// The booking in question.
        booking_id: String,
        /// Field that disagreed.
        field: &'static str,
    },

    /// The user is not one of the chat room's participants.
    #[error("user {user_id} is not a participant of room {room_id}")]
    NotParticipant {
        /// The room.
        room_id: String,
        /// The outsider.
        user_id: String,
    },

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Conflicting ID.
        id: String,
    },

    /// An engine invariant rejected the request.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn orphan(entity: &'static str, id: impl ToString) -> Self {
        Self::OrphanReference {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;

        match err.kind() {
            ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
                Self::Conflict(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}
