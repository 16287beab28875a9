//! Chat rooms between a teacher and a student, and their messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::soft_delete::impl_soft_delete;
use crate::{ChatRoomId, MessageId, UserId};

/// How a room came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionSource {
    /// Created inline with a booking activation.
    Activation,
    /// Created by the reconciliation pass.
    Reconciliation,
}

/// The single channel between one teacher and one student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    /// The room ID handed to the messaging UI.
    pub id: ChatRoomId,

    /// Teacher side of the pair.
    pub teacher_id: UserId,

    /// Student side of the pair.
    pub student_id: UserId,

    /// Path that created the room.
    pub source: ProvisionSource,

    /// When the room was created.
    pub created_at: DateTime<Utc>,

    /// When the room last changed.
    pub updated_at: DateTime<Utc>,

    /// Set once the room is soft-deleted. Deleted rooms are never revived.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ChatRoom {
    /// A new room for the pair.
    #[must_use]
    pub fn new(teacher_id: UserId, student_id: UserId, source: ProvisionSource) -> Self {
        let now = Utc::now();
        Self {
            id: ChatRoomId::generate(),
            teacher_id,
            student_id,
            source,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether `user_id` is one of the two participants.
    #[must_use]
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.teacher_id == user_id || self.student_id == user_id
    }
}

impl_soft_delete!(ChatRoom);

/// What the provisioner did for a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// A new room was created.
    Created {
        /// The new room.
        room_id: ChatRoomId,
    },
    /// A live room already existed.
    Existing {
        /// The existing room.
        room_id: ChatRoomId,
    },
    /// A room existed but was deleted; it stays deleted.
    Suppressed {
        /// The deleted room.
        room_id: ChatRoomId,
    },
}

impl ProvisionOutcome {
    /// The room the outcome refers to.
    #[must_use]
    pub const fn room_id(&self) -> ChatRoomId {
        match self {
            Self::Created { room_id } | Self::Existing { room_id } | Self::Suppressed { room_id } => {
                *room_id
            }
        }
    }

    /// Whether a room was created.
    #[must_use]
    pub const fn created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// Counts reported by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Distinct teacher/student pairs examined.
    pub scanned: usize,
    /// Rooms created by this pass.
    pub created: usize,
    /// Pairs that failed and were left for the next pass.
    pub skipped: usize,
}

/// Moderation state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    /// Awaiting review.
    Pending,
    /// Visible to both participants.
    Approved,
    /// Hidden.
    Rejected,
}

/// A message posted in a chat room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message ID. Orders messages within a room.
    pub id: MessageId,

    /// Room the message belongs to.
    pub room_id: ChatRoomId,

    /// Author. Always one of the room's participants.
    pub sender_id: UserId,

    /// Text body.
    pub body: String,

    /// Moderation state.
    pub moderation: ModerationStatus,

    /// When the message was posted.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A new message awaiting moderation.
    #[must_use]
    pub fn new(room_id: ChatRoomId, sender_id: UserId, body: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            room_id,
            sender_id,
            body: body.into(),
            moderation: ModerationStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_knows_its_participants() {
        let teacher = UserId::generate();
        let student = UserId::generate();
        let room = ChatRoom::new(teacher, student, ProvisionSource::Activation);
        assert!(room.has_participant(teacher));
        assert!(room.has_participant(student));
        assert!(!room.has_participant(UserId::generate()));
    }

    #[test]
    fn only_creation_counts_as_created() {
        let room_id = ChatRoomId::generate();
        assert!(ProvisionOutcome::Created { room_id }.created());
        assert!(!ProvisionOutcome::Existing { room_id }.created());
        assert!(!ProvisionOutcome::Suppressed { room_id }.created());
    }
}
