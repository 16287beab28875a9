//! Chat room provisioning and messages.

use tutor_core::{
    ChatRoom, ChatRoomId, Message, MessageId, ModerationStatus, ProvisionOutcome, ProvisionSource,
    SoftDelete, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::rocks::RocksStore;
use crate::schema::cf;
use crate::tx::EngineTx;

fn room_id_from(raw: &[u8]) -> Result<ChatRoomId> {
    keys::id_value(raw)
        .map(ChatRoomId::from_bytes)
        .ok_or_else(|| StoreError::Database("malformed chat pair index".into()))
}

/// Ensure the pair has a room.
///
/// The pair key is locked even when absent, so two transactions provisioning
/// the same pair serialize here and the second one sees the first one's room.
/// A soft-deleted room is reported as suppressed and never replaced.
pub(crate) fn provision(
    tx: &EngineTx<'_>,
    teacher_id: &UserId,
    student_id: &UserId,
    source: ProvisionSource,
) -> Result<ProvisionOutcome> {
    let pair_key = keys::chat_pair_key(teacher_id, student_id);

    if let Some(raw) = tx.lock_raw(cf::CHAT_ROOMS_BY_PAIR, &pair_key)? {
        let room_id = room_id_from(&raw)?;
        let room: ChatRoom = tx
            .get(cf::CHAT_ROOMS, &keys::chat_room_key(&room_id))?
            .ok_or_else(|| StoreError::not_found("chat room", room_id))?;

        return Ok(if room.is_live() {
            ProvisionOutcome::Existing { room_id }
        } else {
            ProvisionOutcome::Suppressed { room_id }
        });
    }

    let room = ChatRoom::new(*teacher_id, *student_id, source);
    tx.put(cf::CHAT_ROOMS, &keys::chat_room_key(&room.id), &room)?;
    tx.put_raw(cf::CHAT_ROOMS_BY_PAIR, &pair_key, room.id.as_bytes())?;
    tx.put_raw(
        cf::CHAT_ROOMS_BY_USER,
        &keys::user_room_key(teacher_id, &room.id),
        &[],
    )?;
    tx.put_raw(
        cf::CHAT_ROOMS_BY_USER,
        &keys::user_room_key(student_id, &room.id),
        &[],
    )?;

    tracing::debug!(
        room_id = %room.id,
        teacher_id = %teacher_id,
        student_id = %student_id,
        source = ?source,
        "Chat room created"
    );

    Ok(ProvisionOutcome::Created { room_id: room.id })
}

pub(crate) fn room_for_pair(
    store: &RocksStore,
    teacher_id: &UserId,
    student_id: &UserId,
) -> Result<Option<ChatRoom>> {
    let cf = store.cf(cf::CHAT_ROOMS_BY_PAIR)?;
    let Some(raw) = store
        .db
        .get_cf(&cf, keys::chat_pair_key(teacher_id, student_id))?
    else {
        return Ok(None);
    };
    let room_id = room_id_from(&raw)?;
    store.read(cf::CHAT_ROOMS, &keys::chat_room_key(&room_id))
}

pub(crate) fn post_message(
    store: &RocksStore,
    room_id: &ChatRoomId,
    sender_id: &UserId,
    body: &str,
) -> Result<Message> {
    let tx = store.begin();

    let room = match tx.lock::<ChatRoom>(cf::CHAT_ROOMS, &keys::chat_room_key(room_id))? {
        Some(room) if room.is_live() => room,
        _ => return Err(StoreError::orphan("chat room", room_id)),
    };
    if !room.has_participant(*sender_id) {
        return Err(StoreError::NotParticipant {
            room_id: room_id.to_string(),
            user_id: sender_id.to_string(),
        });
    }
    tx.live_user(sender_id)?;

    let message = Message::new(*room_id, *sender_id, body);
    tx.put(
        cf::MESSAGES,
        &keys::message_key(room_id, &message.id),
        &message,
    )?;
    tx.commit()?;

    tracing::debug!(
        room_id = %room_id,
        message_id = %message.id,
        sender_id = %sender_id,
        "Message posted"
    );

    Ok(message)
}

pub(crate) fn list_messages(
    store: &RocksStore,
    room_id: &ChatRoomId,
    limit: usize,
) -> Result<Vec<Message>> {
    store
        .scan_prefix(cf::MESSAGES, room_id.as_bytes())?
        .into_iter()
        .take(limit)
        .map(|(_, value)| RocksStore::deserialize(&value))
        .collect()
}

pub(crate) fn moderate_message(
    store: &RocksStore,
    room_id: &ChatRoomId,
    message_id: &MessageId,
    status: ModerationStatus,
) -> Result<Message> {
    let tx = store.begin();
    let key = keys::message_key(room_id, message_id);

    let mut message: Message = tx
        .lock(cf::MESSAGES, &key)?
        .ok_or_else(|| StoreError::not_found("message", message_id))?;
    message.moderation = status;
    tx.put(cf::MESSAGES, &key, &message)?;
    tx.commit()?;

    tracing::info!(
        room_id = %room_id,
        message_id = %message_id,
        moderation = ?status,
        "Message moderated"
    );

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rocks::tests::{add_user, book, create_test_store, Fixture};
    use crate::Store;
    use tutor_core::{BookingStatus, Role};

    #[test]
    fn second_activation_reuses_room() {
        let fx = Fixture::new(2, 5);
        let first = book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();
        let second = book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();

        let first = first.chat.unwrap();
        let second = second.chat.unwrap();
        assert!(first.created());
        assert_eq!(second, ProvisionOutcome::Existing { room_id: first.room_id() });
    }

    #[test]
    fn concurrent_provisioning_creates_one_room() {
        let (store, _dir) = create_test_store();
        let teacher = add_user(&store, Role::Teacher);
        let student = add_user(&store, Role::Student);

        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = &store;
                    scope.spawn(move || {
                        let tx = store.begin();
                        let outcome =
                            provision(&tx, &teacher, &student, ProvisionSource::Reconciliation)?;
                        tx.commit()?;
                        Ok::<_, StoreError>(outcome)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let outcomes: Vec<_> = outcomes.into_iter().map(Result::unwrap).collect();
        assert_eq!(outcomes.iter().filter(|o| o.created()).count(), 1);
        let room_id = outcomes[0].room_id();
        assert!(outcomes.iter().all(|o| o.room_id() == room_id));
    }

    #[test]
    fn participants_can_post_and_outsiders_cannot() {
        let fx = Fixture::new(1, 5);
        let receipt = book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();
        let room_id = receipt.chat.unwrap().room_id();

        fx.store.post_message(&room_id, &fx.student, "Hello").unwrap();
        fx.store.post_message(&room_id, &fx.teacher, "Welcome").unwrap();

        let outsider = add_user(&fx.store, Role::Student);
        let err = fx.store.post_message(&room_id, &outsider, "Hi").unwrap_err();
        assert!(matches!(err, StoreError::NotParticipant { .. }));

        let messages = fx.store.list_messages(&room_id, 10).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.body == "Hello"));
        assert!(messages
            .iter()
            .all(|m| m.moderation == ModerationStatus::Pending));
    }

    #[test]
    fn moderation_updates_status() {
        let fx = Fixture::new(1, 5);
        let receipt = book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();
        let room_id = receipt.chat.unwrap().room_id();
        let message = fx.store.post_message(&room_id, &fx.student, "Hello").unwrap();

        let moderated = fx
            .store
            .moderate_message(&room_id, &message.id, ModerationStatus::Rejected)
            .unwrap();
        assert_eq!(moderated.moderation, ModerationStatus::Rejected);

        let err = fx
            .store
            .moderate_message(&room_id, &MessageId::generate(), ModerationStatus::Approved)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "message", .. }));
    }

    #[test]
    fn deleted_room_rejects_messages_and_stays_deleted() {
        let fx = Fixture::new(2, 5);
        let receipt = book(&fx.store, fx.lesson, fx.student, BookingStatus::Active).unwrap();
        let room_id = receipt.chat.unwrap().room_id();

        fx.store.delete_user(&fx.teacher).unwrap();

        let err = fx.store.post_message(&room_id, &fx.student, "Hi").unwrap_err();
        assert!(matches!(err, StoreError::OrphanReference { entity: "chat room", .. }));

        // Provisioning the same pair again reports the deleted room.
        let tx = fx.store.begin();
        let outcome = provision(&tx, &fx.teacher, &fx.student, ProvisionSource::Reconciliation)
            .unwrap();
        assert_eq!(outcome, ProvisionOutcome::Suppressed { room_id });
    }
}
