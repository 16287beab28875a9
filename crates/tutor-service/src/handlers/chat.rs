//! Chat room and message handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tutor_core::{
    ChatRoom, ChatRoomId, Message, MessageId, ModerationStatus, ReconcileReport, UserId,
};
use tutor_store::Store;

use super::{blocking, parse_id};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

const MAX_MESSAGE_CHARS: usize = 4_000;
const DEFAULT_MESSAGE_PAGE: usize = 100;

/// Pair lookup query.
#[derive(Debug, Deserialize)]
pub struct PairQuery {
    /// Teacher side.
    pub teacher_id: UserId,
    /// Student side.
    pub student_id: UserId,
}

/// Post message request.
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    /// Author; must be a participant of the room.
    pub sender_id: UserId,
    /// Text body.
    pub body: String,
}

/// Message list query.
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Maximum number of messages (default 100).
    pub limit: Option<usize>,
}

/// Message list response.
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    /// Messages, oldest first.
    pub messages: Vec<Message>,
}

/// Moderation request.
#[derive(Debug, Deserialize)]
pub struct ModerateRequest {
    /// New moderation state.
    pub status: ModerationStatus,
}

/// The room for a teacher/student pair.
pub async fn room_for_pair(
    State(state): State<Arc<AppState>>,
    Query(pair): Query<PairQuery>,
) -> Result<Json<ChatRoom>, ApiError> {
    let room = state
        .store
        .get_chat_room(&pair.teacher_id, &pair.student_id)?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "no chat room for teacher {} and student {}",
                pair.teacher_id, pair.student_id
            ))
        })?;
    Ok(Json(room))
}

/// A room by id.
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<ChatRoom>, ApiError> {
    let room_id: ChatRoomId = parse_id(&room_id, "chat room")?;
    let room = state
        .store
        .get_chat_room_by_id(&room_id)?
        .ok_or_else(|| ApiError::NotFound(format!("chat room not found: {room_id}")))?;
    Ok(Json(room))
}

/// Run a reconciliation pass now.
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
) -> Result<Json<ReconcileReport>, ApiError> {
    let report = blocking(&state, |store| store.reconcile_chat_rooms()).await?;

    tracing::info!(
        created = report.created,
        skipped = report.skipped,
        service = %auth.service_name,
        "Reconciliation triggered via API"
    );

    Ok(Json(report))
}

/// Post a message to a live room.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(room_id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let room_id: ChatRoomId = parse_id(&room_id, "chat room")?;
    let text = body.body.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("message body must not be empty".into()));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "message body exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }

    let text = text.to_owned();
    let sender_id = body.sender_id;
    let message =
        blocking(&state, move |store| store.post_message(&room_id, &sender_id, &text)).await?;
    Ok(Json(message))
}

/// Messages of a room, oldest first.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let room_id: ChatRoomId = parse_id(&room_id, "chat room")?;
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_PAGE);
    let messages = state.store.list_messages(&room_id, limit)?;
    Ok(Json(MessagesResponse { messages }))
}

/// Approve or reject a message.
pub async fn moderate_message(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path((room_id, message_id)): Path<(String, String)>,
    Json(body): Json<ModerateRequest>,
) -> Result<Json<Message>, ApiError> {
    let room_id: ChatRoomId = parse_id(&room_id, "chat room")?;
    let message_id: MessageId = parse_id(&message_id, "message")?;
    Ok(Json(
        state
            .store
            .moderate_message(&room_id, &message_id, body.status)?,
    ))
}
