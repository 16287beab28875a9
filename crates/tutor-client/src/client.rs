//! Tutor HTTP client implementation.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use tutor_core::{
    BookingId, BookingStatus, ChatRoom, ChatRoomId, LessonId, Message, ReconcileReport,
    RefundOutcome, SeatAvailability, UserId,
};

use crate::error::ClientError;
use crate::types::{
    AddCreditsRequest, ApiErrorResponse, BalanceResponse, BookingReceipt, CascadeReport,
    CreateBookingRequest, LedgerEntry, MessagesResponse, PostMessageRequest, RefundRequest,
    TransitionRequest,
};

/// Tutor booking API client.
///
/// Mutating calls carry the service API key; reads are sent without it.
#[derive(Debug, Clone)]
pub struct TutorClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl TutorClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the tutor service (e.g., `"http://tutor:8080"`)
    /// * `api_key` - Service API key for authentication
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
    }

    // =========================================================================
    // Credits
    // =========================================================================

    /// Add credits to a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn add_credits(
        &self,
        user_id: UserId,
        amount: i64,
        reason: impl Into<String>,
    ) -> Result<LedgerEntry, ClientError> {
        let request = AddCreditsRequest {
            amount,
            reason: reason.into(),
            performed_by: None,
        };
        let response = self
            .authed(self.client.post(self.url(&format!("/v1/users/{user_id}/credits"))))
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a user's current balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_balance(&self, user_id: UserId) -> Result<BalanceResponse, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/users/{user_id}/credits")))
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =========================================================================
    // Bookings
    // =========================================================================

    /// Create a booking. `Active` charges the student and opens the chat room.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InsufficientBalance` or `ClientError::CapacityExceeded`
    /// when the activation is refused, or another error if the request fails.
    pub async fn create_booking(
        &self,
        lesson_id: LessonId,
        student_id: UserId,
        status: BookingStatus,
    ) -> Result<BookingReceipt, ClientError> {
        let request = CreateBookingRequest {
            id: None,
            lesson_id,
            student_id,
            status,
        };
        let response = self
            .authed(self.client.post(self.url("/v1/bookings")))
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Move a booking to another status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn transition_booking(
        &self,
        booking_id: BookingId,
        lesson_id: LessonId,
        student_id: UserId,
        status: BookingStatus,
    ) -> Result<BookingReceipt, ClientError> {
        let request = TransitionRequest {
            lesson_id,
            student_id,
            status,
        };
        let response = self
            .authed(
                self.client
                    .post(self.url(&format!("/v1/bookings/{booking_id}/transition"))),
            )
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Refund a booking charge. Repeats return the first refund.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn refund_booking(
        &self,
        booking_id: BookingId,
        student_id: UserId,
        amount: i64,
    ) -> Result<RefundOutcome, ClientError> {
        let request = RefundRequest { student_id, amount };
        let response = self
            .authed(
                self.client
                    .post(self.url(&format!("/v1/bookings/{booking_id}/refund"))),
            )
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Seats taken and free for a lesson.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn seat_availability(
        &self,
        lesson_id: LessonId,
    ) -> Result<SeatAvailability, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/lessons/{lesson_id}/seats")))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Soft-delete a user and everything hanging off it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn delete_user(&self, user_id: UserId) -> Result<CascadeReport, ClientError> {
        let response = self
            .authed(self.client.delete(self.url(&format!("/v1/users/{user_id}"))))
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// The chat room of a teacher/student pair, or `None` if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_chat_room(
        &self,
        teacher_id: UserId,
        student_id: UserId,
    ) -> Result<Option<ChatRoom>, ClientError> {
        let response = self
            .client
            .get(self.url("/v1/chat/rooms"))
            .query(&[
                ("teacher_id", teacher_id.to_string()),
                ("student_id", student_id.to_string()),
            ])
            .send()
            .await?;

        match self.handle_response(response).await {
            Ok(room) => Ok(Some(room)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Post a message to a room.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn post_message(
        &self,
        room_id: ChatRoomId,
        sender_id: UserId,
        body: impl Into<String>,
    ) -> Result<Message, ClientError> {
        let request = PostMessageRequest {
            sender_id,
            body: body.into(),
        };
        let response = self
            .authed(
                self.client
                    .post(self.url(&format!("/v1/chat/rooms/{room_id}/messages"))),
            )
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Messages of a room, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_messages(
        &self,
        room_id: ChatRoomId,
        limit: usize,
    ) -> Result<Vec<Message>, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/chat/rooms/{room_id}/messages")))
            .query(&[("limit", limit)])
            .send()
            .await?;

        let page: MessagesResponse = self.handle_response(response).await?;
        Ok(page.messages)
    }

    /// Trigger a chat room reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ClientError> {
        let response = self
            .authed(self.client.post(self.url("/v1/chat/reconcile")))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        let Ok(api_error) = error_body else {
            return Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            });
        };

        let detail = |name: &str| {
            api_error
                .error
                .details
                .as_ref()
                .and_then(|d| d.get(name))
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0)
        };
        let retryable = api_error
            .error
            .details
            .as_ref()
            .and_then(|d| d.get("retryable"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        tracing::debug!(
            status = status.as_u16(),
            code = %api_error.error.code,
            service = %self.service_name,
            "Tutor API returned an error"
        );

        match api_error.error.code.as_str() {
            "insufficient_balance" => Err(ClientError::InsufficientBalance {
                balance: detail("balance"),
                required: detail("required"),
            }),
            "capacity_exceeded" => Err(ClientError::CapacityExceeded(api_error.error.message)),
            "orphan_reference" => Err(ClientError::OrphanReference(api_error.error.message)),
            "not_found" => Err(ClientError::NotFound(api_error.error.message)),
            "conflict" if retryable => Err(ClientError::Conflict(api_error.error.message)),
            code => Err(ClientError::Api {
                code: code.to_string(),
                message: api_error.error.message,
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}
