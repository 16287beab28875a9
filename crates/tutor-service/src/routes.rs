//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{bookings, chat, credits, health, lessons, users};
use crate::state::AppState;

/// Maximum concurrent requests for API endpoints.
///
/// Handlers hold row locks while they run, so this also bounds lock contention.
const API_MAX_CONCURRENT_REQUESTS: usize = 64;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Users
/// - `POST /v1/users` - Register a user (auth)
/// - `GET /v1/users/:id` - Get a user
/// - `PATCH /v1/users/:id` - Change display name (auth)
/// - `DELETE /v1/users/:id` - Soft-delete with cascade (auth)
///
/// ## Credits
/// - `GET /v1/users/:id/credits` - Current balance
/// - `POST /v1/users/:id/credits` - Add credits (auth)
/// - `GET /v1/users/:id/transactions` - Ledger history
/// - `GET /v1/users/:id/ledger/audit` - Replay check
/// - `GET /v1/users/:id/ledger/summary` - Lifetime totals
///
/// ## Lessons
/// - `POST /v1/lessons` - Create a lesson (auth)
/// - `GET /v1/lessons/:id` - Get a lesson
/// - `DELETE /v1/lessons/:id` - Soft-delete with cascade (auth)
/// - `PUT /v1/lessons/:id/capacity` - Change capacity (auth)
/// - `GET /v1/lessons/:id/seats` - Seat availability
/// - `GET /v1/lessons/:id/bookings` - Live bookings
///
/// ## Bookings
/// - `POST /v1/bookings` - Create (auth)
/// - `POST /v1/bookings/import` - Bulk import without chat (auth)
/// - `POST /v1/bookings/complete-finished` - Completion sweep (auth)
/// - `GET /v1/bookings/:id` - Get a booking
/// - `DELETE /v1/bookings/:id` - Soft-delete (auth)
/// - `POST /v1/bookings/:id/transition` - Change status (auth)
/// - `POST /v1/bookings/:id/refund` - Standalone refund (auth)
///
/// ## Chat
/// - `GET /v1/chat/rooms?teacher_id=&student_id=` - Room for a pair
/// - `GET /v1/chat/rooms/:id` - Room by id
/// - `POST /v1/chat/reconcile` - Reconciliation pass (auth)
/// - `GET /v1/chat/rooms/:id/messages` - List messages
/// - `POST /v1/chat/rooms/:id/messages` - Post a message (auth)
/// - `POST /v1/chat/rooms/:id/messages/:message_id/moderation` - Moderate (auth)
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let api_routes = Router::new()
        // Users
        .route("/users", post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::rename_user)
                .delete(users::delete_user),
        )
        // Credits
        .route(
            "/users/:id/credits",
            get(credits::get_balance).post(credits::add_credits),
        )
        .route("/users/:id/transactions", get(credits::list_transactions))
        .route("/users/:id/ledger/audit", get(credits::audit))
        .route("/users/:id/ledger/summary", get(credits::summary))
        // Lessons
        .route("/lessons", post(lessons::create_lesson))
        .route(
            "/lessons/:id",
            get(lessons::get_lesson).delete(lessons::delete_lesson),
        )
        .route(
            "/lessons/:id/capacity",
            axum::routing::put(lessons::set_capacity),
        )
        .route("/lessons/:id/seats", get(lessons::seat_availability))
        .route("/lessons/:id/bookings", get(lessons::list_bookings))
        // Bookings
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/import", post(bookings::import_bookings))
        .route(
            "/bookings/complete-finished",
            post(bookings::complete_finished),
        )
        .route(
            "/bookings/:id",
            get(bookings::get_booking).delete(bookings::delete_booking),
        )
        .route(
            "/bookings/:id/transition",
            post(bookings::transition_booking),
        )
        .route("/bookings/:id/refund", post(bookings::refund_booking))
        // Chat
        .route("/chat/rooms", get(chat::room_for_pair))
        .route("/chat/rooms/:id", get(chat::get_room))
        .route("/chat/reconcile", post(chat::reconcile))
        .route(
            "/chat/rooms/:id/messages",
            get(chat::list_messages).post(chat::post_message),
        )
        .route(
            "/chat/rooms/:id/messages/:message_id/moderation",
            post(chat::moderate_message),
        )
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(origins)
    }
}
