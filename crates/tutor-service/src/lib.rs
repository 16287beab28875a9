//! Tutor booking engine HTTP API service.
//!
//! This crate exposes the engine in `tutor-store` over HTTP:
//!
//! - Users and lessons
//! - Credit balances, history, audit and manual top-ups
//! - Booking creation, transitions, refunds and bulk import
//! - Chat rooms, messages and reconciliation
//!
//! # Authentication
//!
//! Reads are open. Every mutating route requires the `x-api-key` header to
//! match the configured service API key.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Axum handlers all return Result and are async by signature.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::unused_async)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
