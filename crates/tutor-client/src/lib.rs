//! Tutor Client SDK.
//!
//! Client library for services that book lessons, move credits and read chat
//! rooms through the tutor booking API.
//!
//! # Example
//!
//! ```no_run
//! use tutor_client::{BookingStatus, TutorClient};
//!
//! # async fn example(
//! #     lesson_id: tutor_client::LessonId,
//! #     student_id: tutor_client::UserId,
//! # ) -> Result<(), tutor_client::ClientError> {
//! let client = TutorClient::new("http://tutor:8080", "your-service-api-key")?;
//!
//! let receipt = client
//!     .create_booking(lesson_id, student_id, BookingStatus::Active)
//!     .await?;
//!
//! println!("Booking {} is {}", receipt.booking.id, receipt.booking.status);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, TutorClient};
pub use error::ClientError;
pub use types::*;

pub use tutor_core::{
    Booking, BookingId, BookingStatus, ChatRoom, ChatRoomId, CreditTransaction, LessonId,
    Message, ProvisionOutcome, ReconcileReport, RefundOutcome, SeatAvailability, UserId,
};
