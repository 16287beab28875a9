//! Platform users.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::soft_delete::impl_soft_delete;
use crate::UserId;

/// What a user is allowed to do on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator.
    Admin,
    /// Owns lessons.
    Teacher,
    /// Books lessons and holds credits.
    Student,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
        };
        f.write_str(name)
    }
}

/// A user record. Only `display_name` changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The user ID.
    pub id: UserId,

    /// Role assigned at creation.
    pub role: Role,

    /// Profile name shown in the dashboard.
    pub display_name: String,

    /// When the user was created.
    pub created_at: DateTime<Utc>,

    /// When the profile was last changed.
    pub updated_at: DateTime<Utc>,

    /// Set once the user is soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new live user.
    #[must_use]
    pub fn new(id: UserId, role: Role, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            role,
            display_name: display_name.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_soft_delete!(User);
