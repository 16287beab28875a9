//! Logical deletion shared by every entity the engine reasons about.

use chrono::{DateTime, Utc};

/// A row that is never physically removed, only stamped as deleted.
///
/// Every decision the engine makes filters on [`SoftDelete::is_live`];
/// deleted rows remain readable for audit.
pub trait SoftDelete {
    /// When the row was deleted, if it was.
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    /// Stamp the row as deleted. Already-deleted rows keep their first stamp.
    fn mark_deleted(&mut self, at: DateTime<Utc>);

    /// Whether the row still takes part in engine decisions.
    fn is_live(&self) -> bool {
        self.deleted_at().is_none()
    }
}

/// Implements [`SoftDelete`] for a struct with `deleted_at` and `updated_at`.
macro_rules! impl_soft_delete {
    ($ty:ty) => {
        impl $crate::soft_delete::SoftDelete for $ty {
            fn deleted_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
                self.deleted_at
            }

            fn mark_deleted(&mut self, at: chrono::DateTime<chrono::Utc>) {
                if self.deleted_at.is_none() {
                    self.deleted_at = Some(at);
                    self.updated_at = at;
                }
            }
        }
    };
}

pub(crate) use impl_soft_delete;
