//! Credit balances and the append-only ledger.
//!
//! A [`Credit`] row holds the authoritative balance. Every change to it
//! appends a [`CreditTransaction`] carrying the signed amount and the balance
//! after the change, so the balance can be rebuilt by replaying the log.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::{BookingId, TransactionId, UserId};

/// Default ceiling for a single user's balance.
pub const DEFAULT_MAX_BALANCE: i64 = 10_000;

/// A user's credit balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credit {
    /// Owner of the balance.
    pub user_id: UserId,

    /// Current balance. Never negative; `add` keeps it at or below `max_balance`.
    pub balance: i64,

    /// Number of ledger entries applied. Orders the transaction log.
    pub sequence: u64,

    /// When the row was created.
    pub created_at: DateTime<Utc>,

    /// When the balance last changed.
    pub updated_at: DateTime<Utc>,
}

impl Credit {
    /// A zero balance for a new user.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance after adding `amount`, checked against `max_balance`.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` for non-positive amounts, `BalanceCeilingExceeded`
    /// if the result would exceed `max_balance`.
    pub fn balance_after_add(&self, amount: i64, max_balance: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(EngineError::InvalidAmount(amount));
        }
        match self.balance.checked_add(amount) {
            Some(next) if next <= max_balance => Ok(next),
            _ => Err(EngineError::BalanceCeilingExceeded {
                balance: self.balance,
                amount,
                max: max_balance,
            }),
        }
    }

    /// Balance after returning a previously deducted `amount`.
    ///
    /// No ceiling applies: the credits were on the balance before.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` for non-positive amounts or on overflow.
    pub fn balance_after_refund(&self, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(EngineError::InvalidAmount(amount));
        }
        self.balance
            .checked_add(amount)
            .ok_or(EngineError::InvalidAmount(amount))
    }

    /// Balance after deducting `amount`.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` for non-positive amounts, `InsufficientBalance` if the
    /// result would be negative.
    pub fn balance_after_deduct(&self, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(EngineError::InvalidAmount(amount));
        }
        if self.balance < amount {
            return Err(EngineError::InsufficientBalance {
                balance: self.balance,
                required: amount,
            });
        }
        Ok(self.balance - amount)
    }

    /// Move the balance to `balance` and claim the next ledger sequence.
    pub fn apply(&mut self, balance: i64, at: DateTime<Utc>) -> u64 {
        self.balance = balance;
        self.sequence += 1;
        self.updated_at = at;
        self.sequence
    }
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Purchase or administrative grant.
    Add,
    /// Charge for an activated booking.
    Deduct,
    /// Return of a booking charge.
    Refund,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Deduct => "deduct",
            Self::Refund => "refund",
        };
        f.write_str(name)
    }
}

/// An append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID.
    pub id: TransactionId,

    /// The user whose balance changed.
    pub user_id: UserId,

    /// Position in the user's ledger, starting at 1.
    pub sequence: u64,

    /// Signed amount. Negative for deductions.
    pub amount: i64,

    /// Kind of entry.
    pub operation_type: OperationType,

    /// Booking that caused the entry, for deductions and refunds.
    pub booking_id: Option<BookingId>,

    /// Balance right after this entry was applied.
    pub balance_after: i64,

    /// Free-form reason supplied by the caller.
    pub reason: String,

    /// Who requested the change, when known.
    pub performed_by: Option<UserId>,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// An `add` entry.
    #[must_use]
    pub fn add(
        user_id: UserId,
        amount: i64,
        sequence: u64,
        balance_after: i64,
        reason: String,
        performed_by: Option<UserId>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            sequence,
            amount,
            operation_type: OperationType::Add,
            booking_id: None,
            balance_after,
            reason,
            performed_by,
            created_at: Utc::now(),
        }
    }

    /// A `deduct` entry. The stored amount is always negative.
    #[must_use]
    pub fn deduct(
        user_id: UserId,
        amount: i64,
        sequence: u64,
        balance_after: i64,
        booking_id: BookingId,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            sequence,
            amount: -amount.abs(),
            operation_type: OperationType::Deduct,
            booking_id: Some(booking_id),
            balance_after,
            reason: format!("Booking {booking_id} activated"),
            performed_by: None,
            created_at: Utc::now(),
        }
    }

    /// A `refund` entry.
    #[must_use]
    pub fn refund(
        user_id: UserId,
        amount: i64,
        sequence: u64,
        balance_after: i64,
        booking_id: BookingId,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            sequence,
            amount: amount.abs(),
            operation_type: OperationType::Refund,
            booking_id: Some(booking_id),
            balance_after,
            reason: format!("Booking {booking_id} refunded"),
            performed_by: None,
            created_at: Utc::now(),
        }
    }
}

/// Result of a refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefundOutcome {
    /// A new refund entry was written.
    Refunded {
        /// Balance after the refund.
        balance: i64,
        /// The new ledger entry.
        transaction: CreditTransaction,
    },
    /// The booking had already been refunded; nothing changed.
    DuplicateRefund {
        /// The earlier refund entry.
        transaction: CreditTransaction,
    },
}

impl RefundOutcome {
    /// The ledger entry this outcome refers to.
    #[must_use]
    pub const fn transaction(&self) -> &CreditTransaction {
        match self {
            Self::Refunded { transaction, .. } | Self::DuplicateRefund { transaction } => {
                transaction
            }
        }
    }
}

/// Result of replaying a user's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    /// Audited user.
    pub user_id: UserId,
    /// Stored balance.
    pub balance: i64,
    /// Sum of all transaction amounts.
    pub replayed_balance: i64,
    /// Number of transactions replayed.
    pub transactions: usize,
    /// First sequence whose `balance_after` disagrees with the running sum.
    pub first_mismatch: Option<u64>,
}

impl LedgerAudit {
    /// Replay `transactions` (in any order) against the stored `balance`.
    #[must_use]
    pub fn replay(user_id: UserId, balance: i64, transactions: &[CreditTransaction]) -> Self {
        let mut ordered: Vec<&CreditTransaction> = transactions.iter().collect();
        ordered.sort_by_key(|tx| tx.sequence);

        let mut running = 0i64;
        let mut first_mismatch = None;
        for tx in &ordered {
            running += tx.amount;
            if first_mismatch.is_none() && (running != tx.balance_after || running < 0) {
                first_mismatch = Some(tx.sequence);
            }
        }

        Self {
            user_id,
            balance,
            replayed_balance: running,
            transactions: ordered.len(),
            first_mismatch,
        }
    }

    /// Whether the log reproduces the stored balance exactly.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.balance == self.replayed_balance && self.first_mismatch.is_none()
    }
}

/// Aggregate view of a user's ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Current balance.
    pub balance: i64,
    /// Sum of all `add` entries.
    pub total_added: i64,
    /// Sum of all `deduct` entries, as a positive number.
    pub total_deducted: i64,
    /// Sum of all `refund` entries.
    pub total_refunded: i64,
    /// Credits charged to bookings that are still active and not deleted.
    pub committed: i64,
}
