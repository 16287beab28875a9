//! Credit ledger steps.
//!
//! `add`, `deduct` and `refund` run inside a caller's transaction with the
//! user's credit row locked, so two writers for the same user are serialized
//! and never both pass the balance check.

use tutor_core::{
    BookingId, BookingStatus, CreditTransaction, LedgerAudit, LedgerSummary, OperationType,
    RefundOutcome, SoftDelete, TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::rocks::RocksStore;
use crate::schema::cf;
use crate::tx::EngineTx;
use crate::LedgerEntry;

/// Write the entry and its per-user index row.
fn append(tx: &EngineTx<'_>, entry: &CreditTransaction) -> Result<()> {
    tx.put(cf::TRANSACTIONS, &keys::transaction_key(&entry.id), entry)?;
    tx.put_raw(
        cf::TRANSACTIONS_BY_USER,
        &keys::user_sequence_key(&entry.user_id, entry.sequence),
        &entry.id.to_bytes(),
    )
}

pub(crate) fn add(
    tx: &EngineTx<'_>,
    user_id: &UserId,
    amount: i64,
    reason: &str,
    performed_by: Option<UserId>,
) -> Result<LedgerEntry> {
    let mut credit = tx.lock_credit(user_id)?;
    let balance = credit.balance_after_add(amount, tx.options().max_balance)?;

    let now = chrono::Utc::now();
    let sequence = credit.apply(balance, now);
    let entry = CreditTransaction::add(
        *user_id,
        amount,
        sequence,
        balance,
        reason.to_string(),
        performed_by,
    );

    tx.put_credit(&credit)?;
    append(tx, &entry)?;

    Ok(LedgerEntry {
        balance,
        transaction: entry,
    })
}

pub(crate) fn deduct(
    tx: &EngineTx<'_>,
    user_id: &UserId,
    amount: i64,
    booking_id: &BookingId,
) -> Result<LedgerEntry> {
    let mut credit = tx.lock_credit(user_id)?;
    let balance = credit.balance_after_deduct(amount)?;

    let sequence = credit.apply(balance, chrono::Utc::now());
    let entry = CreditTransaction::deduct(*user_id, amount, sequence, balance, *booking_id);

    tx.put_credit(&credit)?;
    append(tx, &entry)?;

    Ok(LedgerEntry {
        balance,
        transaction: entry,
    })
}

/// Refund a booking charge once. The refund marker is locked after the
/// credit row, so a concurrent second refund waits and then finds it.
pub(crate) fn refund(
    tx: &EngineTx<'_>,
    user_id: &UserId,
    amount: i64,
    booking_id: &BookingId,
) -> Result<RefundOutcome> {
    let mut credit = tx.lock_credit(user_id)?;

    let marker_key = keys::booking_key(booking_id);
    if let Some(raw) = tx.lock_raw(cf::REFUNDS_BY_BOOKING, &marker_key)? {
        let earlier = keys::id_value(&raw)
            .map(TransactionId::from_bytes)
            .ok_or_else(|| StoreError::Database("malformed refund marker".into()))?;
        let transaction: CreditTransaction = tx
            .get(cf::TRANSACTIONS, &keys::transaction_key(&earlier))?
            .ok_or_else(|| StoreError::not_found("transaction", earlier))?;

        tracing::debug!(
            user_id = %user_id,
            booking_id = %booking_id,
            transaction_id = %earlier,
            "Booking already refunded"
        );
        return Ok(RefundOutcome::DuplicateRefund { transaction });
    }

    let balance = credit.balance_after_refund(amount)?;
    let sequence = credit.apply(balance, chrono::Utc::now());
    let entry = CreditTransaction::refund(*user_id, amount, sequence, balance, *booking_id);

    tx.put_credit(&credit)?;
    append(tx, &entry)?;
    tx.put_raw(cf::REFUNDS_BY_BOOKING, &marker_key, &entry.id.to_bytes())?;

    Ok(RefundOutcome::Refunded {
        balance,
        transaction: entry,
    })
}

// =============================================================================
// Standalone operations
// =============================================================================

pub(crate) fn add_credits(
    store: &RocksStore,
    user_id: &UserId,
    amount: i64,
    reason: &str,
    performed_by: Option<UserId>,
) -> Result<LedgerEntry> {
    let tx = store.begin();
    tx.live_user(user_id)?;
    let entry = add(&tx, user_id, amount, reason, performed_by)?;
    tx.commit()?;

    tracing::info!(
        user_id = %user_id,
        amount,
        reason,
        performed_by = ?performed_by,
        new_balance = entry.balance,
        transaction_id = %entry.transaction.id,
        "Credits added"
    );

    Ok(entry)
}

pub(crate) fn refund_credits(
    store: &RocksStore,
    user_id: &UserId,
    amount: i64,
    booking_id: &BookingId,
) -> Result<RefundOutcome> {
    let tx = store.begin();

    let booking = match tx.lock_booking(booking_id) {
        Ok(booking) if booking.is_live() => booking,
        Ok(_) | Err(StoreError::NotFound { .. }) => {
            return Err(StoreError::orphan("booking", booking_id))
        }
        Err(e) => return Err(e),
    };
    if booking.student_id != *user_id {
        return Err(StoreError::BookingMismatch {
            booking_id: booking_id.to_string(),
            field: "student",
        });
    }
    let amount = booking.refundable(amount)?;

    let outcome = refund(&tx, user_id, amount, booking_id)?;
    tx.commit()?;

    if let RefundOutcome::Refunded { balance, transaction } = &outcome {
        tracing::info!(
            user_id = %user_id,
            booking_id = %booking_id,
            amount,
            new_balance = balance,
            transaction_id = %transaction.id,
            "Credits refunded"
        );
    }

    Ok(outcome)
}

// =============================================================================
// Reads
// =============================================================================

fn all_transactions(store: &RocksStore, user_id: &UserId) -> Result<Vec<CreditTransaction>> {
    let mut entries = Vec::new();
    for (_, value) in store.scan_prefix(cf::TRANSACTIONS_BY_USER, &keys::user_key(user_id))? {
        let Some(id) = keys::id_value(&value).map(TransactionId::from_bytes) else {
            tracing::warn!(user_id = %user_id, "Skipping malformed ledger index entry");
            continue;
        };
        if let Some(entry) = store.read(cf::TRANSACTIONS, &keys::transaction_key(&id))? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

pub(crate) fn list_transactions(
    store: &RocksStore,
    user_id: &UserId,
    limit: usize,
    offset: usize,
) -> Result<Vec<CreditTransaction>> {
    let mut entries = all_transactions(store, user_id)?;
    // Index keys sort by sequence; newest first for display.
    entries.reverse();
    Ok(entries.into_iter().skip(offset).take(limit).collect())
}

pub(crate) fn audit(store: &RocksStore, user_id: &UserId) -> Result<LedgerAudit> {
    let credit = store
        .read::<tutor_core::Credit>(cf::CREDITS, &keys::user_key(user_id))?
        .ok_or_else(|| StoreError::not_found("credit", user_id))?;
    let entries = all_transactions(store, user_id)?;

    let audit = LedgerAudit::replay(*user_id, credit.balance, &entries);
    if !audit.is_consistent() {
        tracing::error!(
            user_id = %user_id,
            balance = audit.balance,
            replayed_balance = audit.replayed_balance,
            first_mismatch = ?audit.first_mismatch,
            "Ledger does not reproduce the stored balance"
        );
    }
    Ok(audit)
}

pub(crate) fn summary(store: &RocksStore, user_id: &UserId) -> Result<LedgerSummary> {
    let credit = store
        .read::<tutor_core::Credit>(cf::CREDITS, &keys::user_key(user_id))?
        .ok_or_else(|| StoreError::not_found("credit", user_id))?;

    let mut summary = LedgerSummary {
        balance: credit.balance,
        ..LedgerSummary::default()
    };
    for entry in all_transactions(store, user_id)? {
        match entry.operation_type {
            OperationType::Add => summary.total_added += entry.amount,
            OperationType::Deduct => summary.total_deducted += -entry.amount,
            OperationType::Refund => summary.total_refunded += entry.amount,
        }
    }

    // Deleted bookings stay in the totals above but not in what is committed.
    let bookings: Vec<tutor_core::Booking> =
        store.read_children(cf::BOOKINGS_BY_STUDENT, &keys::user_key(user_id), cf::BOOKINGS)?;
    summary.committed = bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Active && b.is_live())
        .filter_map(|b| b.charged_credits)
        .sum();

    Ok(summary)
}
