//! `RocksDB` storage implementation.
//!
//! This module provides `RocksStore`, the `Store` implementation backed by a
//! pessimistic `TransactionDB`. The transaction scripts live in the sibling
//! modules; this file owns the handle, the codec and committed reads.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, MultiThreaded, Options,
    TransactionDB, TransactionDBOptions, TransactionOptions, WriteOptions,
};

use tutor_core::{
    Booking, BookingId, ChatRoom, ChatRoomId, Credit, CreditTransaction, LedgerAudit,
    LedgerSummary, Lesson, LessonId, Message, MessageId, ModerationStatus, ReconcileReport,
    RefundOutcome, SeatAvailability, User, UserId, DEFAULT_MAX_BALANCE,
};

use crate::error::{Result, StoreError};
use crate::schema::{all_column_families, cf};
use crate::tx::EngineTx;
use crate::{
    booking, cascade, chat, keys, ledger, reconcile, registry, BookingReceipt, CascadeReport,
    LedgerEntry, NewBooking, Store, TransitionRequest,
};

/// Engine limits and locking knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Highest balance a user may hold.
    pub max_balance: i64,

    /// How long a transaction waits for a row lock, in milliseconds.
    pub lock_timeout_ms: i64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_balance: DEFAULT_MAX_BALANCE,
            lock_timeout_ms: 2_000,
        }
    }
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    pub(crate) db: Arc<TransactionDB<MultiThreaded>>,
    options: EngineOptions,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, EngineOptions::default())
    }

    /// Open or create a `RocksDB` database with explicit engine options.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open_with<P: AsRef<Path>>(path: P, options: EngineOptions) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(options.lock_timeout_ms);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = TransactionDB::open_cf_descriptors(&opts, &txn_db_opts, path, cf_descriptors)?;

        tracing::debug!(
            max_balance = options.max_balance,
            lock_timeout_ms = options.lock_timeout_ms,
            "Opened transactional store"
        );

        Ok(Self {
            db: Arc::new(db),
            options,
        })
    }

    /// The options the store was opened with.
    #[must_use]
    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Get a column family handle.
    pub(crate) fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Start a transaction with deadlock detection and the configured lock timeout.
    pub(crate) fn begin(&self) -> EngineTx<'_> {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_deadlock_detect(true);
        txn_opts.set_lock_timeout(self.options.lock_timeout_ms);

        let txn = self.db.transaction_opt(&WriteOptions::default(), &txn_opts);
        EngineTx::new(self, txn)
    }

    /// Serialize a value using CBOR.
    pub(crate) fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read a committed value outside any transaction.
    pub(crate) fn read<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Committed `(key, value)` pairs whose key starts with `prefix`.
    pub(crate) fn scan_prefix(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Resolve index entries whose trailing 16 bytes name a row in `target_cf`.
    pub(crate) fn read_children<T: serde::de::DeserializeOwned>(
        &self,
        index_cf: &str,
        parent: &[u8],
        target_cf: &str,
    ) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for (key, _) in self.scan_prefix(index_cf, parent)? {
            let Some(child) = keys::child_id(&key) else {
                tracing::warn!(index = index_cf, "Skipping malformed index key");
                continue;
            };
            if let Some(row) = self.read(target_cf, &child)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Users
    // =========================================================================

    fn create_user(&self, user: &User) -> Result<()> {
        registry::create_user(self, user)
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        self.read(cf::USERS, &keys::user_key(user_id))
    }

    fn rename_user(&self, user_id: &UserId, display_name: &str) -> Result<User> {
        registry::rename_user(self, user_id, display_name)
    }

    fn delete_user(&self, user_id: &UserId) -> Result<CascadeReport> {
        cascade::delete_user(self, user_id)
    }

    // =========================================================================
    // Lessons
    // =========================================================================

    fn create_lesson(&self, lesson: &Lesson) -> Result<()> {
        registry::create_lesson(self, lesson)
    }

    fn get_lesson(&self, lesson_id: &LessonId) -> Result<Option<Lesson>> {
        self.read(cf::LESSONS, &keys::lesson_key(lesson_id))
    }

    fn set_lesson_capacity(&self, lesson_id: &LessonId, capacity: u32) -> Result<Lesson> {
        registry::set_lesson_capacity(self, lesson_id, capacity)
    }

    fn seat_availability(&self, lesson_id: &LessonId) -> Result<SeatAvailability> {
        registry::seat_availability(self, lesson_id)
    }

    fn list_lesson_bookings(&self, lesson_id: &LessonId) -> Result<Vec<Booking>> {
        registry::list_lesson_bookings(self, lesson_id)
    }

    fn delete_lesson(&self, lesson_id: &LessonId) -> Result<CascadeReport> {
        cascade::delete_lesson(self, lesson_id)
    }

    // =========================================================================
    // Bookings
    // =========================================================================

    fn create_booking(&self, new: &NewBooking) -> Result<BookingReceipt> {
        booking::create(self, new)
    }

    fn get_booking(&self, booking_id: &BookingId) -> Result<Option<Booking>> {
        self.read(cf::BOOKINGS, &keys::booking_key(booking_id))
    }

    fn transition_booking(&self, request: &TransitionRequest) -> Result<BookingReceipt> {
        booking::transition(self, request)
    }

    fn import_bookings(&self, bookings: &[NewBooking]) -> Result<Vec<Booking>> {
        booking::import(self, bookings)
    }

    fn complete_finished_bookings(&self, now: DateTime<Utc>) -> Result<usize> {
        booking::complete_finished(self, now)
    }

    fn delete_booking(&self, booking_id: &BookingId) -> Result<CascadeReport> {
        cascade::delete_booking(self, booking_id)
    }

    // =========================================================================
    // Credits
    // =========================================================================

    fn get_credit(&self, user_id: &UserId) -> Result<Option<Credit>> {
        self.read(cf::CREDITS, &keys::user_key(user_id))
    }

    fn add_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        reason: &str,
        performed_by: Option<UserId>,
    ) -> Result<LedgerEntry> {
        ledger::add_credits(self, user_id, amount, reason, performed_by)
    }

    fn refund_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        booking_id: &BookingId,
    ) -> Result<RefundOutcome> {
        ledger::refund_credits(self, user_id, amount, booking_id)
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        ledger::list_transactions(self, user_id, limit, offset)
    }

    fn audit_ledger(&self, user_id: &UserId) -> Result<LedgerAudit> {
        ledger::audit(self, user_id)
    }

    fn ledger_summary(&self, user_id: &UserId) -> Result<LedgerSummary> {
        ledger::summary(self, user_id)
    }

    // =========================================================================
    // Chat
    // =========================================================================

    fn get_chat_room(&self, teacher_id: &UserId, student_id: &UserId) -> Result<Option<ChatRoom>> {
        chat::room_for_pair(self, teacher_id, student_id)
    }

    fn get_chat_room_by_id(&self, room_id: &ChatRoomId) -> Result<Option<ChatRoom>> {
        self.read(cf::CHAT_ROOMS, &keys::chat_room_key(room_id))
    }

    fn reconcile_chat_rooms(&self) -> Result<ReconcileReport> {
        reconcile::run(self)
    }

    fn post_message(
        &self,
        room_id: &ChatRoomId,
        sender_id: &UserId,
        body: &str,
    ) -> Result<Message> {
        chat::post_message(self, room_id, sender_id, body)
    }

    fn list_messages(&self, room_id: &ChatRoomId, limit: usize) -> Result<Vec<Message>> {
        chat::list_messages(self, room_id, limit)
    }

    fn moderate_message(
        &self,
        room_id: &ChatRoomId,
        message_id: &MessageId,
        status: ModerationStatus,
    ) -> Result<Message> {
        chat::moderate_message(self, room_id, message_id, status)
    }
}
