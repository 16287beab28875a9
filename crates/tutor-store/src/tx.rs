//! Transaction handle shared by the engine's scripts.

use rocksdb::{MultiThreaded, Transaction, TransactionDB};
use serde::de::DeserializeOwned;
use serde::Serialize;

use tutor_core::{Booking, BookingId, Credit, Lesson, LessonId, SoftDelete, User, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::rocks::{EngineOptions, RocksStore};
use crate::schema::cf;

/// An open pessimistic transaction.
///
/// Dropping it without calling [`EngineTx::commit`] rolls everything back and
/// releases its locks.
pub(crate) struct EngineTx<'db> {
    store: &'db RocksStore,
    txn: Transaction<'db, TransactionDB<MultiThreaded>>,
}

impl<'db> EngineTx<'db> {
    pub(crate) fn new(
        store: &'db RocksStore,
        txn: Transaction<'db, TransactionDB<MultiThreaded>>,
    ) -> Self {
        Self { store, txn }
    }

    pub(crate) const fn options(&self) -> &EngineOptions {
        self.store.options()
    }

    pub(crate) fn commit(self) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Raw access
    // =========================================================================

    /// Read without locking. Sees this transaction's own writes.
    pub(crate) fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.store.cf(cf_name)?;
        Ok(self.txn.get_cf(&cf, key)?)
    }

    /// Read and lock the key until commit. Works for absent keys too, which
    /// is what makes the unique indexes safe under concurrent inserts.
    pub(crate) fn lock_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.store.cf(cf_name)?;
        Ok(self.txn.get_for_update_cf(&cf, key, true)?)
    }

    /// Read under a shared lock: concurrent readers proceed, writers wait.
    pub(crate) fn share_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.store.cf(cf_name)?;
        Ok(self.txn.get_for_update_cf(&cf, key, false)?)
    }

    pub(crate) fn put_raw(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.store.cf(cf_name)?;
        self.txn.put_cf(&cf, key, value)?;
        Ok(())
    }

    pub(crate) fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        self.put_raw(cf_name, key, &RocksStore::serialize(value)?)
    }

    pub(crate) fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        self.get_raw(cf_name, key)?
            .map(|data| RocksStore::deserialize(&data))
            .transpose()
    }

    pub(crate) fn lock<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        self.lock_raw(cf_name, key)?
            .map(|data| RocksStore::deserialize(&data))
            .transpose()
    }

    fn share<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        self.share_raw(cf_name, key)?
            .map(|data| RocksStore::deserialize(&data))
            .transpose()
    }

    /// Keys under `prefix`, as seen by this transaction.
    pub(crate) fn scan_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.store.cf(cf_name)?;
        let iter = self.txn.iterator_cf(
            &cf,
            rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward),
        );

        let mut found = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            found.push(key);
        }
        Ok(found)
    }

    // =========================================================================
    // Typed rows
    // =========================================================================

    /// Lock a lesson row, deleted or not.
    pub(crate) fn lock_lesson(&self, lesson_id: &LessonId) -> Result<Lesson> {
        self.lock(cf::LESSONS, &keys::lesson_key(lesson_id))?
            .ok_or_else(|| StoreError::not_found("lesson", lesson_id))
    }

    /// Lock a lesson row that must still be live.
    pub(crate) fn lock_live_lesson(&self, lesson_id: &LessonId) -> Result<Lesson> {
        match self.lock::<Lesson>(cf::LESSONS, &keys::lesson_key(lesson_id))? {
            Some(lesson) if lesson.is_live() => Ok(lesson),
            _ => Err(StoreError::orphan("lesson", lesson_id)),
        }
    }

    pub(crate) fn put_lesson(&self, lesson: &Lesson) -> Result<()> {
        self.put(cf::LESSONS, &keys::lesson_key(&lesson.id), lesson)
    }

    /// Lock a booking row, deleted or not.
    pub(crate) fn lock_booking(&self, booking_id: &BookingId) -> Result<Booking> {
        self.lock(cf::BOOKINGS, &keys::booking_key(booking_id))?
            .ok_or_else(|| StoreError::not_found("booking", booking_id))
    }

    pub(crate) fn put_booking(&self, booking: &Booking) -> Result<()> {
        self.put(cf::BOOKINGS, &keys::booking_key(&booking.id), booking)
    }

    /// Share-lock a user that must be live, so a concurrent delete waits for us.
    pub(crate) fn live_user(&self, user_id: &UserId) -> Result<User> {
        match self.share::<User>(cf::USERS, &keys::user_key(user_id))? {
            Some(user) if user.is_live() => Ok(user),
            _ => Err(StoreError::orphan("user", user_id)),
        }
    }

    /// Lock a user row, deleted or not.
    pub(crate) fn lock_user(&self, user_id: &UserId) -> Result<User> {
        self.lock(cf::USERS, &keys::user_key(user_id))?
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    pub(crate) fn put_user(&self, user: &User) -> Result<()> {
        self.put(cf::USERS, &keys::user_key(&user.id), user)
    }

    /// Lock a credit row. A user who never held credits starts at zero.
    pub(crate) fn lock_credit(&self, user_id: &UserId) -> Result<Credit> {
        Ok(self
            .lock(cf::CREDITS, &keys::user_key(user_id))?
            .unwrap_or_else(|| Credit::new(*user_id)))
    }

    pub(crate) fn put_credit(&self, credit: &Credit) -> Result<()> {
        self.put(cf::CREDITS, &keys::user_key(&credit.user_id), credit)
    }
}
