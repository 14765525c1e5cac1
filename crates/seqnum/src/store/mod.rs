//! The record store consumed by the order creator.
//!
//! [`OrderStore`] is the seam between the numbering algorithm and whatever
//! holds the rows. A store must provide:
//!
//! - transactional inserts whose identities are assigned at commit time, and
//! - a single locked statement ([`OrderStore::assign_number`]) that takes an
//!   exclusive scope covering at least the day's numeric range, evaluates a
//!   [`NumberAllocator`] against the committed siblings and writes the result
//!   before releasing the scope.
//!
//! [`MemoryStore`] is the in-process implementation used by the driver binary,
//! the tests and the benchmarks.

mod lock;
mod memory;

use core::{fmt, future::Future};

use chrono::{DateTime, Utc};

pub use lock::*;
pub use memory::*;

use crate::{
    allocator::NumberAllocator,
    error::Result,
    number::{DayRange, OrderNumber},
};

/// Store-assigned identity of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct OrderId(u64);

impl OrderId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A committed order row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    /// Zero until the numbering statement has run.
    pub number: OrderNumber,
}

/// The values of a row about to be inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub created_at: DateTime<Utc>,
}

/// An open insert transaction.
///
/// Rows staged with [`StoreTransaction::insert`] become visible, and receive
/// their identity, only when [`StoreTransaction::commit`] succeeds. Dropping
/// the transaction without committing discards them.
pub trait StoreTransaction: Send {
    /// Stages a row with `number = 0`.
    fn insert(&mut self, order: NewOrder);

    /// Commits the staged rows and returns them in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionFailed`] or [`Error::StoreUnavailable`]; in
    /// both cases nothing is persisted.
    ///
    /// [`Error::TransactionFailed`]: crate::Error::TransactionFailed
    /// [`Error::StoreUnavailable`]: crate::Error::StoreUnavailable
    fn commit(self) -> impl Future<Output = Result<Vec<Order>>> + Send;
}

/// A durable table of orders with transactions and a range lock.
pub trait OrderStore: Send + Sync {
    type Transaction: StoreTransaction;

    /// Opens an insert transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;

    /// Numbers row `id` in a single locked statement.
    ///
    /// The store acquires an exclusive scope over at least `range`, lets
    /// `allocator` derive the number from the committed siblings, writes it,
    /// and only then releases the scope.
    ///
    /// # Errors
    ///
    /// - [`Error::LockTimeout`] if the scope is not granted in time.
    /// - [`Error::UniqueViolation`] if the number is already taken.
    /// - [`Error::DayExhausted`] from the allocator.
    /// - [`Error::AlreadyNumbered`] / [`Error::OrderNotFound`] for a bad `id`.
    /// - [`Error::RangeMismatch`] if `range` is not the day of the row's
    ///   `created_at`.
    /// - [`Error::StoreUnavailable`] if the store goes away before the write.
    ///
    /// [`Error::LockTimeout`]: crate::Error::LockTimeout
    /// [`Error::UniqueViolation`]: crate::Error::UniqueViolation
    /// [`Error::DayExhausted`]: crate::Error::DayExhausted
    /// [`Error::AlreadyNumbered`]: crate::Error::AlreadyNumbered
    /// [`Error::OrderNotFound`]: crate::Error::OrderNotFound
    /// [`Error::RangeMismatch`]: crate::Error::RangeMismatch
    /// [`Error::StoreUnavailable`]: crate::Error::StoreUnavailable
    fn assign_number<A>(
        &self,
        id: OrderId,
        range: DayRange,
        allocator: &A,
    ) -> impl Future<Output = Result<OrderNumber>> + Send
    where
        A: NumberAllocator;

    /// Reads a single row.
    fn get(&self, id: OrderId) -> impl Future<Output = Result<Option<Order>>> + Send;

    /// Total number of committed rows, numbered or not.
    fn count(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Number of distinct non-zero numbers across all rows.
    fn distinct_numbers(&self) -> impl Future<Output = Result<u64>> + Send;

    /// All committed rows ordered by identity.
    fn snapshot(&self) -> impl Future<Output = Result<Vec<Order>>> + Send;
}
