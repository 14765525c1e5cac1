use core::time::Duration;
use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use portable_atomic::{AtomicBool, Ordering};

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{
    NewOrder, Order, OrderId, OrderStore, StoreTransaction,
    lock::{LockScope, RangeGuard, RangeLocks},
};
use crate::{
    allocator::{NumberAllocator, SiblingView},
    error::{Error, Result},
    number::{DayKey, DayRange, OrderNumber},
};

/// Tuning knobs for [`MemoryStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// What the numbering statement locks.
    pub lock_scope: LockScope,
    /// How long a numbering statement waits for its scope. `None` waits
    /// forever.
    pub lock_timeout: Option<Duration>,
    /// Simulated round trip taken inside every statement, between reading
    /// the siblings and writing the number. `None` (or zero) still yields to
    /// the scheduler once.
    pub latency: Option<Duration>,
    /// Enforce uniqueness of non-zero numbers on write.
    pub unique_index: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_scope: LockScope::Table,
            lock_timeout: None,
            latency: None,
            unique_index: true,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn with_lock_scope(mut self, lock_scope: LockScope) -> Self {
        self.lock_scope = lock_scope;
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: Option<Duration>) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub const fn with_unique_index(mut self, unique_index: bool) -> Self {
        self.unique_index = unique_index;
        self
    }
}

/// An in-process [`OrderStore`].
///
/// Rows live in a `parking_lot` read/write lock that is only ever held for
/// the synchronous part of a statement. The exclusive scope of a numbering
/// statement is a separate async lock (see [`LockScope`]) held across the
/// whole read-compute-write sequence, including the simulated round trip.
///
/// Cloning is cheap and every clone shares the same table.
///
/// # Example
///
/// ```
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// use chrono::Utc;
/// use seqnum::{DayKey, MaxAllocator, MemoryStore, NewOrder, OrderStore, StoreTransaction};
///
/// let store = MemoryStore::default();
/// let created_at = Utc::now();
///
/// let mut tx = store.begin().await?;
/// tx.insert(NewOrder { created_at });
/// let order = tx.commit().await?[0];
///
/// let range = DayKey::of(created_at).range();
/// let number = store.assign_number(order.id, range, &MaxAllocator).await?;
/// assert_eq!(number, range.base());
/// # Ok::<(), seqnum::Error>(())
/// # }).unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: StoreConfig,
    table: RwLock<Table>,
    locks: RangeLocks,
    available: AtomicBool,
}

impl Default for Inner {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Inner {
    fn new(config: StoreConfig) -> Self {
        Self {
            locks: RangeLocks::new(config.lock_scope),
            config,
            table: RwLock::new(Table::default()),
            available: AtomicBool::new(true),
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable)
        }
    }

    async fn round_trip(&self) {
        match self.config.latency {
            Some(latency) if !latency.is_zero() => tokio::time::sleep(latency).await,
            _ => tokio::task::yield_now().await,
        }
    }
}

#[derive(Debug)]
struct Table {
    next_id: u64,
    rows: BTreeMap<OrderId, Order>,
    /// Non-zero numbers and how many rows carry each. With the unique index
    /// enabled every count is 1.
    numbers: BTreeMap<OrderNumber, u32>,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
            numbers: BTreeMap::new(),
        }
    }
}

impl Table {
    fn check_unnumbered(&self, id: OrderId) -> Result<&Order> {
        match self.rows.get(&id) {
            None => Err(Error::OrderNotFound { id }),
            Some(row) if row.number.is_assigned() => Err(Error::AlreadyNumbered {
                id,
                number: row.number,
            }),
            Some(row) => Ok(row),
        }
    }

    /// The row must be unnumbered and `range` must be the day of its
    /// `created_at`.
    fn check_assignable(&self, id: OrderId, range: DayRange) -> Result<()> {
        let created = DayKey::of(self.check_unnumbered(id)?.created_at);
        if created == range.day() {
            Ok(())
        } else {
            Err(Error::RangeMismatch {
                id,
                created,
                requested: range.day(),
            })
        }
    }

    fn write_number(&mut self, id: OrderId, number: OrderNumber, unique: bool) -> Result<()> {
        if unique && self.numbers.contains_key(&number) {
            return Err(Error::UniqueViolation { number });
        }
        self.check_unnumbered(id)?;
        if let Some(row) = self.rows.get_mut(&id) {
            row.number = number;
        }
        *self.numbers.entry(number).or_default() += 1;
        Ok(())
    }
}

impl SiblingView for Table {
    fn max_in(&self, range: DayRange) -> Option<OrderNumber> {
        self.numbers
            .range(range.base()..=range.last())
            .next_back()
            .map(|(number, _)| *number)
    }

    fn count_from(&self, floor: OrderNumber) -> u64 {
        self.numbers
            .range(floor..)
            .map(|(_, rows)| u64::from(*rows))
            .sum()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner::new(config)),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Takes the store offline (`false`) or back online (`true`). While
    /// offline every operation fails with [`Error::StoreUnavailable`] and
    /// commits fail with [`Error::TransactionFailed`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    /// Acquires the exclusive scope over `range` from outside a statement,
    /// blocking numbering of that range until the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] if the configured timeout elapses.
    pub async fn hold_lock(&self, range: DayRange) -> Result<RangeGuard> {
        self.inner
            .locks
            .acquire(range, self.inner.config.lock_timeout)
            .await
    }
}

/// An open transaction on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<Inner>,
    staged: Vec<NewOrder>,
}

impl StoreTransaction for MemoryTransaction {
    fn insert(&mut self, order: NewOrder) {
        self.staged.push(order);
    }

    async fn commit(self) -> Result<Vec<Order>> {
        let Self { inner, staged } = self;
        inner.round_trip().await;

        if inner.ensure_available().is_err() {
            return Err(Error::TransactionFailed {
                reason: "store became unavailable before commit".to_string(),
            });
        }

        let mut table = inner.table.write();
        let committed = staged
            .into_iter()
            .map(|new| {
                let id = OrderId::from_raw(table.next_id);
                table.next_id += 1;
                let order = Order {
                    id,
                    created_at: new.created_at,
                    number: OrderNumber::UNASSIGNED,
                };
                table.rows.insert(id, order);
                order
            })
            .collect();
        Ok(committed)
    }
}

impl OrderStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        self.inner.ensure_available()?;
        Ok(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
        })
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self, allocator), fields(policy = allocator.name()))
    )]
    async fn assign_number<A>(
        &self,
        id: OrderId,
        range: DayRange,
        allocator: &A,
    ) -> Result<OrderNumber>
    where
        A: NumberAllocator,
    {
        self.inner.ensure_available()?;
        let _scope = self
            .inner
            .locks
            .acquire(range, self.inner.config.lock_timeout)
            .await?;

        let number = {
            let table = self.inner.table.read();
            table.check_assignable(id, range)?;
            allocator.allocate(range, &*table)?
        };

        self.inner.round_trip().await;

        self.inner.ensure_available()?;
        self.inner
            .table
            .write()
            .write_number(id, number, self.inner.config.unique_index)?;
        Ok(number)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.inner.ensure_available()?;
        Ok(self.inner.table.read().rows.get(&id).copied())
    }

    async fn count(&self) -> Result<u64> {
        self.inner.ensure_available()?;
        Ok(self.inner.table.read().rows.len() as u64)
    }

    async fn distinct_numbers(&self) -> Result<u64> {
        self.inner.ensure_available()?;
        Ok(self.inner.table.read().numbers.len() as u64)
    }

    async fn snapshot(&self) -> Result<Vec<Order>> {
        self.inner.ensure_available()?;
        Ok(self.inner.table.read().rows.values().copied().collect())
    }
}
