use chrono::{DateTime, TimeDelta, Utc};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    allocator::NumberAllocator,
    error::{Error, Result},
    number::DayKey,
    store::{NewOrder, Order, OrderId, OrderStore, StoreTransaction},
    time::{Clock, SystemClock},
};

/// Creates orders and gives each one its day-scoped number.
///
/// A creation runs in two separate steps against the store:
///
/// 1. An insert transaction that only obtains a durable identity. No lock is
///    held past its commit, so creators of different days never wait on each
///    other here.
/// 2. A single locked statement ([`OrderStore::assign_number`]) in which the
///    store holds the exclusive scope for the day while the allocator reads
///    the siblings and the number is written.
///
/// The creator keeps no state between calls and is safe to share across
/// tasks.
#[derive(Debug)]
pub struct OrderCreator<S, A, C = SystemClock> {
    store: S,
    allocator: A,
    clock: C,
}

impl<S, A> OrderCreator<S, A>
where
    S: OrderStore,
    A: NumberAllocator,
{
    /// Creates an order creator stamping orders with the system clock.
    pub const fn new(store: S, allocator: A) -> Self {
        Self::with_clock(store, allocator, SystemClock)
    }
}

impl<S, A, C> OrderCreator<S, A, C>
where
    S: OrderStore,
    A: NumberAllocator,
    C: Clock,
{
    /// Creates an order creator with an explicit [`Clock`].
    pub const fn with_clock(store: S, allocator: A, clock: C) -> Self {
        Self {
            store,
            allocator,
            clock,
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Creates one order dated `day_offset` days from now and returns its
    /// identity once it has been numbered.
    ///
    /// # Errors
    ///
    /// See [`OrderCreator::create`].
    pub async fn create_order(&self, day_offset: i64) -> Result<OrderId> {
        self.create(day_offset).await.map(|order| order.id)
    }

    /// Creates one order dated `day_offset` days from now and returns the
    /// numbered row.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTimestamp`] if the offset cannot be applied; nothing
    ///   is written.
    /// - Errors from the insert transaction; nothing is written.
    /// - [`Error::NumberingFailed`] if the row was inserted but the locked
    ///   statement failed. The row stays at `number = 0` and is not retried.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self), fields(policy = self.allocator.name()))
    )]
    pub async fn create(&self, day_offset: i64) -> Result<Order> {
        let created_at = self.stamp(day_offset)?;

        let inserted = {
            let mut tx = self.store.begin().await?;
            tx.insert(NewOrder { created_at });
            tx.commit()
                .await?
                .pop()
                .ok_or_else(|| Error::TransactionFailed {
                    reason: "commit returned no rows".to_string(),
                })?
        };

        let range = DayKey::of(inserted.created_at).range();
        match self
            .store
            .assign_number(inserted.id, range, &self.allocator)
            .await
        {
            Ok(number) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(id = %inserted.id, %number, "order numbered");
                Ok(Order {
                    number,
                    ..inserted
                })
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(id = %inserted.id, error = %err, "order left unnumbered");
                Err(Error::NumberingFailed {
                    id: inserted.id,
                    source: Box::new(err),
                })
            }
        }
    }

    fn stamp(&self, day_offset: i64) -> Result<DateTime<Utc>> {
        TimeDelta::try_days(day_offset)
            .and_then(|delta| self.clock.now().checked_add_signed(delta))
            .ok_or(Error::InvalidTimestamp { day_offset })
    }
}
