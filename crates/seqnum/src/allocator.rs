use crate::{
    error::{Error, Result},
    number::{DayRange, OrderNumber},
};

/// Read access to the numbers already committed in the store, as seen from
/// inside the exclusive scope of a numbering statement.
pub trait SiblingView {
    /// The highest non-zero number inside `range`, if any.
    fn max_in(&self, range: DayRange) -> Option<OrderNumber>;

    /// How many rows carry a number greater than or equal to `floor`.
    ///
    /// The count is unbounded above, so rows of later days are included.
    fn count_from(&self, floor: OrderNumber) -> u64;
}

/// Computes the number of a freshly inserted row from its same-day siblings.
///
/// Implementations are pure: they hold no state between calls and only look
/// at the [`SiblingView`] they are handed. The store evaluates them while it
/// holds the exclusive scope over the day's range, so two allocations can
/// never observe the same siblings and derive the same number.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use seqnum::{DayKey, DayRange, MaxAllocator, NumberAllocator, OrderNumber, SiblingView};
///
/// struct Empty;
/// impl SiblingView for Empty {
///     fn max_in(&self, _: DayRange) -> Option<OrderNumber> {
///         None
///     }
///     fn count_from(&self, _: OrderNumber) -> u64 {
///         0
///     }
/// }
///
/// let day = DayKey::from_date(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
/// let number = MaxAllocator.allocate(day.range(), &Empty).unwrap();
/// assert_eq!(number.get(), 2_403_070_001);
/// ```
pub trait NumberAllocator: Send + Sync {
    /// `true` when the policy guarantees that a day's numbers form the
    /// contiguous run `base..base + k` regardless of arrival order.
    const DENSE: bool;

    /// Short policy name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Returns the number for a new row of `range`'s day.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DayExhausted`] when the computed sequence would exceed
    /// the day's capacity.
    fn allocate<V>(&self, range: DayRange, siblings: &V) -> Result<OrderNumber>
    where
        V: SiblingView + ?Sized;
}

/// Max-based numbering: one past the highest number already committed for
/// the day, or the day's base when there is none.
///
/// The max-lookup is bounded to `[base, base + 9998]`, so it is unaffected by
/// rows of neighbouring days and by the order in which siblings were
/// numbered. This is the default policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaxAllocator;

impl NumberAllocator for MaxAllocator {
    const DENSE: bool = true;

    fn name(&self) -> &'static str {
        "max"
    }

    fn allocate<V>(&self, range: DayRange, siblings: &V) -> Result<OrderNumber>
    where
        V: SiblingView + ?Sized,
    {
        match siblings.max_in(range) {
            None => Ok(range.base()),
            Some(max) => max
                .successor()
                .ok_or(Error::DayExhausted { day: range.day() }),
        }
    }
}

/// Count-based numbering: the day's base plus the number of rows already
/// numbered at or above it.
///
/// Weaker than [`MaxAllocator`]: the count has no upper bound, so rows of a
/// later day push an earlier day's sequence forward, and any row removed or
/// numbered out of order breaks the count-to-sequence correspondence. Only
/// suitable when every creator targets the same day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountAllocator;

impl NumberAllocator for CountAllocator {
    const DENSE: bool = false;

    fn name(&self) -> &'static str {
        "count"
    }

    fn allocate<V>(&self, range: DayRange, siblings: &V) -> Result<OrderNumber>
    where
        V: SiblingView + ?Sized,
    {
        let taken = siblings.count_from(range.base());
        u32::try_from(taken)
            .ok()
            .and_then(|taken| taken.checked_add(1))
            .and_then(|seq| range.nth(seq))
            .ok_or(Error::DayExhausted { day: range.day() })
    }
}
