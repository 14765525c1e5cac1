use core::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Highest sequence value a single calendar day can hand out.
pub const MAX_DAILY_SEQUENCE: u32 = 9_999;

const YEAR_FACTOR: u64 = 100_000_000;
const MONTH_FACTOR: u64 = 1_000_000;
const DAY_FACTOR: u64 = 10_000;

/// A calendar day as encoded in the leading six digits of an
/// [`OrderNumber`]: two-digit year, month and day of month.
///
/// The year is reduced modulo 100, so days a century apart share a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey {
    year: u8,
    month: u8,
    day: u8,
}

impl DayKey {
    /// Builds the key for a calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            // `rem_euclid(100)` is always in 0..100.
            year: date.year().rem_euclid(100) as u8,
            month: date.month() as u8,
            day: date.day() as u8,
        }
    }

    /// Builds the key for the UTC calendar day of `ts`.
    pub fn of(ts: DateTime<Utc>) -> Self {
        Self::from_date(ts.date_naive())
    }

    /// Two-digit year (`0..=99`).
    pub const fn year(self) -> u8 {
        self.year
    }

    pub const fn month(self) -> u8 {
        self.month
    }

    pub const fn day(self) -> u8 {
        self.day
    }

    /// The numeric range reserved for this day.
    pub const fn range(self) -> DayRange {
        DayRange { day: self }
    }

    /// Returns `true` if `date` falls on this day (modulo the century).
    pub fn matches(self, date: NaiveDate) -> bool {
        self == Self::from_date(date)
    }

    const fn prefix(self) -> u64 {
        self.year as u64 * YEAR_FACTOR
            + self.month as u64 * MONTH_FACTOR
            + self.day as u64 * DAY_FACTOR
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}{:02}", self.year, self.month, self.day)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for DayKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The closed numeric range `[base, base + 9998]` reserved for one day.
///
/// Every number in the range decodes back to the same [`DayKey`], which is
/// what lets a max-lookup stay on its own day even when rows of neighbouring
/// days are interleaved in the same table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DayRange {
    day: DayKey,
}

impl DayRange {
    pub const fn day(self) -> DayKey {
        self.day
    }

    /// The day's first number (`seq = 1`).
    pub const fn base(self) -> OrderNumber {
        OrderNumber(self.day.prefix() + 1)
    }

    /// The day's last number (`seq = 9999`).
    pub const fn last(self) -> OrderNumber {
        OrderNumber(self.day.prefix() + MAX_DAILY_SEQUENCE as u64)
    }

    pub const fn contains(self, number: OrderNumber) -> bool {
        number.0 >= self.base().0 && number.0 <= self.last().0
    }

    /// The number carrying sequence value `seq`, or `None` outside
    /// `1..=9999`.
    pub const fn nth(self, seq: u32) -> Option<OrderNumber> {
        if seq == 0 || seq > MAX_DAILY_SEQUENCE {
            None
        } else {
            Some(OrderNumber(self.day.prefix() + seq as u64))
        }
    }
}

/// A day-scoped order number, `YYMMDDnnnn` read as a decimal integer.
///
/// Zero is the "not numbered yet" sentinel carried by freshly inserted rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct OrderNumber(u64);

impl OrderNumber {
    pub const UNASSIGNED: Self = Self(0);

    /// Wraps a raw value without validation.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }

    /// The trailing four digits.
    pub const fn sequence(self) -> u32 {
        (self.0 % DAY_FACTOR) as u32
    }

    /// Decodes the leading six digits.
    ///
    /// Returns `None` for the unassigned sentinel, for a zero sequence, and
    /// for digits that do not form a calendar date.
    pub fn day(self) -> Option<DayKey> {
        if !self.is_assigned() || self.sequence() == 0 || self.0 / YEAR_FACTOR > 99 {
            return None;
        }
        let year = (self.0 / YEAR_FACTOR) as u8;
        let month = (self.0 / MONTH_FACTOR % 100) as u8;
        let day = (self.0 / DAY_FACTOR % 100) as u8;
        // Validate against a leap-year-aware calendar in the 2000s.
        NaiveDate::from_ymd_opt(2000 + i32::from(year), u32::from(month), u32::from(day))?;
        Some(DayKey { year, month, day })
    }

    /// The next number of the same day, or `None` once the day's last
    /// sequence value has been reached.
    pub const fn successor(self) -> Option<Self> {
        if self.sequence() >= MAX_DAILY_SEQUENCE {
            None
        } else {
            Some(Self(self.0 + 1))
        }
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_assigned() {
            write!(f, "{:010}", self.0)
        } else {
            f.write_str("0")
        }
    }
}
