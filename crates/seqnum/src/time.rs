use chrono::{DateTime, Utc};

/// A source of wall-clock time for stamping new orders.
///
/// This abstraction lets tests pin the calendar day an order lands on, while
/// production code uses [`SystemClock`].
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use seqnum::{Clock, FixedClock};
///
/// let noon = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
/// let clock = FixedClock::new(noon);
/// assert_eq!(clock.now(), noon);
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a single instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}
