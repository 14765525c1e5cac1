use core::{fmt, time::Duration};

use crate::verify::ConsistencyReport;

/// Aggregate outcome of a [`Driver`] run.
///
/// `created` and `distinct_numbers` are read back from the store after the
/// drain; a correct run with no failed attempts has them equal. Rows that
/// failed numbering show up as `created - distinct_numbers` and in
/// `consistency.unnumbered`.
///
/// [`Driver`]: crate::Driver
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RunReport {
    pub policy: &'static str,
    /// The policy promises gap-free numbering within a day.
    pub dense: bool,
    /// Units of work issued through the admission gate.
    pub attempts: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Failed attempts that hit the per-day capacity.
    pub overflowed: u64,
    /// Tasks that panicked instead of returning.
    pub panicked: u64,
    /// Highest number of creations observed running at once.
    pub peak_in_flight: u64,
    /// Admission stopped early because the run was cancelled.
    pub cancelled: bool,
    /// Rows in the store.
    pub created: u64,
    /// Distinct non-zero numbers in the store.
    pub distinct_numbers: u64,
    pub consistency: ConsistencyReport,
    pub elapsed: Duration,
}

impl RunReport {
    /// Every row carries its own number.
    pub const fn counts_match(&self) -> bool {
        self.created == self.distinct_numbers
    }

    /// No duplicates, no day mismatches and, for a dense policy, no gaps.
    pub fn is_consistent(&self) -> bool {
        self.consistency.is_consistent(self.dense)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " - policy: {}", self.policy)?;
        writeln!(
            f,
            " - attempts: {} ({} succeeded, {} failed, {} overflowed, {} panicked{})",
            self.attempts,
            self.succeeded,
            self.failed,
            self.overflowed,
            self.panicked,
            if self.cancelled { ", cancelled" } else { "" }
        )?;
        writeln!(f, " - peak in flight: {}", self.peak_in_flight)?;
        writeln!(f, " - created {} orders", self.created)?;
        writeln!(f, " - created {} numbers", self.distinct_numbers)?;
        writeln!(
            f,
            " - unnumbered: {}, duplicates: {}, day mismatches: {}",
            self.consistency.unnumbered,
            self.consistency.duplicates.len(),
            self.consistency.day_mismatches.len()
        )?;
        for day in &self.consistency.days {
            writeln!(
                f,
                "   {}: {} numbers {}..={}{}",
                day.day,
                day.numbered,
                day.first,
                day.last,
                if day.contiguous { "" } else { " (gaps)" }
            )?;
        }
        write!(f, " - elapsed: {:?}", self.elapsed)
    }
}
