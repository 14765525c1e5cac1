//! Post-hoc consistency checks over a snapshot of the order table.

use std::collections::{BTreeMap, HashMap};

use crate::{
    number::{DayKey, OrderNumber},
    store::{Order, OrderId},
};

/// What one calendar day's numbers look like after a run.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DaySummary {
    pub day: DayKey,
    /// Numbered rows whose number belongs to this day.
    pub numbered: usize,
    pub first: OrderNumber,
    pub last: OrderNumber,
    /// The day's distinct sequence values are exactly `1..=numbered`.
    pub contiguous: bool,
}

/// Invariant violations and per-day statistics for a set of orders.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConsistencyReport {
    pub numbered: usize,
    pub unnumbered: usize,
    /// Distinct non-zero numbers.
    pub distinct: usize,
    /// Numbers carried by more than one row.
    pub duplicates: Vec<OrderNumber>,
    /// Rows whose number does not decode to the day of `created_at`.
    pub day_mismatches: Vec<OrderId>,
    /// One entry per represented day, oldest first.
    pub days: Vec<DaySummary>,
}

impl ConsistencyReport {
    pub fn check(orders: &[Order]) -> Self {
        let mut report = Self::default();
        let mut seen: HashMap<OrderNumber, usize> = HashMap::with_capacity(orders.len());
        let mut per_day: BTreeMap<DayKey, Vec<u32>> = BTreeMap::new();

        for order in orders {
            if !order.number.is_assigned() {
                report.unnumbered += 1;
                continue;
            }
            report.numbered += 1;

            let rows = seen.entry(order.number).or_default();
            *rows += 1;
            if *rows == 2 {
                report.duplicates.push(order.number);
            }

            match order.number.day() {
                Some(day) if day == DayKey::of(order.created_at) => {
                    per_day.entry(day).or_default().push(order.number.sequence());
                }
                _ => report.day_mismatches.push(order.id),
            }
        }

        report.distinct = seen.len();
        report.duplicates.sort_unstable();
        report.days = per_day
            .into_iter()
            .map(|(day, mut sequences)| {
                let numbered = sequences.len();
                sequences.sort_unstable();
                sequences.dedup();
                let contiguous = sequences.len() == numbered
                    && sequences.iter().zip(1_u32..).all(|(seq, want)| *seq == want);
                let range = day.range();
                DaySummary {
                    day,
                    numbered,
                    first: sequences
                        .first()
                        .and_then(|seq| range.nth(*seq))
                        .unwrap_or_default(),
                    last: sequences
                        .last()
                        .and_then(|seq| range.nth(*seq))
                        .unwrap_or_default(),
                    contiguous,
                }
            })
            .collect();
        report
    }

    /// No duplicates and no day mismatches; with `require_dense`, every day
    /// must also be contiguous from its base.
    pub fn is_consistent(&self, require_dense: bool) -> bool {
        self.duplicates.is_empty()
            && self.day_mismatches.is_empty()
            && (!require_dense || self.days.iter().all(|day| day.contiguous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn noon(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    fn order(id: u64, created_at: DateTime<Utc>, seq: Option<u32>) -> Order {
        Order {
            id: OrderId::from_raw(id),
            created_at,
            number: seq
                .and_then(|seq| DayKey::of(created_at).range().nth(seq))
                .unwrap_or_default(),
        }
    }

    #[test]
    fn contiguous_days_are_consistent() {
        let orders = [
            order(1, noon(7), Some(2)),
            order(2, noon(6), Some(1)),
            order(3, noon(7), Some(1)),
            order(4, noon(7), None),
        ];
        let report = ConsistencyReport::check(&orders);

        assert_eq!(report.numbered, 3);
        assert_eq!(report.unnumbered, 1);
        assert_eq!(report.distinct, 3);
        assert!(report.is_consistent(true));
        assert_eq!(report.days.len(), 2);
        assert_eq!(report.days[0].day, DayKey::of(noon(6)));
        assert_eq!(report.days[1].numbered, 2);
        assert_eq!(report.days[1].first.sequence(), 1);
        assert_eq!(report.days[1].last.sequence(), 2);
    }

    #[test]
    fn gaps_only_matter_when_density_is_required() {
        let orders = [order(1, noon(7), Some(1)), order(2, noon(7), Some(3))];
        let report = ConsistencyReport::check(&orders);
        assert!(!report.days[0].contiguous);
        assert!(report.is_consistent(false));
        assert!(!report.is_consistent(true));
    }

    #[test]
    fn duplicates_are_reported_once_per_number() {
        let orders = [
            order(1, noon(7), Some(1)),
            order(2, noon(7), Some(1)),
            order(3, noon(7), Some(1)),
        ];
        let report = ConsistencyReport::check(&orders);
        assert_eq!(report.duplicates, vec![DayKey::of(noon(7)).range().base()]);
        assert_eq!(report.distinct, 1);
        assert!(!report.days[0].contiguous);
        assert!(!report.is_consistent(false));
    }

    #[test]
    fn number_from_another_day_is_a_mismatch() {
        let mut stray = order(1, noon(7), Some(1));
        stray.number = DayKey::of(noon(6)).range().base();
        let report = ConsistencyReport::check(&[stray]);
        assert_eq!(report.day_mismatches, vec![OrderId::from_raw(1)]);
        assert!(report.days.is_empty());
        assert!(!report.is_consistent(false));
    }
}
