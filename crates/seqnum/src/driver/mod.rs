//! Bounded-parallelism workload driver.
//!
//! The driver issues `total_count` creations through an [`AdmissionGate`]
//! sized to `max_parallelism`, tracks the spawned tasks in an
//! [`InFlightRegistry`], waits for all of them, and then reads the store back
//! into a [`RunReport`].

mod gate;
mod registry;
mod report;
#[cfg(test)]
mod tests;

use std::{sync::Arc, time::Instant};

pub use gate::*;
use portable_atomic::{AtomicU64, Ordering};
use rand::Rng;
pub use registry::*;
pub use report::*;
use tokio_util::sync::CancellationToken;

use crate::{
    allocator::NumberAllocator,
    creator::OrderCreator,
    error::{Error, Result},
    store::{Order, OrderStore},
    time::Clock,
    verify::ConsistencyReport,
};

/// How far from "now" each created order is dated, in whole days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayOffsets {
    /// Every order uses the same offset.
    Fixed(i64),
    /// Each order draws an offset uniformly from `min..=max`.
    Uniform { min: i64, max: i64 },
}

impl Default for DayOffsets {
    fn default() -> Self {
        Self::Fixed(0)
    }
}

impl DayOffsets {
    /// Builds a uniform range, collapsing to [`DayOffsets::Fixed`] when both
    /// bounds are equal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `min > max`.
    pub fn uniform(min: i64, max: i64) -> Result<Self> {
        match min.cmp(&max) {
            core::cmp::Ordering::Greater => Err(Error::InvalidConfig {
                reason: format!("day offset range {min}..={max} is empty"),
            }),
            core::cmp::Ordering::Equal => Ok(Self::Fixed(min)),
            core::cmp::Ordering::Less => Ok(Self::Uniform { min, max }),
        }
    }

    /// Draws the offset for one unit of work.
    pub fn sample(&self) -> i64 {
        match *self {
            Self::Fixed(offset) => offset,
            Self::Uniform { min, max } => rand::rng().random_range(min.min(max)..=max.max(min)),
        }
    }
}

/// Shape of a driver run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    total_count: u64,
    max_parallelism: usize,
    day_offsets: DayOffsets,
}

impl DriverConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either value is zero.
    pub fn new(total_count: u64, max_parallelism: usize) -> Result<Self> {
        if total_count == 0 {
            return Err(Error::InvalidConfig {
                reason: "total count must be greater than zero".to_string(),
            });
        }
        if max_parallelism == 0 {
            return Err(Error::InvalidConfig {
                reason: "max parallelism must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            total_count,
            max_parallelism,
            day_offsets: DayOffsets::default(),
        })
    }

    pub const fn with_day_offsets(mut self, day_offsets: DayOffsets) -> Self {
        self.day_offsets = day_offsets;
        self
    }

    pub const fn total_count(&self) -> u64 {
        self.total_count
    }

    pub const fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    pub const fn day_offsets(&self) -> DayOffsets {
        self.day_offsets
    }
}

/// Runs many order creations concurrently against one store.
///
/// # Example
///
/// ```
/// use seqnum::{Driver, DriverConfig, MaxAllocator, MemoryStore, OrderCreator};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let creator = OrderCreator::new(MemoryStore::default(), MaxAllocator);
/// let driver = Driver::new(creator, DriverConfig::new(100, 8).unwrap());
///
/// let report = driver.run().await.unwrap();
/// assert_eq!(report.created, 100);
/// assert!(report.is_consistent());
/// # });
/// ```
#[derive(Debug)]
pub struct Driver<S, A, C> {
    creator: Arc<OrderCreator<S, A, C>>,
    config: DriverConfig,
    gate: AdmissionGate,
    cancel: CancellationToken,
}

impl<S, A, C> Driver<S, A, C>
where
    S: OrderStore + 'static,
    A: NumberAllocator + 'static,
    C: Clock + 'static,
{
    pub fn new(creator: OrderCreator<S, A, C>, config: DriverConfig) -> Self {
        Self {
            creator: Arc::new(creator),
            gate: AdmissionGate::new(config.max_parallelism),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the token that stops admission of new work. Work already
    /// admitted when the token fires still runs to completion.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn creator(&self) -> &OrderCreator<S, A, C> {
        &self.creator
    }

    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The gate bounding this driver's parallelism. Closing it makes a
    /// running [`Driver::run`] stop admitting, drain, and fail with
    /// [`Error::Admission`].
    pub const fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Issues every unit of work, waits for all of them, and reports.
    ///
    /// Individual creation failures are counted, not returned.
    ///
    /// # Errors
    ///
    /// Fails if the admission gate was closed, after the work already
    /// admitted has drained, or if the store cannot be read back.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "info",
            skip(self),
            fields(
                policy = self.creator.allocator().name(),
                total = self.config.total_count,
                parallelism = self.config.max_parallelism,
            )
        )
    )]
    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let registry = Arc::new(InFlightRegistry::default());
        let tally = Arc::new(Tally::default());
        let mut attempts = 0_u64;
        let mut cancelled = false;
        let mut refused = None;

        for work_id in 0..self.config.total_count {
            let slot = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                slot = self.gate.admit() => match slot {
                    Ok(slot) => slot,
                    Err(err) => {
                        refused = Some(err);
                        break;
                    }
                },
            };
            attempts += 1;

            let day_offset = self.config.day_offsets.sample();
            registry.reserve(work_id);
            let handle = tokio::spawn({
                let creator = Arc::clone(&self.creator);
                let registry = Arc::clone(&registry);
                let tally = Arc::clone(&tally);
                async move {
                    let _slot = slot;
                    let _running = tally.enter();
                    let outcome = creator.create(day_offset).await;
                    tally.record(&outcome);
                    // A panic skips this, leaving the entry for `drain`.
                    registry.remove(work_id);
                }
            });
            registry.attach(work_id, handle);
        }

        #[cfg(feature = "tracing")]
        if cancelled {
            tracing::info!(attempts, "admission cancelled, draining");
        }

        let failures = registry.drain().await;
        #[cfg(feature = "tracing")]
        for failure in &failures {
            tracing::error!(error = %failure, "creation task panicked");
        }

        if let Some(err) = refused {
            #[cfg(feature = "tracing")]
            tracing::error!(attempts, error = %err, "admission refused, run aborted");
            return Err(err);
        }

        let store = self.creator.store();
        let created = store.count().await?;
        let distinct_numbers = store.distinct_numbers().await?;
        let consistency = ConsistencyReport::check(&store.snapshot().await?);

        let report = RunReport {
            policy: self.creator.allocator().name(),
            dense: A::DENSE,
            attempts,
            succeeded: tally.succeeded.load(Ordering::Acquire),
            failed: tally.failed.load(Ordering::Acquire),
            overflowed: tally.overflowed.load(Ordering::Acquire),
            panicked: failures.len() as u64,
            peak_in_flight: tally.peak.load(Ordering::Acquire),
            cancelled,
            created,
            distinct_numbers,
            consistency,
            elapsed: started.elapsed(),
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            created = report.created,
            distinct = report.distinct_numbers,
            failed = report.failed,
            elapsed = ?report.elapsed,
            "run finished"
        );

        Ok(report)
    }
}

/// Outcome counters shared by the spawned tasks.
#[derive(Debug, Default)]
struct Tally {
    succeeded: AtomicU64,
    failed: AtomicU64,
    overflowed: AtomicU64,
    in_flight: AtomicU64,
    peak: AtomicU64,
}

impl Tally {
    fn enter(&self) -> Running<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        Running(self)
    }

    fn record(&self, outcome: &Result<Order>) {
        match outcome {
            Ok(_) => {
                self.succeeded.fetch_add(1, Ordering::AcqRel);
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::AcqRel);
                if err.is_overflow() {
                    self.overflowed.fetch_add(1, Ordering::AcqRel);
                }
            }
        }
    }
}

/// Marks one creation as running until dropped.
struct Running<'a>(&'a Tally);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
