use core::time::Duration;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use seqnum::{DayOffsets, DriverConfig, LockScope, StoreConfig};

/// Runtime configuration for the `seqnum-driver` binary.
///
/// Every value is parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first). The defaults reproduce the reference
/// workload: 10,000 orders for the current day with at most 20 creators in
/// flight, which fills the day and overflows exactly once.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "seqnum-driver",
    version,
    about = "Creates day-numbered orders concurrently and verifies the numbering"
)]
pub struct CliArgs {
    /// Number of orders to create.
    ///
    /// Environment variable: `TOTAL_ORDERS`
    #[arg(long, env = "TOTAL_ORDERS", default_value_t = 10_000)]
    pub total_orders: u64,

    /// Maximum number of creations running at the same time.
    ///
    /// Environment variable: `MAX_PARALLELISM`
    #[arg(long, env = "MAX_PARALLELISM", default_value_t = 20)]
    pub max_parallelism: usize,

    /// How a new order's number is derived from its same-day siblings.
    ///
    /// Environment variable: `NUMBERING_POLICY`
    #[arg(long, env = "NUMBERING_POLICY", value_enum, default_value_t = Policy::Max)]
    pub policy: Policy,

    /// Smallest day offset applied to an order's creation time.
    ///
    /// Environment variable: `DAY_OFFSET_MIN`
    #[arg(long, env = "DAY_OFFSET_MIN", default_value_t = 0, allow_hyphen_values = true)]
    pub day_offset_min: i64,

    /// Largest day offset applied to an order's creation time. Each order
    /// draws uniformly from `min..=max`.
    ///
    /// Environment variable: `DAY_OFFSET_MAX`
    #[arg(long, env = "DAY_OFFSET_MAX", default_value_t = 0, allow_hyphen_values = true)]
    pub day_offset_max: i64,

    /// Portion of the table a numbering statement locks.
    ///
    /// `none` disables the lock and exposes the read-then-write race.
    ///
    /// Environment variable: `LOCK_SCOPE`
    #[arg(long, env = "LOCK_SCOPE", value_enum, default_value_t = Scope::Table)]
    pub lock_scope: Scope,

    /// How long a statement waits for its lock, in milliseconds. `0` waits
    /// forever.
    ///
    /// Environment variable: `LOCK_TIMEOUT_MS`
    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value_t = 0)]
    pub lock_timeout_ms: u64,

    /// Simulated statement round trip, in microseconds. `0` only yields to
    /// the scheduler.
    ///
    /// Environment variable: `STATEMENT_LATENCY_US`
    #[arg(long, env = "STATEMENT_LATENCY_US", default_value_t = 0)]
    pub latency_us: u64,

    /// Drop the unique index on non-zero numbers, letting duplicates land.
    #[arg(long, default_value_t = false)]
    pub no_unique_index: bool,

    /// Print the report as JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Highest number of the day plus one.
    Max,
    /// Day base plus the count of numbers at or above it.
    Count,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Table,
    Day,
    None,
}

impl From<Scope> for LockScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Table => Self::Table,
            Scope::Day => Self::Day,
            Scope::None => Self::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub policy: Policy,
    pub driver: DriverConfig,
    pub store: StoreConfig,
    pub json: bool,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.total_orders == 0 {
            bail!("TOTAL_ORDERS must be greater than 0");
        }

        if args.max_parallelism == 0 {
            bail!("MAX_PARALLELISM must be greater than 0");
        }

        if args.day_offset_min > args.day_offset_max {
            bail!(
                "DAY_OFFSET_MIN ({}) must not exceed DAY_OFFSET_MAX ({})",
                args.day_offset_min,
                args.day_offset_max
            );
        }

        let day_offsets = DayOffsets::uniform(args.day_offset_min, args.day_offset_max)?;
        let driver =
            DriverConfig::new(args.total_orders, args.max_parallelism)?.with_day_offsets(day_offsets);

        let store = StoreConfig::default()
            .with_lock_scope(args.lock_scope.into())
            .with_lock_timeout(
                (args.lock_timeout_ms > 0).then(|| Duration::from_millis(args.lock_timeout_ms)),
            )
            .with_latency((args.latency_us > 0).then(|| Duration::from_micros(args.latency_us)))
            .with_unique_index(!args.no_unique_index);

        Ok(Self {
            policy: args.policy,
            driver,
            store,
            json: args.json,
        })
    }
}
