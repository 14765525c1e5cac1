//! Error types for order creation and numbering.
//!
//! A single [`Error`] enum covers every failure an allocation attempt can run
//! into. Failures fall into three groups:
//!
//! - Insert-side failures (`TransactionFailed`, `StoreUnavailable`): the
//!   attempt is aborted and nothing is persisted.
//! - Numbering failures (`LockTimeout`, `UniqueViolation`, `DayExhausted`):
//!   the row exists but keeps `number = 0`. The creator reports these wrapped
//!   in `NumberingFailed` so the caller learns which row was left behind.
//! - Driver failures (`Admission`, `InvalidConfig`): misuse of the workload
//!   driver rather than a store problem.

use core::time::Duration;

use crate::{number::DayKey, number::OrderNumber, store::OrderId};

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `seqnum` can produce.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The insert transaction could not be committed.
    #[error("transaction failed: {reason}")]
    TransactionFailed { reason: String },

    /// The store refused the operation because it is unreachable.
    #[error("store is unavailable")]
    StoreUnavailable,

    /// The exclusive scope over the day's range was not granted in time.
    #[error("timed out after {waited:?} waiting for the numbering lock")]
    LockTimeout { waited: Duration },

    /// Writing the number would have violated the unique index on non-zero
    /// numbers.
    #[error("order number {number} is already taken")]
    UniqueViolation { number: OrderNumber },

    /// All 9999 numbers of the day are in use.
    #[error("no order numbers left for day {day}")]
    DayExhausted { day: DayKey },

    /// The row already carries a final number.
    #[error("order {id} already numbered as {number}")]
    AlreadyNumbered { id: OrderId, number: OrderNumber },

    /// No row with the given identity exists.
    #[error("order {id} not found")]
    OrderNotFound { id: OrderId },

    /// The statement targeted a day other than the one the row was created
    /// on.
    #[error("order {id} was created on {created} but numbering targeted {requested}")]
    RangeMismatch {
        id: OrderId,
        created: DayKey,
        requested: DayKey,
    },

    /// Shifting the creation time by the requested number of days does not
    /// yield a representable timestamp.
    #[error("day offset {day_offset} is out of range")]
    InvalidTimestamp { day_offset: i64 },

    /// The row was inserted but could not be numbered; it stays at zero.
    #[error("order {id} was created but left unnumbered: {source}")]
    NumberingFailed {
        id: OrderId,
        #[source]
        source: Box<Error>,
    },

    /// The admission gate was closed while work was still being issued.
    #[error("admission error: {context}")]
    Admission { context: String },

    /// A driver or store setting was rejected.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Returns `true` when the failure is the per-day capacity running out,
    /// whether reported directly or wrapped by the creator.
    pub fn is_overflow(&self) -> bool {
        match self {
            Self::DayExhausted { .. } => true,
            Self::NumberingFailed { source, .. } => source.is_overflow(),
            _ => false,
        }
    }

    /// The row left unnumbered by this failure, if any.
    pub const fn unnumbered_order(&self) -> Option<OrderId> {
        match self {
            Self::NumberingFailed { id, .. } => Some(*id),
            _ => None,
        }
    }
}
