use core::time::Duration;
use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    error::{Error, Result},
    number::{DayKey, DayRange},
};

/// How much of the table a numbering statement locks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LockScope {
    /// One exclusive lock over the whole table. A safe superset of any day's
    /// range; numbering of different days is serialized too.
    #[default]
    Table,
    /// One exclusive lock per calendar day. Sufficient for the max-based
    /// policy, whose reads never leave the day's range. The count-based
    /// policy reads rows of later days and needs [`LockScope::Table`].
    Day,
    /// No lock at all. Two statements can read the same siblings and derive
    /// the same number; only useful to observe that race.
    None,
}

/// An exclusive scope held by a numbering statement. Released on drop.
#[must_use = "the scope is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct RangeGuard {
    _guard: Option<OwnedMutexGuard<()>>,
}

/// The lock table backing [`LockScope`].
#[derive(Debug)]
pub(crate) struct RangeLocks {
    scope: LockScope,
    table: Arc<AsyncMutex<()>>,
    days: parking_lot::Mutex<HashMap<DayKey, Arc<AsyncMutex<()>>>>,
}

impl RangeLocks {
    pub(crate) fn new(scope: LockScope) -> Self {
        Self {
            scope,
            table: Arc::new(AsyncMutex::new(())),
            days: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Waits for the exclusive scope covering `range`.
    ///
    /// Waiters are granted the scope in FIFO order.
    pub(crate) async fn acquire(
        &self,
        range: DayRange,
        timeout: Option<Duration>,
    ) -> Result<RangeGuard> {
        let mutex = match self.scope {
            LockScope::None => return Ok(RangeGuard { _guard: None }),
            LockScope::Table => Arc::clone(&self.table),
            LockScope::Day => Arc::clone(self.days.lock().entry(range.day()).or_default()),
        };

        let guard = match timeout {
            None => mutex.lock_owned().await,
            Some(limit) => tokio::time::timeout(limit, mutex.lock_owned())
                .await
                .map_err(|_| Error::LockTimeout { waited: limit })?,
        };

        Ok(RangeGuard {
            _guard: Some(guard),
        })
    }
}
