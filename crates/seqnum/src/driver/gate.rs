use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// A counting admission gate bounding how many creations run at once.
///
/// [`AdmissionGate::admit`] suspends the caller while all slots are taken.
/// This is the driver's only backpressure mechanism.
#[derive(Debug)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// One admitted unit of work. The slot is handed back when this is dropped.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Admission`] if the gate was closed.
    pub async fn admit(&self) -> Result<AdmissionSlot> {
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map(|permit| AdmissionSlot { _permit: permit })
            .map_err(|_| Error::Admission {
                context: "admission gate closed".to_string(),
            })
    }

    /// Closes the gate. Pending and future [`AdmissionGate::admit`] calls
    /// fail; slots already handed out stay valid.
    pub fn close(&self) {
        self.slots.close();
    }
}
