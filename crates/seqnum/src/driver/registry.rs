use std::collections::HashMap;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};

/// Identity of one unit of work issued by the driver.
pub type WorkId = u64;

/// Tasks currently in flight, keyed by work identity.
///
/// Entries are reserved before the task is spawned and removed by the task
/// itself when it finishes, so completion in any order leaves no stale
/// entries behind. Every access goes through the mutex.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    tasks: Mutex<HashMap<WorkId, Option<JoinHandle<()>>>>,
}

impl InFlightRegistry {
    /// Registers `id` ahead of spawning its task.
    pub fn reserve(&self, id: WorkId) {
        self.tasks.lock().insert(id, None);
    }

    /// Stores the task handle for `id`. If the task already finished and
    /// removed its entry, the handle is dropped, which detaches nothing but
    /// a completed task.
    pub fn attach(&self, id: WorkId, handle: JoinHandle<()>) {
        if let Some(slot) = self.tasks.lock().get_mut(&id) {
            *slot = Some(handle);
        }
    }

    /// Removes `id`. Called by the task on completion.
    pub fn remove(&self, id: WorkId) {
        self.tasks.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Waits for every task still registered and empties the registry.
    ///
    /// Returns the join errors of tasks that panicked or were aborted.
    pub async fn drain(&self) -> Vec<JoinError> {
        let handles: Vec<_> = self
            .tasks
            .lock()
            .drain()
            .filter_map(|(_, handle)| handle)
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn finished_tasks_remove_themselves() {
        let registry = Arc::new(InFlightRegistry::default());
        let (release, released) = oneshot::channel::<()>();

        for id in 0..2 {
            registry.reserve(id);
        }
        let r = Arc::clone(&registry);
        let quick = tokio::spawn(async move { r.remove(0) });
        registry.attach(0, quick);

        let r = Arc::clone(&registry);
        let slow = tokio::spawn(async move {
            let _ = released.await;
            r.remove(1);
        });
        registry.attach(1, slow);

        while registry.len() > 1 {
            tokio::task::yield_now().await;
        }
        assert_eq!(registry.len(), 1);

        release.send(()).unwrap();
        assert!(registry.drain().await.is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn drain_reports_panicked_tasks() {
        let registry = InFlightRegistry::default();
        registry.reserve(7);
        registry.attach(
            7,
            tokio::spawn(async {
                panic!("boom");
            }),
        );

        let errors = registry.drain().await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_panic());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn attach_after_removal_is_ignored() {
        let registry = InFlightRegistry::default();
        registry.reserve(1);
        registry.remove(1);
        registry.attach(1, tokio::spawn(async {}));
        assert!(registry.is_empty());
        assert!(registry.drain().await.is_empty());
    }
}
