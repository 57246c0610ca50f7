//! Task persistence backends.
//!
//! [`TaskBackend`] is the only interface the rest of the crate uses to reach
//! persisted tasks. A concrete backend is chosen once, from configuration, by
//! [`open`].
//!
//! Subscriptions deliver full owner-filtered snapshots: once immediately and
//! again after every change. Callbacks run on a backend-owned thread (or on
//! the writer's thread for [`MemoryBackend`]) and must not call back into the
//! backend.

mod file;
mod memory;

use std::fmt;
use std::sync::Arc;

use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::storage::Storage;
use crate::task::Task;

pub use file::{FileBackend, TaskEvent, TaskEventType, TaskSnapshot};
pub use memory::MemoryBackend;

pub type SnapshotCallback = Box<dyn FnMut(Vec<Task>) + Send>;
pub type ErrorCallback = Box<dyn FnMut(crate::error::Error) + Send>;

pub trait TaskBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Watch the tasks owned by `owner_id`.
    fn subscribe(
        &self,
        owner_id: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Result<Subscription>;

    /// One-shot read of the tasks owned by `owner_id`, in stored order.
    fn snapshot(&self, owner_id: &str) -> Result<Vec<Task>>;

    /// Persist a new task. An empty `task.id` asks the backend to assign one.
    fn create(&self, task: &Task) -> Result<String>;

    fn update(&self, task: &Task) -> Result<()>;

    /// Deleting an unknown id succeeds.
    fn delete(&self, id: &str) -> Result<()>;
}

/// Live subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

/// Backend selected by `[backend] kind`.
pub fn open(config: &Config, storage: &Storage) -> Result<Arc<dyn TaskBackend>> {
    let backend: Arc<dyn TaskBackend> = match config.backend.kind {
        BackendKind::File => Arc::new(FileBackend::open(storage.clone())?),
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
    };
    tracing::debug!(kind = %config.backend.kind, root = %storage.root().display(), "backend opened");
    Ok(backend)
}

/// Stored order: position, then creation time.
pub(crate) fn sort_snapshot(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn owned_by(tasks: &[Task], owner_id: &str) -> Vec<Task> {
    let mut owned: Vec<Task> = tasks
        .iter()
        .filter(|task| task.owner_id == owner_id)
        .cloned()
        .collect();
    sort_snapshot(&mut owned);
    owned
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn subscription_cancels_once_on_drop() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let subscription = Subscription::new(move || {
            assert!(!flag.swap(true, Ordering::SeqCst));
        });
        drop(subscription);
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn open_honours_configured_kind() {
        let temp = tempfile::tempdir().unwrap();
        let storage = Storage::new(temp.path());
        let mut config = Config::default();

        assert_eq!(open(&config, &storage).unwrap().kind(), BackendKind::File);
        config.backend.kind = BackendKind::Memory;
        assert_eq!(open(&config, &storage).unwrap().kind(), BackendKind::Memory);
    }
}
