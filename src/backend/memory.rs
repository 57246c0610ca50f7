use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::BackendKind;
use crate::error::{Error, Result};
use crate::task::{generate_task_id, Task};

use super::{owned_by, ErrorCallback, SnapshotCallback, Subscription, TaskBackend};

type SharedCallback = Arc<Mutex<SnapshotCallback>>;

struct Subscriber {
    owner_id: String,
    on_snapshot: SharedCallback,
    // Held for the subscription's lifetime; this backend never fails a read.
    _on_error: ErrorCallback,
}

#[derive(Default)]
struct State {
    tasks: Vec<Task>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
}

/// Process-local backend. Nothing outlives the process.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with `tasks`.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let backend = Self::new();
        if let Ok(mut state) = backend.state.lock() {
            state.tasks = tasks;
        }
        backend
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Backend("memory backend state poisoned".to_string()))
    }

    /// Deliver fresh snapshots outside the state lock.
    fn publish(&self) -> Result<()> {
        let deliveries: Vec<(SharedCallback, Vec<Task>)> = {
            let state = self.lock()?;
            state
                .subscribers
                .values()
                .map(|sub| (Arc::clone(&sub.on_snapshot), owned_by(&state.tasks, &sub.owner_id)))
                .collect()
        };
        for (callback, snapshot) in deliveries {
            if let Ok(mut callback) = callback.lock() {
                (*callback)(snapshot);
            }
        }
        Ok(())
    }
}

impl TaskBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn subscribe(
        &self,
        owner_id: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Result<Subscription> {
        let on_snapshot: SharedCallback = Arc::new(Mutex::new(on_snapshot));
        let (id, initial) = {
            let mut state = self.lock()?;
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.insert(
                id,
                Subscriber {
                    owner_id: owner_id.to_string(),
                    on_snapshot: Arc::clone(&on_snapshot),
                    _on_error: on_error,
                },
            );
            (id, owned_by(&state.tasks, owner_id))
        };
        if let Ok(mut callback) = on_snapshot.lock() {
            (*callback)(initial);
        }

        let state = Arc::downgrade(&self.state);
        Ok(Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                if let Ok(mut state) = state.lock() {
                    state.subscribers.remove(&id);
                }
            }
        }))
    }

    fn snapshot(&self, owner_id: &str) -> Result<Vec<Task>> {
        Ok(owned_by(&self.lock()?.tasks, owner_id))
    }

    fn create(&self, task: &Task) -> Result<String> {
        let mut task = task.clone();
        if task.id.is_empty() {
            task.id = generate_task_id();
        }
        let id = task.id.clone();
        {
            let mut state = self.lock()?;
            if state.tasks.iter().any(|existing| existing.id == id) {
                return Err(Error::Backend(format!("task {id} already exists")));
            }
            state.tasks.push(task);
        }
        self.publish()?;
        Ok(id)
    }

    fn update(&self, task: &Task) -> Result<()> {
        {
            let mut state = self.lock()?;
            let existing = state
                .tasks
                .iter_mut()
                .find(|existing| existing.id == task.id)
                .ok_or_else(|| Error::Backend(format!("task {} does not exist", task.id)))?;
            *existing = task.clone();
        }
        self.publish()
    }

    fn delete(&self, id: &str) -> Result<()> {
        let removed = {
            let mut state = self.lock()?;
            let before = state.tasks.len();
            state.tasks.retain(|task| task.id != id);
            state.tasks.len() != before
        };
        if removed {
            self.publish()?;
        }
        Ok(())
    }
}
