use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, TimeZone, Utc};
use taskmaster::backend::{
    ErrorCallback, FileBackend, MemoryBackend, SnapshotCallback, Subscription, TaskBackend,
};
use taskmaster::clock::FixedClock;
use taskmaster::config::BackendKind;
use taskmaster::session::TaskSession;
use taskmaster::storage::Storage;
use taskmaster::store::TaskStore;
use taskmaster::task::{Category, Priority, Task, TaskDraft, TaskPatch};
use taskmaster::{Error, Result};
use tempfile::TempDir;

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
    ))
}

fn open(backend: Arc<dyn TaskBackend>, owner: &str, clock: Arc<FixedClock>) -> TaskSession {
    TaskSession::open(backend, owner, clock, Duration::hours(24)).expect("open session")
}

fn titles(session: &TaskSession) -> Vec<String> {
    session.tasks().iter().map(|task| task.title.clone()).collect()
}

/// Pump until `done` holds or the deadline passes.
fn pump_until(session: &mut TaskSession, mut done: impl FnMut(&TaskSession) -> bool) -> bool {
    let deadline = Instant::now() + StdDuration::from_secs(10);
    while Instant::now() < deadline {
        session.pump();
        if done(session) {
            return true;
        }
        thread::sleep(StdDuration::from_millis(25));
    }
    false
}

/// Memory backend whose next update is refused.
struct RefusingBackend {
    inner: MemoryBackend,
    refuse_update: AtomicBool,
}

impl TaskBackend for RefusingBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn subscribe(
        &self,
        owner_id: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Result<Subscription> {
        self.inner.subscribe(owner_id, on_snapshot, on_error)
    }

    fn snapshot(&self, owner_id: &str) -> Result<Vec<Task>> {
        self.inner.snapshot(owner_id)
    }

    fn create(&self, task: &Task) -> Result<String> {
        self.inner.create(task)
    }

    fn update(&self, task: &Task) -> Result<()> {
        if self.refuse_update.swap(false, Ordering::SeqCst) {
            return Err(Error::Backend("permission denied".to_string()));
        }
        self.inner.update(task)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id)
    }
}

#[test]
fn memory_sessions_share_snapshots() {
    let backend: Arc<dyn TaskBackend> = Arc::new(MemoryBackend::new());
    let clock = clock();
    let mut writer = open(Arc::clone(&backend), "u1", Arc::clone(&clock));
    let mut reader = open(Arc::clone(&backend), "u1", Arc::clone(&clock));
    let mut stranger = open(Arc::clone(&backend), "u2", clock);

    let task = writer.add_task(&TaskDraft::new("Pay rent")).expect("add");
    writer.flush().expect("flush");

    reader.pump();
    assert_eq!(titles(&reader), vec!["Pay rent"]);
    stranger.pump();
    assert!(stranger.tasks().is_empty());

    writer.toggle_completion(&task.id);
    writer.flush().expect("flush");
    reader.pump();
    assert!(reader.tasks()[0].completed);

    writer.delete_task(&task.id);
    writer.flush().expect("flush");
    reader.pump();
    assert!(reader.tasks().is_empty());
    assert!(writer.tasks().is_empty());
}

#[test]
fn file_backend_survives_reopen() {
    let temp = TempDir::new().expect("tempdir");
    let clock = clock();

    {
        let backend = Arc::new(FileBackend::open(Storage::new(temp.path())).expect("backend"));
        let mut session = open(backend, "u1", Arc::clone(&clock));
        session
            .add_task(
                &TaskDraft::new("Ship release")
                    .category(Category::Work)
                    .priority(Priority::High),
            )
            .expect("add");
        session.add_task(&TaskDraft::new("Standup")).expect("add");
        assert!(session.move_task(1, 0));
        session.flush().expect("flush");
    }

    let backend = Arc::new(FileBackend::open(Storage::new(temp.path())).expect("backend"));
    let session = open(backend, "u1", clock);
    assert_eq!(titles(&session), vec!["Standup", "Ship release"]);
    assert_eq!(session.tasks()[1].category, Category::Work);
}

#[test]
fn file_backend_pushes_changes_from_another_session() {
    let temp = TempDir::new().expect("tempdir");
    let clock = clock();
    let storage = Storage::new(temp.path());

    let mut watcher = open(
        Arc::new(FileBackend::open(storage.clone()).expect("backend")),
        "u1",
        Arc::clone(&clock),
    );
    let mut writer = open(
        Arc::new(FileBackend::open(storage).expect("backend")),
        "u1",
        clock,
    );

    writer.add_task(&TaskDraft::new("From elsewhere")).expect("add");
    writer.flush().expect("flush");

    assert!(pump_until(&mut watcher, |session| titles(session) == vec!["From elsewhere"]));
}

#[test]
fn newer_local_edit_survives_a_stale_snapshot() {
    let backend = MemoryBackend::new();
    let clock = clock();
    let shared: Arc<dyn TaskBackend> = Arc::new(backend.clone());
    let mut session = open(Arc::clone(&shared), "u1", clock);

    let task = session.add_task(&TaskDraft::new("Draft")).expect("add");
    session.flush().expect("flush");

    // A snapshot carrying the pre-edit version arrives after the local edit.
    let stale = shared.snapshot("u1").expect("snapshot");
    let patch = TaskPatch {
        title: Some("Final".to_string()),
        ..TaskPatch::default()
    };
    session.edit_task(&task.id, &patch).expect("edit");
    let mut store = TaskStore::with_tasks(session.tasks().to_vec());
    let report = store.replace_all(stale);
    assert_eq!(report.kept_newer, vec![task.id.clone()]);
    assert_eq!(store.tasks()[0].title, "Final");

    session.flush().expect("flush");
    assert_eq!(titles(&session), vec!["Final"]);
}

#[test]
fn due_soon_tracks_the_clock() {
    let backend: Arc<dyn TaskBackend> = Arc::new(MemoryBackend::new());
    let clock = clock();
    let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap();
    let mut session = open(backend, "u1", Arc::clone(&clock));

    let later = session
        .add_task(&TaskDraft::new("Next week").due(now + Duration::hours(30)))
        .expect("add");
    assert!(session.notifications().is_empty());

    clock.advance(Duration::hours(7));
    assert!(session.refresh_notifications());
    assert!(session.notifications().contains(&later.id));

    assert!(session.dismiss_notification(&later.id));
    assert!(!session.refresh_notifications());
    assert!(session.notifications().is_empty());

    let patch = TaskPatch {
        priority: Some(Priority::High),
        ..TaskPatch::default()
    };
    session.edit_task(&later.id, &patch).expect("edit");
    assert!(session.notifications().contains(&later.id));
}

#[test]
fn dismissal_survives_dragging_another_task_past() {
    let backend: Arc<dyn TaskBackend> = Arc::new(MemoryBackend::new());
    let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap();
    let mut session = open(backend, "u1", clock());

    session.add_task(&TaskDraft::new("a")).expect("add");
    let b = session
        .add_task(&TaskDraft::new("b").due(now + Duration::hours(2)))
        .expect("add");
    assert!(session.notifications().contains(&b.id));
    assert!(session.dismiss_notification(&b.id));

    assert!(session.move_task(0, 1));
    session.refresh_notifications();
    assert!(!session.notifications().contains(&b.id));

    session.flush().expect("flush");
    assert_eq!(titles(&session), vec!["b", "a"]);
    assert!(!session.notifications().contains(&b.id));
}

#[test]
fn monitor_ticks_refresh_notifications() {
    let backend: Arc<dyn TaskBackend> = Arc::new(MemoryBackend::new());
    let clock = clock();
    let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap();
    let mut session = open(backend, "u1", Arc::clone(&clock));
    let task = session
        .add_task(&TaskDraft::new("Renew").due(now + Duration::hours(25)))
        .expect("add");

    let monitor = session
        .spawn_monitor(StdDuration::from_millis(20))
        .expect("monitor");
    clock.advance(Duration::hours(2));
    let id = task.id.clone();
    assert!(pump_until(&mut session, |session| session
        .notifications()
        .contains(&id)));
    monitor.stop();
}

#[test]
fn refused_update_is_rolled_back_by_the_next_snapshot() {
    let backend = Arc::new(RefusingBackend {
        inner: MemoryBackend::new(),
        refuse_update: AtomicBool::new(false),
    });
    let shared: Arc<dyn TaskBackend> = Arc::clone(&backend) as Arc<dyn TaskBackend>;
    let mut session = open(Arc::clone(&shared), "u1", clock());

    let task = session.add_task(&TaskDraft::new("Pay rent")).expect("add");
    session.flush().expect("flush");

    backend.refuse_update.store(true, Ordering::SeqCst);
    session.toggle_completion(&task.id);
    assert!(session.flush().is_err());

    // Any later write brings a fresh snapshot.
    session.add_task(&TaskDraft::new("Call bank")).expect("add");
    session.flush().expect("flush");

    let stored = shared.snapshot("u1").expect("snapshot");
    let local = session.tasks().iter().find(|t| t.id == task.id).expect("task");
    let remote = stored.iter().find(|t| t.id == task.id).expect("task");
    assert!(!remote.completed);
    assert_eq!(local, remote);
    assert_eq!(titles(&session), vec!["Pay rent", "Call bank"]);

    let report = session.last_reconciliation().expect("reconciled");
    assert!(report.kept_newer.is_empty());
    assert_eq!(report.reverted_failed_updates, vec![task.id.clone()]);
}
