//! tm init command implementation
//!
//! Creates the data directory and a default `taskmaster.toml`, optionally
//! seeding the sample task list.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::auth::LocalIdentityProvider;
use crate::backend;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::owner::resolve_owner;
use crate::session::TaskSession;
use crate::storage::Storage;
use crate::task::{Category, Priority, TaskDraft};

pub struct InitOptions {
    pub samples: bool,
    pub dir: Option<PathBuf>,
    pub owner: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(serde::Serialize)]
struct InitReport {
    dir: PathBuf,
    created: InitCreated,
    seeded: Vec<String>,
}

#[derive(serde::Serialize)]
struct InitCreated {
    data_dir: bool,
    config: bool,
}

pub fn run(options: InitOptions) -> Result<()> {
    let storage = Storage::resolve(options.dir.as_deref())?;
    let created_data_dir = !storage.is_initialized();
    storage.init()?;

    let config_path = storage.config_file();
    let created_config = if config_path.exists() {
        false
    } else {
        Config::default().save(&config_path)?;
        true
    };
    let config = Config::load_from_dir(storage.root());

    let seeded = if options.samples {
        seed_samples(&storage, &config, options.owner.as_deref())?
    } else {
        Vec::new()
    };

    let report = InitReport {
        dir: storage.root().to_path_buf(),
        created: InitCreated {
            data_dir: created_data_dir,
            config: created_config,
        },
        seeded: seeded.clone(),
    };

    let mut created_items = Vec::new();
    if created_data_dir {
        created_items.push("data dir");
    }
    if created_config {
        created_items.push("taskmaster.toml");
    }

    let header = if created_items.is_empty() && seeded.is_empty() {
        "tm init: already initialized"
    } else {
        "tm init: initialized"
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("Dir", storage.root().display().to_string());
    human.push_summary(
        "Created",
        if created_items.is_empty() {
            "none".to_string()
        } else {
            created_items.join(", ")
        },
    );
    if !seeded.is_empty() {
        human.push_summary("Sample tasks", seeded.len().to_string());
    }
    human.push_next_step("tm add \"<title>\" --due +1d");
    human.push_next_step("tm list");

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "init",
        &report,
        Some(&human),
    )
}

fn seed_samples(storage: &Storage, config: &Config, owner: Option<&str>) -> Result<Vec<String>> {
    let provider = LocalIdentityProvider::new(storage.clone());
    let owner = resolve_owner(owner, &provider, config)?;
    let backend = backend::open(config, storage)?;
    let clock = Arc::new(SystemClock);
    let now = clock.now();
    let mut session = TaskSession::open(backend, owner.id, clock, config.due_soon.window())?;

    let mut ids = Vec::new();
    for (draft, completed) in sample_drafts(now) {
        let task = session.add_task(&draft)?;
        if completed {
            session.toggle_completion(&task.id);
        }
        ids.push(task.id);
    }
    session.flush()?;
    tracing::info!(count = ids.len(), "seeded sample tasks");
    Ok(ids)
}

/// The starter list: drafts plus whether each begins completed.
fn sample_drafts(now: DateTime<Utc>) -> Vec<(TaskDraft, bool)> {
    vec![
        (
            TaskDraft::new("Complete project proposal")
                .category(Category::Work)
                .priority(Priority::High)
                .due(now + Duration::hours(3)),
            false,
        ),
        (
            TaskDraft::new("Buy groceries")
                .category(Category::Groceries)
                .priority(Priority::Medium)
                .due(now + Duration::hours(24)),
            false,
        ),
        (
            TaskDraft::new("Go for a run")
                .category(Category::Health)
                .priority(Priority::Low),
            true,
        ),
        (
            TaskDraft::new("Pay electricity bill")
                .category(Category::Finance)
                .priority(Priority::High)
                .due(now + Duration::hours(48)),
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::backend::{FileBackend, TaskBackend};

    #[test]
    fn samples_land_in_the_file_backend() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path());
        storage.init().unwrap();

        let ids = seed_samples(&storage, &Config::default(), Some("sampler")).unwrap();
        assert_eq!(ids.len(), 4);

        let backend = FileBackend::open(storage).unwrap();
        let tasks = backend.snapshot("sampler").unwrap();
        let titles: Vec<&str> = tasks.iter().map(|task| task.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Complete project proposal",
                "Buy groceries",
                "Go for a run",
                "Pay electricity bill"
            ]
        );
        assert!(tasks[2].completed);
        assert!(!tasks[0].completed);
    }
}
