//! tm task command implementations.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::LocalIdentityProvider;
use crate::backend;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, MAX_PAGE_SIZE};
use crate::due_soon::notification_message;
use crate::error::{Error, Result};
use crate::filter::{FilterState, Selection, StatusFilter};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::owner::{resolve_owner, Owner};
use crate::session::TaskSession;
use crate::storage::Storage;
use crate::task::{parse_due, Category, Priority, Task, TaskDraft, TaskPatch};
use crate::view::{self, CalendarEvent, Dashboard, Page};

pub struct AddOptions {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub due: Option<String>,
    pub dir: Option<PathBuf>,
    pub owner: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ListOptions {
    pub status: String,
    pub category: String,
    pub priority: String,
    pub search: Option<String>,
    pub page: usize,
    pub page_size: Option<usize>,
    pub dir: Option<PathBuf>,
    pub owner: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct IdOptions {
    pub id: String,
    pub dir: Option<PathBuf>,
    pub owner: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub clear_description: bool,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub due: Option<String>,
    pub clear_due: bool,
    pub dir: Option<PathBuf>,
    pub owner: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct MoveOptions {
    pub from: usize,
    pub to: usize,
    pub dir: Option<PathBuf>,
    pub owner: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

/// Options shared by the read-only report commands and the viewer.
pub struct ReportOptions {
    pub dir: Option<PathBuf>,
    pub owner: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

impl ReportOptions {
    pub fn new(dir: Option<PathBuf>, owner: Option<String>, json: bool, quiet: bool) -> Self {
        Self {
            dir,
            owner,
            json,
            quiet,
        }
    }
}

#[derive(Serialize)]
struct TaskOutput {
    owner: String,
    task: Task,
}

#[derive(Serialize)]
struct EditOutput {
    owner: String,
    changed: bool,
    task: Task,
}

#[derive(Serialize)]
struct ListOutput {
    owner: String,
    filters: FilterState,
    due_soon: Vec<String>,
    page: Page<Task>,
}

#[derive(Serialize)]
struct MoveOutput {
    owner: String,
    from: usize,
    to: usize,
    order: Vec<String>,
}

#[derive(Serialize)]
struct DueItem {
    id: String,
    title: String,
    due_date: Option<DateTime<Utc>>,
    message: String,
}

#[derive(Serialize)]
struct DueOutput {
    owner: String,
    window_hours: i64,
    notifications: Vec<DueItem>,
}

#[derive(Serialize)]
struct StatsOutput {
    owner: String,
    #[serde(flatten)]
    dashboard: Dashboard,
}

#[derive(Serialize)]
struct CalendarOutput {
    owner: String,
    events: Vec<CalendarEvent>,
}

struct TaskContext {
    config: Config,
    owner: Owner,
    session: TaskSession,
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let mut ctx = load_context(options.dir, options.owner)?;

    let mut draft = TaskDraft::new(options.title);
    if let Some(description) = options.description {
        draft = draft.description(description);
    }
    if let Some(category) = options.category.as_deref() {
        draft = draft.category(category.parse()?);
    }
    if let Some(priority) = options.priority.as_deref() {
        draft = draft.priority(priority.parse()?);
    }
    if let Some(due) = options.due.as_deref() {
        draft = draft.due(parse_due(due, SystemClock.now())?);
    }

    let task = ctx.session.add_task(&draft)?;
    ctx.session.flush()?;

    let mut human = HumanOutput::new("Task added");
    human.push_summary("ID", short_id(&task.id));
    human.push_summary("Title", task.title.clone());
    human.push_summary("Category", task.category.as_str());
    human.push_summary("Priority", task.priority.as_str());
    if let Some(due) = task.due_date {
        human.push_summary("Due", format_due(due));
    }
    if ctx.session.notifications().contains(&task.id) {
        human.push_warning(notification_message(&task));
    }

    let output = TaskOutput {
        owner: ctx.owner.id,
        task,
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "add",
        &output,
        Some(&human),
    )
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let mut ctx = load_context(options.dir, options.owner)?;

    let status: StatusFilter = options.status.parse()?;
    let category: Selection<Category> = options.category.parse()?;
    let priority: Selection<Priority> = options.priority.parse()?;
    let page_size = match options.page_size {
        Some(size) if size == 0 || size > MAX_PAGE_SIZE => {
            return Err(Error::InvalidArgument(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Some(size) => size,
        None => ctx.config.view.page_size,
    };

    let filters = ctx.session.filters_mut();
    filters.set_status(status);
    filters.set_category(category);
    filters.set_priority(priority);
    if let Some(search) = options.search {
        filters.set_search_term(search);
    }

    let visible: Vec<Task> = ctx.session.visible().into_iter().cloned().collect();
    let page = view::paginate(&visible, page_size, options.page);
    let notifications = ctx.session.notifications();

    let mut human = HumanOutput::new("Tasks");
    human.push_summary("Owner", ctx.owner.id.clone());
    human.push_summary("Showing", format!("{} of {}", page.items.len(), page.total_items));
    human.push_summary("Page", format!("{}/{}", page.number, page.total_pages));
    if !ctx.session.filters().state().is_default() {
        let state = ctx.session.filters().state();
        human.push_summary(
            "Filters",
            format!(
                "status={} category={} priority={} search={:?}",
                state.status, state.category, state.priority, state.search_term
            ),
        );
    }
    for task in &page.items {
        human.push_detail(format_task_line(task, notifications.contains(&task.id)));
    }
    if page.number < page.total_pages {
        human.push_next_step(format!("tm list --page {}", page.number + 1));
    }

    let output = ListOutput {
        owner: ctx.owner.id.clone(),
        filters: ctx.session.filters().state().clone(),
        due_soon: notifications.ids().to_vec(),
        page,
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "list",
        &output,
        Some(&human),
    )
}

pub fn run_done(options: IdOptions) -> Result<()> {
    let mut ctx = load_context(options.dir, options.owner)?;
    let id = ctx.session.resolve(&options.id)?.id.clone();
    let task = ctx
        .session
        .toggle_completion(&id)
        .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
    ctx.session.flush()?;

    let header = if task.completed {
        "Task completed"
    } else {
        "Task reopened"
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("ID", short_id(&task.id));
    human.push_summary("Title", task.title.clone());

    let output = TaskOutput {
        owner: ctx.owner.id,
        task,
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "done",
        &output,
        Some(&human),
    )
}

pub fn run_rm(options: IdOptions) -> Result<()> {
    let mut ctx = load_context(options.dir, options.owner)?;
    let id = ctx.session.resolve(&options.id)?.id.clone();
    let task = ctx
        .session
        .delete_task(&id)
        .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
    ctx.session.flush()?;

    let mut human = HumanOutput::new("Task deleted");
    human.push_summary("ID", short_id(&task.id));
    human.push_summary("Title", task.title.clone());

    let output = TaskOutput {
        owner: ctx.owner.id,
        task,
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "rm",
        &output,
        Some(&human),
    )
}

pub fn run_edit(options: EditOptions) -> Result<()> {
    let mut ctx = load_context(options.dir, options.owner)?;
    let now = SystemClock.now();

    let mut patch = TaskPatch {
        title: options.title,
        ..TaskPatch::default()
    };
    if options.clear_description {
        patch.description = Some(None);
    } else if let Some(description) = options.description {
        patch.description = Some(Some(description));
    }
    if let Some(category) = options.category.as_deref() {
        patch.category = Some(category.parse()?);
    }
    if let Some(priority) = options.priority.as_deref() {
        patch.priority = Some(priority.parse()?);
    }
    if options.clear_due {
        patch.due_date = Some(None);
    } else if let Some(due) = options.due.as_deref() {
        patch.due_date = Some(Some(parse_due(due, now)?));
    }
    if patch.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to edit (pass --title, --description, --category, --priority or --due)"
                .to_string(),
        ));
    }

    let current = ctx.session.resolve(&options.id)?.clone();
    let edited = ctx.session.edit_task(&current.id, &patch)?;
    ctx.session.flush()?;

    let changed = edited.is_some();
    let task = edited.unwrap_or(current);
    let mut human = HumanOutput::new(if changed {
        "Task updated"
    } else {
        "Task unchanged"
    });
    human.push_summary("ID", short_id(&task.id));
    human.push_summary("Title", task.title.clone());
    human.push_summary("Category", task.category.as_str());
    human.push_summary("Priority", task.priority.as_str());
    if let Some(due) = task.due_date {
        human.push_summary("Due", format_due(due));
    }

    let output = EditOutput {
        owner: ctx.owner.id,
        changed,
        task,
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "edit",
        &output,
        Some(&human),
    )
}

pub fn run_move(options: MoveOptions) -> Result<()> {
    let mut ctx = load_context(options.dir, options.owner)?;
    let len = ctx.session.tasks().len();
    for (label, value) in [("from", options.from), ("to", options.to)] {
        if value == 0 || value > len {
            return Err(Error::InvalidArgument(format!(
                "{label} position {value} is out of range (1..={len})"
            )));
        }
    }

    ctx.session.move_task(options.from - 1, options.to - 1);
    ctx.session.flush()?;

    let mut human = HumanOutput::new("Task moved");
    human.push_summary("From", options.from.to_string());
    human.push_summary("To", options.to.to_string());
    for (index, task) in ctx.session.tasks().iter().enumerate() {
        human.push_detail(format!("{}. {}", index + 1, task.title));
    }

    let output = MoveOutput {
        owner: ctx.owner.id.clone(),
        from: options.from,
        to: options.to,
        order: ctx.session.tasks().iter().map(|task| task.id.clone()).collect(),
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "move",
        &output,
        Some(&human),
    )
}

pub fn run_due(options: ReportOptions) -> Result<()> {
    let ctx = load_context(options.dir, options.owner)?;
    let notifications: Vec<DueItem> = ctx
        .session
        .notifications()
        .ids()
        .iter()
        .filter_map(|id| ctx.session.store().get(id))
        .map(|task| DueItem {
            id: task.id.clone(),
            title: task.title.clone(),
            due_date: task.due_date,
            message: notification_message(task),
        })
        .collect();

    let mut human = HumanOutput::new(if notifications.is_empty() {
        "Nothing due soon"
    } else {
        "Due soon"
    });
    human.push_summary("Window", format!("{}h", ctx.config.due_soon.window_hours));
    for item in &notifications {
        human.push_detail(format!("{} {}", short_id(&item.id), item.message));
    }

    let output = DueOutput {
        owner: ctx.owner.id.clone(),
        window_hours: ctx.config.due_soon.window_hours,
        notifications,
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "due",
        &output,
        Some(&human),
    )
}

pub fn run_stats(options: ReportOptions) -> Result<()> {
    let ctx = load_context(options.dir, options.owner)?;
    let dashboard = view::dashboard(ctx.session.tasks(), ctx.session.notifications());

    let mut human = HumanOutput::new("Task stats");
    human.push_summary("Total", dashboard.total.to_string());
    human.push_summary("Completed", dashboard.completed.to_string());
    human.push_summary("Incomplete", dashboard.incomplete.to_string());
    human.push_summary("Due soon", dashboard.due_soon.to_string());
    for count in &dashboard.per_category {
        human.push_detail(format!(
            "{}: {} ({} done, {} open)",
            count.category, count.total, count.completed, count.incomplete
        ));
    }

    let output = StatsOutput {
        owner: ctx.owner.id.clone(),
        dashboard,
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "stats",
        &output,
        Some(&human),
    )
}

pub fn run_calendar(options: ReportOptions) -> Result<()> {
    let ctx = load_context(options.dir, options.owner)?;
    let events = view::calendar_events(ctx.session.tasks());

    let mut human = HumanOutput::new("Calendar");
    human.push_summary("Events", events.len().to_string());
    for event in &events {
        let mark = if event.completed { "x" } else { " " };
        human.push_detail(format!("[{mark}] {} {}", format_due(event.start), event.title));
    }

    let output = CalendarOutput {
        owner: ctx.owner.id.clone(),
        events,
    };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "calendar",
        &output,
        Some(&human),
    )
}

pub fn run_view(options: ReportOptions) -> Result<()> {
    if options.json {
        return Err(Error::InvalidArgument(
            "view is interactive and does not support --json".to_string(),
        ));
    }
    let ctx = load_context(options.dir, options.owner)?;
    crate::ui::task_viewer::run(ctx.session, &ctx.config)
}

fn load_context(dir: Option<PathBuf>, owner: Option<String>) -> Result<TaskContext> {
    let storage = Storage::resolve(dir.as_deref())?;
    let config = Config::load_from_dir(storage.root());
    let provider = LocalIdentityProvider::new(storage.clone());
    let owner = resolve_owner(owner.as_deref(), &provider, &config)?;
    let backend = backend::open(&config, &storage)?;
    let session = TaskSession::open(
        backend,
        owner.id.clone(),
        Arc::new(SystemClock),
        config.due_soon.window(),
    )?;
    tracing::debug!(owner = %owner.id, source = ?owner.source, "task context loaded");
    Ok(TaskContext {
        config,
        owner,
        session,
    })
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn format_due(due: DateTime<Utc>) -> String {
    due.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn format_task_line(task: &Task, due_soon: bool) -> String {
    let mark = if task.completed { "x" } else { " " };
    let mut line = format!(
        "[{mark}] {} [{}][{}] {}",
        short_id(&task.id),
        task.priority,
        task.category,
        task.title
    );
    if let Some(due) = task.due_date {
        line.push_str(&format!(" (due {})", format_due(due)));
    }
    if due_soon {
        line.push_str(" !");
    }
    line
}
