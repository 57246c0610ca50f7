//! Derived views over the task list.
//!
//! Everything here is a pure function of the stored tasks, the filter state
//! and the notification set. Stored order is preserved; nothing re-sorts the
//! list except [`calendar_events`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::due_soon::NotificationSet;
use crate::filter::{FilterState, StatusFilter};
use crate::task::{Category, Task};

pub fn matches_filters(task: &Task, filters: &FilterState, notifications: &NotificationSet, needle: &str) -> bool {
    let status_ok = match filters.status {
        StatusFilter::All => true,
        StatusFilter::Completed => task.completed,
        StatusFilter::Incomplete => !task.completed,
        StatusFilter::DueSoon => !task.completed && notifications.contains(&task.id),
    };
    status_ok
        && filters.category.admits(&task.category)
        && filters.priority.admits(&task.priority)
        && task.matches_search(needle)
}

/// Tasks passing every active filter, in stored order.
pub fn visible_tasks<'a>(
    tasks: &'a [Task],
    filters: &FilterState,
    notifications: &NotificationSet,
) -> Vec<&'a Task> {
    let needle = filters.search_term.to_lowercase();
    tasks
        .iter()
        .filter(|task| matches_filters(task, filters, notifications, &needle))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// 1-based page number after clamping.
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub page_size: usize,
    pub items: Vec<T>,
}

pub fn page_count(total_items: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    total_items.div_ceil(page_size).max(1)
}

/// Slice `items` into the requested page. Out-of-range page numbers clamp to
/// the nearest valid page; an empty input yields a single empty page.
pub fn paginate<T: Clone>(items: &[T], page_size: usize, requested: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_pages = page_count(items.len(), page_size);
    let number = requested.clamp(1, total_pages);
    let start = (number - 1) * page_size;
    let end = (start + page_size).min(items.len());
    Page {
        number,
        total_pages,
        total_items: items.len(),
        page_size,
        items: items.get(start..end).unwrap_or_default().to_vec(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub total: usize,
    pub completed: usize,
    pub incomplete: usize,
}

/// Counts for every category, zeros included, in [`Category::ALL`] order.
pub fn category_counts(tasks: &[Task]) -> Vec<CategoryCount> {
    Category::ALL
        .iter()
        .map(|category| {
            let (total, completed) = tasks
                .iter()
                .filter(|task| task.category == *category)
                .fold((0, 0), |(total, completed), task| {
                    (total + 1, completed + usize::from(task.completed))
                });
            CategoryCount {
                category: *category,
                total,
                completed,
                incomplete: total - completed,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub total: usize,
    pub completed: usize,
    pub incomplete: usize,
    pub due_soon: usize,
    pub per_category: Vec<CategoryCount>,
}

pub fn dashboard(tasks: &[Task], notifications: &NotificationSet) -> Dashboard {
    let completed = tasks.iter().filter(|task| task.completed).count();
    let due_soon = tasks
        .iter()
        .filter(|task| !task.completed && notifications.contains(&task.id))
        .count();
    Dashboard {
        total: tasks.len(),
        completed,
        incomplete: tasks.len() - completed,
        due_soon,
        per_category: category_counts(tasks),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub task_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub completed: bool,
}

/// One point-in-time event per task with a due date, earliest first.
pub fn calendar_events(tasks: &[Task]) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = tasks
        .iter()
        .filter_map(|task| {
            task.due_date.map(|due| CalendarEvent {
                task_id: task.id.clone(),
                title: task.title.clone(),
                start: due,
                end: due,
                completed: task.completed,
            })
        })
        .collect();
    events.sort_by(|a, b| a.start.cmp(&b.start));
    events
}
