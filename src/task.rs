//! Task model for taskmaster.
//!
//! A task belongs to exactly one owner (an external identity uid). Tasks carry
//! a per-task `version` that increases on every local mutation so that stale
//! backend snapshots can be told apart from newer optimistic edits.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

const INITIAL_VERSION: u64 = 1;

fn initial_version() -> u64 {
    INITIAL_VERSION
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Personal,
    Work,
    Groceries,
    Health,
    Finance,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Personal,
        Category::Work,
        Category::Groceries,
        Category::Health,
        Category::Finance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Work => "work",
            Category::Groceries => "groceries",
            Category::Health => "health",
            Category::Finance => "finance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown category '{trimmed}' (expected personal|work|groceries|health|finance)"
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Priority::ALL
            .into_iter()
            .find(|priority| priority.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown priority '{trimmed}' (expected high|medium|low)"
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: Category,
    pub priority: Priority,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner_id: String,
    #[serde(default = "initial_version")]
    pub version: u64,
    #[serde(default)]
    pub position: u64,
}

impl Task {
    /// Build a task from a draft. Returns `None` when the trimmed title is empty.
    pub fn from_draft(
        id: impl Into<String>,
        draft: &TaskDraft,
        owner_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let title = draft.title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            id: id.into(),
            title: title.to_string(),
            description: normalize_description(draft.description.as_deref()),
            category: draft.category,
            priority: draft.priority,
            completed: false,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
            owner_id: owner_id.into(),
            version: INITIAL_VERSION,
            position: 0,
        })
    }

    /// Case-insensitive substring match on title and description.
    ///
    /// `needle` must already be lowercased.
    pub fn matches_search(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        if self.title.to_lowercase().contains(needle) {
            return true;
        }
        self.description
            .as_deref()
            .map(|description| description.to_lowercase().contains(needle))
            .unwrap_or(false)
    }

    /// Equal in everything a user edits; ignores list position and bookkeeping.
    pub fn same_content(&self, other: &Task) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.category == other.category
            && self.priority == other.priority
            && self.completed == other.completed
            && self.due_date == other.due_date
    }

    /// Record a local mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    /// Apply an edit. Returns whether anything changed; an empty title is ignored.
    pub fn apply_patch(&mut self, patch: &TaskPatch, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        if let Some(title) = patch.title.as_deref().map(str::trim) {
            if !title.is_empty() && title != self.title {
                self.title = title.to_string();
                changed = true;
            }
        }
        if let Some(description) = patch.description.as_ref() {
            let description = normalize_description(description.as_deref());
            if description != self.description {
                self.description = description;
                changed = true;
            }
        }
        if let Some(category) = patch.category {
            if category != self.category {
                self.category = category;
                changed = true;
            }
        }
        if let Some(priority) = patch.priority {
            if priority != self.priority {
                self.priority = priority;
                changed = true;
            }
        }
        if let Some(due_date) = patch.due_date {
            if due_date != self.due_date {
                self.due_date = due_date;
                changed = true;
            }
        }
        if changed {
            self.touch(now);
        }
        changed
    }
}

/// Input for the add-task operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial edit of a task. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }
}

pub fn generate_task_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parse a due date given as RFC 3339, `YYYY-MM-DD` (midnight UTC) or a
/// relative offset such as `+3h`, `+30m`, `+2d`, `+1w`.
pub fn parse_due(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument("due date cannot be empty".to_string()));
    }

    if let Some(offset) = trimmed.strip_prefix('+') {
        return Ok(now + parse_offset(offset)?);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(Error::InvalidArgument(format!(
        "invalid due date '{trimmed}' (expected RFC 3339, YYYY-MM-DD or +N[m|h|d|w])"
    )))
}

fn parse_offset(s: &str) -> Result<Duration> {
    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, "h"),
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("invalid offset number: {num_str}")))?;

    let duration = match unit.to_lowercase().as_str() {
        "m" | "min" | "minutes" => Duration::minutes(num),
        "h" | "hr" | "hours" => Duration::hours(num),
        "d" | "day" | "days" => Duration::days(num),
        "w" | "week" | "weeks" => Duration::weeks(num),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "invalid offset unit '{unit}'. Expected: m, h, d, w"
            )));
        }
    };

    Ok(duration)
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn from_draft_trims_title_and_sets_defaults() {
        let task = Task::from_draft("t1", &TaskDraft::new("  Pay rent  "), "owner", now())
            .expect("task");
        assert_eq!(task.title, "Pay rent");
        assert_eq!(task.category, Category::Personal);
        assert_eq!(task.priority, Priority::Medium);
        assert!(!task.completed);
        assert_eq!(task.version, 1);
        assert_eq!(task.created_at, now());
    }

    #[test]
    fn from_draft_rejects_blank_title() {
        assert!(Task::from_draft("t1", &TaskDraft::new("   "), "owner", now()).is_none());
    }

    #[test]
    fn search_covers_title_and_description() {
        let task = Task::from_draft(
            "t1",
            &TaskDraft::new("Buy groceries").description("Milk and EGGS"),
            "owner",
            now(),
        )
        .expect("task");
        assert!(task.matches_search("grocer"));
        assert!(task.matches_search("eggs"));
        assert!(task.matches_search(""));
        assert!(!task.matches_search("rent"));
    }

    #[test]
    fn patch_bumps_version_only_on_change() {
        let mut task = Task::from_draft("t1", &TaskDraft::new("Run"), "owner", now()).expect("task");
        let unchanged = TaskPatch {
            title: Some("Run".to_string()),
            ..TaskPatch::default()
        };
        assert!(!task.apply_patch(&unchanged, now()));
        assert_eq!(task.version, 1);

        let patch = TaskPatch {
            priority: Some(Priority::High),
            due_date: Some(Some(now())),
            ..TaskPatch::default()
        };
        assert!(task.apply_patch(&patch, now()));
        assert_eq!(task.version, 2);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.due_date, Some(now()));

        let clear = TaskPatch {
            due_date: Some(None),
            ..TaskPatch::default()
        };
        assert!(task.apply_patch(&clear, now()));
        assert_eq!(task.due_date, None);
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("Work".parse::<Category>().unwrap(), Category::Work);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn parse_due_accepts_relative_and_absolute() {
        assert_eq!(parse_due("+3h", now()).unwrap(), now() + Duration::hours(3));
        assert_eq!(parse_due("+2d", now()).unwrap(), now() + Duration::days(2));
        assert_eq!(
            parse_due("2026-03-05", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_due("2026-03-05T10:30:00Z", now()).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 5, 10, 30, 0).unwrap()
        );
        assert!(parse_due("tomorrow", now()).is_err());
        assert!(parse_due("+3y", now()).is_err());
    }
}
