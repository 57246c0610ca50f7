//! Filter state for the task list.
//!
//! Four independent selections (status, category, priority, search term)
//! combined conjunctively by [`crate::view::visible_tasks`].

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::{Category, Priority};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Incomplete,
    DueSoon,
}

impl StatusFilter {
    pub const ALL: [StatusFilter; 4] = [
        StatusFilter::All,
        StatusFilter::Incomplete,
        StatusFilter::Completed,
        StatusFilter::DueSoon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Completed => "completed",
            StatusFilter::Incomplete => "incomplete",
            StatusFilter::DueSoon => "due-soon",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "completed" | "done" => Ok(StatusFilter::Completed),
            "incomplete" | "active" => Ok(StatusFilter::Incomplete),
            "due-soon" | "due_soon" | "due" => Ok(StatusFilter::DueSoon),
            other => Err(Error::InvalidArgument(format!(
                "unknown status filter '{other}' (expected all|completed|incomplete|due-soon)"
            ))),
        }
    }
}

/// Either everything or exactly one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Selection<T> {
    #[default]
    All,
    Only(T),
}

impl<T: PartialEq> Selection<T> {
    pub fn admits(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(expected) => expected == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

impl<T: fmt::Display> fmt::Display for Selection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str("all"),
            Selection::Only(value) => value.fmt(f),
        }
    }
}

impl<T: FromStr<Err = Error>> FromStr for Selection<T> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Selection::All);
        }
        s.parse().map(Selection::Only)
    }
}

impl<T: Serialize> Serialize for Selection<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Selection::All => serializer.serialize_str("all"),
            Selection::Only(value) => value.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FilterState {
    pub status: StatusFilter,
    pub category: Selection<Category>,
    pub priority: Selection<Priority>,
    pub search_term: String,
}

impl FilterState {
    pub fn is_default(&self) -> bool {
        self == &FilterState::default()
    }
}

/// Owned filter state with change notification.
#[derive(Debug, Default)]
pub struct FilterStore {
    state: FilterState,
    subscribers: Vec<Sender<FilterState>>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Receive a copy of the state after every change.
    pub fn subscribe(&mut self) -> Receiver<FilterState> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn set_status(&mut self, status: StatusFilter) {
        self.state.status = status;
        self.publish();
    }

    pub fn set_category(&mut self, category: Selection<Category>) {
        self.state.category = category;
        self.publish();
    }

    pub fn set_priority(&mut self, priority: Selection<Priority>) {
        self.state.priority = priority;
        self.publish();
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.state.search_term = term.into();
        self.publish();
    }

    /// Reset all four selections to their defaults.
    pub fn clear(&mut self) {
        self.state = FilterState::default();
        self.publish();
    }

    fn publish(&mut self) {
        let state = &self.state;
        self.subscribers.retain(|tx| tx.send(state.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_replace_values_and_clear_resets() {
        let mut store = FilterStore::new();
        store.set_status(StatusFilter::DueSoon);
        store.set_category(Selection::Only(Category::Work));
        store.set_priority(Selection::Only(Priority::High));
        store.set_search_term("rent");
        assert_eq!(store.state().status, StatusFilter::DueSoon);
        assert_eq!(store.state().category, Selection::Only(Category::Work));
        assert_eq!(store.state().search_term, "rent");
        assert!(!store.state().is_default());

        store.clear();
        assert!(store.state().is_default());
        assert_eq!(store.state().search_term, "");
    }

    #[test]
    fn subscribers_see_every_change() {
        let mut store = FilterStore::new();
        let rx = store.subscribe();
        store.set_search_term("milk");
        store.clear();
        let seen: Vec<FilterState> = rx.try_iter().collect();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].search_term, "milk");
        assert!(seen[1].is_default());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut store = FilterStore::new();
        drop(store.subscribe());
        store.set_status(StatusFilter::Completed);
        assert!(store.subscribers.is_empty());
    }

    #[test]
    fn selections_parse_all_and_values() {
        assert_eq!("all".parse::<Selection<Category>>().unwrap(), Selection::All);
        assert_eq!(
            "finance".parse::<Selection<Category>>().unwrap(),
            Selection::Only(Category::Finance)
        );
        assert_eq!("active".parse::<StatusFilter>().unwrap(), StatusFilter::Incomplete);
        assert_eq!("due-soon".parse::<StatusFilter>().unwrap(), StatusFilter::DueSoon);
        assert!("someday".parse::<StatusFilter>().is_err());
    }
}
