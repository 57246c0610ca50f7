//! Drag-style reordering.
//!
//! Every hover step over a different row moves the dragged task immediately
//! and re-targets the drag source to the hovered index, so consecutive hover
//! events chain against the live list rather than the position where the drag
//! started.

use crate::task::Task;

/// Remove the element at `from` and insert it at `to`.
///
/// Returns `false` (leaving `items` untouched) when the indices are equal or
/// out of range.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from == to || from >= items.len() || to >= items.len() {
        return false;
    }
    let item = items.remove(from);
    items.insert(to, item);
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderController {
    source: Option<usize>,
}

impl ReorderController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start dragging the row at `index` of the visible list.
    pub fn begin(&mut self, index: usize) {
        self.source = Some(index);
    }

    pub fn source(&self) -> Option<usize> {
        self.source
    }

    pub fn is_dragging(&self) -> bool {
        self.source.is_some()
    }

    /// Handle a hover over visible row `target`.
    ///
    /// `visible_ids` is the displayed order (possibly filtered); `tasks` is the
    /// full stored list. The dragged task takes the stored position of the
    /// hovered task. Returns the reordered full list when a move happened.
    pub fn hover(&mut self, target: usize, visible_ids: &[String], tasks: &[Task]) -> Option<Vec<Task>> {
        let source = self.source?;
        if source == target {
            return None;
        }
        let source_id = visible_ids.get(source)?;
        let target_id = visible_ids.get(target)?;
        let from = tasks.iter().position(|task| &task.id == source_id)?;
        let to = tasks.iter().position(|task| &task.id == target_id)?;

        let mut next = tasks.to_vec();
        if !move_item(&mut next, from, to) {
            return None;
        }
        self.source = Some(target);
        Some(next)
    }

    /// Finish the drag, returning the final index of the dragged row.
    pub fn end(&mut self) -> Option<usize> {
        self.source.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::task::TaskDraft;

    fn tasks(ids: &[&str]) -> Vec<Task> {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        ids.iter()
            .map(|id| Task::from_draft(*id, &TaskDraft::new(*id), "owner", now).expect("task"))
            .collect()
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    fn visible(tasks: &[Task]) -> Vec<String> {
        tasks.iter().map(|task| task.id.clone()).collect()
    }

    #[test]
    fn move_item_splices() {
        let mut items = vec![1, 2, 3, 4];
        assert!(move_item(&mut items, 0, 2));
        assert_eq!(items, vec![2, 3, 1, 4]);
        assert!(move_item(&mut items, 3, 0));
        assert_eq!(items, vec![4, 2, 3, 1]);
        assert!(!move_item(&mut items, 1, 1));
        assert!(!move_item(&mut items, 9, 0));
        assert_eq!(items, vec![4, 2, 3, 1]);
    }

    #[test]
    fn hover_chains_against_live_index() {
        let mut list = tasks(&["a", "b", "c", "d"]);
        let mut controller = ReorderController::new();
        controller.begin(0);

        for target in 1..=3 {
            let ids_now = visible(&list);
            list = controller.hover(target, &ids_now, &list).expect("moved");
        }
        assert_eq!(ids(&list), vec!["b", "c", "d", "a"]);
        assert_eq!(controller.source(), Some(3));

        let ids_now = visible(&list);
        assert!(controller.hover(3, &ids_now, &list).is_none());
        assert_eq!(controller.end(), Some(3));
        assert!(!controller.is_dragging());
    }

    #[test]
    fn hover_preserves_membership() {
        let mut list = tasks(&["a", "b", "c", "d", "e"]);
        let mut controller = ReorderController::new();
        controller.begin(4);
        for target in [2, 0, 3, 1] {
            let ids_now = visible(&list);
            if let Some(next) = controller.hover(target, &ids_now, &list) {
                list = next;
            }
        }
        let mut sorted = ids(&list);
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn hover_maps_filtered_rows_to_stored_positions() {
        let list = tasks(&["a", "b", "c", "d"]);
        let filtered = vec!["b".to_string(), "d".to_string()];
        let mut controller = ReorderController::new();
        controller.begin(1);
        let next = controller.hover(0, &filtered, &list).expect("moved");
        assert_eq!(ids(&next), vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn hover_without_drag_is_ignored() {
        let list = tasks(&["a", "b"]);
        let mut controller = ReorderController::new();
        assert!(controller.hover(1, &visible(&list), &list).is_none());
    }
}
