//! Terminal user interfaces.

pub mod task_viewer;
