//! Builders that assemble scheduler components from configuration.

pub mod task_manager_builder;

pub use task_manager_builder::{build_task_manager, TaskManagerBuilder};
