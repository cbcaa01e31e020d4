//! Prioritised queueing of pending work.

pub mod container;
pub mod tracker;

pub use container::{
    Prioritised, PriorityDrain, QueueTrackerContainer, QueueTrackerContainerStatistics,
};
pub use tracker::{QueueTracker, QueueTrackerHolder, QueueTrackerStatistics};
