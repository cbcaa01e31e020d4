//! Infrastructure adapters feeding work into the scheduler.

pub mod source;

pub use source::{InMemoryWorkSource, WorkSender};
