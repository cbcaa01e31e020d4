//! # Prometheus Bulkhead
//!
//! Priority task scheduling with bulkhead admission and resource throttling.
//!
//! Work is queued per priority level and dispatched by a poll loop that
//! never lets a level exceed its bulkhead (plus overage, when utilization is
//! low). Each dispatched task reports start, retry, exception and end events
//! against the external resources it uses. Those events drive a per-resource
//! adjustment percentage and circuit breaker, and rate limiters built from
//! them throttle new work before it starts.
//!
//! ## Key Features
//!
//! - **Priority Queues**: FIFO per level, drained highest level first
//! - **Bulkheads**: Reserved concurrency per level with optional overage
//! - **Resource Tracking**: Active, retry and timing statistics per resource
//! - **Circuit Breaking**: Closed, open and half-open states with filtered probes
//! - **Rate Limiting**: Admission scaled by the health of every resource a task uses
//! - **Retries and Timeouts**: Policy-driven retries and forced termination
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_bulkhead::builders::TaskManagerBuilder;
//! use prometheus_bulkhead::config::SchedulerConfig;
//! use prometheus_bulkhead::core::TaskTracker;
//! use prometheus_bulkhead::runtime::TokioSpawner;
//!
//! let cfg = SchedulerConfig::from_file("bulkhead.json")?;
//! let manager = TaskManagerBuilder::new(cfg).build(my_executor, TokioSpawner::current())?;
//! manager.start();
//!
//! let profile = manager.resource_tracker().profile("billing-db")?;
//! let consumer = manager
//!     .resource_tracker()
//!     .register_consumer("invoice-sync", Some(&profile))
//!     .expect("tracker running");
//!
//! let handle = manager.submit(TaskTracker::new(job).with_priority(2).with_consumer(consumer))?;
//! let outcome = handle.outcome().await;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and capacity accounting.
pub mod core;
/// Configuration models for the scheduler, resources and retries.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Infrastructure adapters feeding work into the scheduler.
pub mod infra;
/// Runtime adapters for spawning task execution.
pub mod runtime;
/// Shared utilities.
pub mod util;
