//! Task manager: prioritised admission, dispatch and completion tracking.
//!
//! Each poll cycle walks the priority levels from highest to lowest. For a
//! level it claims the free bulkhead slots (plus overage when the
//! [`OveragePolicy`] allows), reserves them, dequeues up to that many
//! trackers and admits each one against its rate limiter before starting it.
//! Reservations not turned into running work are released before the cycle
//! moves on. Dispatch is fire-and-track: the cycle never waits on work.
//!
//! Work that outlives its time limit first sees its cancellation signal and
//! is dropped once the cancel grace has also passed.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::core::executor::{TaskExecutor, WorkSource};
use crate::core::priority::{
    OveragePolicy, PrioritySettingsStatistics, TaskManagerPrioritySettings, Utilization,
    UtilizationOveragePolicy,
};
use crate::core::queue::{QueueTracker, QueueTrackerContainer, QueueTrackerContainerStatistics};
use crate::core::resource::{
    Admission, ResourceRequestGuard, ResourceRequestResult, ResourceTracker,
    ResourceTrackerStatistics,
};
use crate::core::retry::{PriorityRetryPolicy, RetryPolicy};
use crate::core::task::{
    CancellationSignal, TaskContext, TaskHandle, TaskOutcome, TaskPayload, TaskTracker,
};
use crate::core::{SchedulerError, TaskError};
use crate::util::clock;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn a future that runs to completion in the background.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// What to do with work refused by its rate limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleAction {
    /// Return the work to the head of its level for a later cycle.
    #[default]
    Requeue,
    /// Discard the work and report it as dropped.
    Drop,
}

/// Timing and batching limits of the task manager.
#[derive(Debug, Clone)]
pub struct TaskManagerLimits {
    /// Level used for work that carries no priority.
    pub default_priority: usize,
    /// Maximum wait between poll cycles.
    pub poll_interval: Duration,
    /// Maximum tasks dispatched per poll cycle.
    pub poll_batch_limit: Option<usize>,
    /// Time after which running work is signalled to cancel.
    pub process_timeout: Duration,
    /// Time granted after the cancellation signal before the work is
    /// forcibly terminated.
    pub cancel_grace: Duration,
    /// Handling of rate-limited work.
    pub throttle_action: ThrottleAction,
}

impl Default for TaskManagerLimits {
    fn default() -> Self {
        Self {
            default_priority: 1,
            poll_interval: Duration::from_millis(100),
            poll_batch_limit: None,
            process_timeout: Duration::from_secs(30),
            cancel_grace: Duration::from_secs(1),
            throttle_action: ThrottleAction::Requeue,
        }
    }
}

/// Pluggable policies consulted by the task manager.
#[derive(Clone)]
pub struct TaskManagerPolicies {
    /// When levels may burst into their overage.
    pub overage: Arc<dyn OveragePolicy>,
    /// How failed work is retried.
    pub retry: Arc<dyn RetryPolicy>,
}

impl Default for TaskManagerPolicies {
    fn default() -> Self {
        Self {
            overage: Arc::new(UtilizationOveragePolicy::default()),
            retry: Arc::new(PriorityRetryPolicy::default()),
        }
    }
}

impl std::fmt::Debug for TaskManagerPolicies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManagerPolicies").finish_non_exhaustive()
    }
}

/// Aggregate statistics of a task manager.
#[derive(Debug, Clone, Serialize)]
pub struct TaskManagerStatistics {
    /// Whether the poll loop is running.
    pub running: bool,
    /// Work submitted or pulled from sources.
    pub submitted: u64,
    /// Dispatch attempts started.
    pub dispatched: u64,
    /// Work completed.
    pub completed: u64,
    /// Work failed after exhausting retries.
    pub failed: u64,
    /// Work timed out on its final attempt.
    pub timed_out: u64,
    /// Retries scheduled.
    pub retried: u64,
    /// Admission checks refused by rate limiters.
    pub throttled: u64,
    /// Work discarded.
    pub dropped: u64,
    /// Executor panics caught at the dispatch boundary.
    pub panicked: u64,
    /// Per-level bulkhead counters, lowest level first.
    pub levels: Vec<PrioritySettingsStatistics>,
    /// Queue statistics.
    pub queues: QueueTrackerContainerStatistics,
    /// Resource statistics.
    pub resources: ResourceTrackerStatistics,
}

#[derive(Debug, Default)]
struct TaskCounters {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    retried: AtomicU64,
    throttled: AtomicU64,
    dropped: AtomicU64,
    panicked: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct Shared<P> {
    limits: TaskManagerLimits,
    queues: QueueTrackerContainer<TaskTracker<P>>,
    priorities: Box<[TaskManagerPrioritySettings]>,
    tracker: Arc<ResourceTracker>,
    policies: TaskManagerPolicies,
    sources: RwLock<Vec<Arc<dyn WorkSource<P>>>>,
    counters: TaskCounters,
    running: AtomicBool,
    stopped: AtomicBool,
    wake: Notify,
}

enum Execution {
    Completed,
    Failed(TaskError),
    Panicked,
    TimedOut,
}

/// Scheduler composing the queue container, per-level bulkheads and the
/// resource tracker.
pub struct TaskManager<P, E, S>
where
    P: TaskPayload,
{
    shared: Arc<Shared<P>>,
    executor: E,
    spawner: S,
}

impl<P, E, S> Clone for TaskManager<P, E, S>
where
    P: TaskPayload,
    E: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            executor: self.executor.clone(),
            spawner: self.spawner.clone(),
        }
    }
}

impl<P, E, S> TaskManager<P, E, S>
where
    P: TaskPayload,
    E: TaskExecutor<P>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a task manager. `priorities[i]` must govern level `i`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] when no level is supplied,
    /// the levels are not contiguous from zero, or a limit is zero.
    pub fn new(
        limits: TaskManagerLimits,
        priorities: Vec<TaskManagerPrioritySettings>,
        tracker: Arc<ResourceTracker>,
        policies: TaskManagerPolicies,
        executor: E,
        spawner: S,
    ) -> Result<Self, SchedulerError> {
        if let Some((index, settings)) = priorities
            .iter()
            .enumerate()
            .find(|(index, settings)| settings.level() != *index)
        {
            return Err(SchedulerError::InvalidConfig(format!(
                "priority settings at position {index} govern level {}",
                settings.level()
            )));
        }
        if limits.poll_interval.is_zero() || limits.process_timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "poll interval and process timeout must be non-zero".into(),
            ));
        }
        let queues = QueueTrackerContainer::new(priorities.len(), limits.default_priority)?;
        info!(
            levels = priorities.len(),
            default_priority = limits.default_priority,
            process_timeout_ms = clock::duration_to_ms(limits.process_timeout),
            "task manager initialized"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                limits,
                queues,
                priorities: priorities.into_boxed_slice(),
                tracker,
                policies,
                sources: RwLock::new(Vec::new()),
                counters: TaskCounters::default(),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                wake: Notify::new(),
            }),
            executor,
            spawner,
        })
    }

    /// Resource tracker shared with command code.
    pub fn resource_tracker(&self) -> &Arc<ResourceTracker> {
        &self.shared.tracker
    }

    /// Settings for `level`.
    pub fn priority(&self, level: usize) -> Option<&TaskManagerPrioritySettings> {
        self.shared.priorities.get(level)
    }

    /// Number of priority levels.
    pub fn levels(&self) -> usize {
        self.shared.priorities.len()
    }

    /// Items waiting across every level.
    pub fn queued(&self) -> usize {
        self.shared.queues.len()
    }

    /// Re-tune the capacity of one level.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] for an unknown level.
    pub fn bulk_head_set(
        &self,
        level: usize,
        slot_count: usize,
        overage: usize,
    ) -> Result<(), SchedulerError> {
        let settings = self.priority(level).ok_or_else(|| {
            SchedulerError::InvalidConfig(format!("priority level {level} does not exist"))
        })?;
        settings.bulk_head_set(slot_count, overage);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Register a pull-style source polled on every cycle.
    pub fn register_source(&self, source: Arc<dyn WorkSource<P>>) {
        info!(source = source.name(), "work source registered");
        self.shared.sources.write().push(source);
    }

    /// Queue work and return a handle to its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Shutdown`] after [`stop`](Self::stop).
    pub fn submit(&self, mut task: TaskTracker<P>) -> Result<TaskHandle, SchedulerError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::Shutdown);
        }
        let handle = task.attach_completion();
        let id = task.id();
        let level = self.shared.queues.enqueue(task);
        bump(&self.shared.counters.submitted);
        debug!(task = %id, level, "task submitted");
        self.shared.wake.notify_one();
        Ok(handle)
    }

    fn pull_sources(&self) {
        let sources: Vec<_> = self.shared.sources.read().iter().cloned().collect();
        if sources.is_empty() {
            return;
        }
        // Free slots per level not already spoken for by work queued at that
        // level. Backlog on a saturated or throttled level never consumes
        // another level's share.
        let utilization = Utilization::of(&self.shared.priorities);
        let mut wanted: usize = self
            .shared
            .priorities
            .iter()
            .map(|s| {
                let with_overage = self.shared.policies.overage.allow_overage(s, utilization);
                let queued = self
                    .shared
                    .queues
                    .level(s.level())
                    .map_or(0, QueueTracker::len);
                s.claimable(with_overage).saturating_sub(queued)
            })
            .sum();
        for source in sources {
            if wanted == 0 {
                break;
            }
            let pulled = source.try_pull(wanted);
            wanted = wanted.saturating_sub(pulled.len());
            for task in pulled {
                self.shared.queues.enqueue(task);
                bump(&self.shared.counters.submitted);
            }
        }
    }

    /// Run one admission cycle and return the number of tasks dispatched.
    pub fn poll_once(&self) -> usize {
        if self.shared.stopped.load(Ordering::Acquire) {
            return 0;
        }
        self.pull_sources();
        self.shared.tracker.recalculate();

        let shared = &self.shared;
        let mut budget = shared.limits.poll_batch_limit.unwrap_or(usize::MAX);
        let mut dispatched = 0;
        for settings in shared.priorities.iter().rev() {
            if budget == 0 {
                break;
            }
            let level = settings.level();
            let utilization = Utilization::of(&shared.priorities);
            let with_overage = shared.policies.overage.allow_overage(settings, utilization);
            let slots = settings.claimable(with_overage).min(budget);
            if slots == 0 {
                continue;
            }
            settings.reserve(slots);

            let mut taken = 0;
            let mut started = 0;
            let mut held = Vec::new();
            for mut task in shared.queues.dequeue_level(level, slots) {
                taken += 1;
                settings.release(1);
                if let Some(limiter) = &task.rate_limiter {
                    if let Admission::Throttled { retry_after } = limiter.try_admit() {
                        bump(&shared.counters.throttled);
                        match shared.limits.throttle_action {
                            ThrottleAction::Requeue => {
                                debug!(
                                    task = %task.id(),
                                    level,
                                    limiter = limiter.name(),
                                    ?retry_after,
                                    "task throttled, requeued"
                                );
                                held.push(task);
                            }
                            ThrottleAction::Drop => {
                                warn!(
                                    task = %task.id(),
                                    level,
                                    limiter = limiter.name(),
                                    "task throttled, dropped"
                                );
                                bump(&shared.counters.dropped);
                                task.complete(TaskOutcome::Dropped {
                                    reason: format!("throttled by {}", limiter.name()),
                                });
                            }
                        }
                        continue;
                    }
                }
                if !settings.increment() {
                    held.push(task);
                    continue;
                }
                started += 1;
                self.dispatch(level, task);
            }
            settings.release(slots - taken);
            for task in held.into_iter().rev() {
                shared.queues.requeue(task);
            }
            dispatched += started;
            budget = budget.saturating_sub(started);
        }
        if dispatched > 0 {
            debug!(dispatched, queued = shared.queues.len(), "poll cycle dispatched");
        }
        dispatched
    }

    fn dispatch(&self, level: usize, mut task: TaskTracker<P>) {
        task.attempt += 1;
        bump(&self.shared.counters.dispatched);
        let guard = task
            .consumer
            .as_ref()
            .map(|c| c.track(&task.meta.channel, &task.meta.id.to_string()));
        let timeout = task.timeout.unwrap_or(self.shared.limits.process_timeout);
        let grace = self.shared.limits.cancel_grace;
        let shared = Arc::clone(&self.shared);
        let executor = self.executor.clone();
        let spawner = self.spawner.clone();
        debug!(task = %task.id(), level, attempt = task.attempt, "task dispatched");

        self.spawner.spawn(async move {
            let (cancel_tx, cancel) = CancellationSignal::pair();
            let ctx = TaskContext {
                meta: task.meta.clone(),
                priority: level,
                attempt: task.attempt,
                cancel,
            };
            let mut run = pin!(
                AssertUnwindSafe(executor.execute(task.payload.clone(), ctx)).catch_unwind()
            );
            let execution = match tokio::time::timeout(timeout, &mut run).await {
                Ok(Ok(Ok(()))) => Execution::Completed,
                Ok(Ok(Err(err))) => Execution::Failed(err),
                Ok(Err(_)) => Execution::Panicked,
                Err(_) => {
                    // The work still holds its context here, so it can observe
                    // the signal and wind down within the grace period.
                    cancel_tx.send_replace(true);
                    if tokio::time::timeout(grace, &mut run).await.is_err() {
                        debug!(task = %task.id(), level, "task dropped after cancel grace");
                    }
                    Execution::TimedOut
                }
            };
            finish(&shared, &spawner, level, task, guard, execution);
        });
    }

    /// Start the background poll loop.
    pub fn start(&self) {
        if self.shared.stopped.load(Ordering::Acquire)
            || self.shared.running.swap(true, Ordering::AcqRel)
        {
            return;
        }
        self.shared.tracker.start();
        let this = self.clone();
        self.spawner.spawn(async move {
            info!(levels = this.levels(), "task manager poll loop started");
            while this.shared.running.load(Ordering::Acquire) {
                this.poll_once();
                tokio::select! {
                    () = this.shared.wake.notified() => {}
                    () = tokio::time::sleep(this.shared.limits.poll_interval) => {}
                }
            }
            info!("task manager poll loop stopped");
        });
    }

    /// Stop polling and drop queued work. Running work finishes normally
    /// but is not retried.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake.notify_one();
        let mut drained = 0_usize;
        for mut task in self.shared.queues.dequeue(usize::MAX) {
            bump(&self.shared.counters.dropped);
            task.complete(TaskOutcome::Dropped {
                reason: "task manager stopped".into(),
            });
            drained += 1;
        }
        self.shared.tracker.stop();
        info!(drained, "task manager stopped");
    }

    /// Whether the poll loop is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Recompute the aggregate statistics.
    pub fn statistics(&self) -> TaskManagerStatistics {
        let c = &self.shared.counters;
        TaskManagerStatistics {
            running: self.is_running(),
            submitted: c.submitted.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            throttled: c.throttled.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            panicked: c.panicked.load(Ordering::Relaxed),
            levels: self
                .shared
                .priorities
                .iter()
                .map(TaskManagerPrioritySettings::statistics)
                .collect(),
            queues: self.shared.queues.statistics(),
            resources: self.shared.tracker.statistics(),
        }
    }
}

/// Completion path of one dispatch attempt. Always issues the resource
/// terminal call and the bulkhead decrement before deciding on a retry.
fn finish<P, S>(
    shared: &Arc<Shared<P>>,
    spawner: &S,
    level: usize,
    mut task: TaskTracker<P>,
    guard: Option<ResourceRequestGuard>,
    execution: Execution,
) where
    P: TaskPayload,
    S: Spawn,
{
    if let Some(guard) = guard {
        match &execution {
            Execution::Completed => guard.end(ResourceRequestResult::Success),
            Execution::Failed(TaskError::Throttled(_)) => {
                guard.end(ResourceRequestResult::Throttled);
            }
            Execution::Failed(TaskError::Failed(_)) | Execution::Panicked => {
                guard.exception(guard.start_tick());
                guard.end(ResourceRequestResult::Exception);
            }
            Execution::TimedOut => guard.end(ResourceRequestResult::Timeout),
        }
    }
    let forced = matches!(execution, Execution::TimedOut);
    shared.priorities[level].decrement(forced);
    shared.wake.notify_one();

    let attempts = task.attempt;
    let reason = match execution {
        Execution::Completed => {
            bump(&shared.counters.completed);
            debug!(task = %task.id(), level, attempts, "task completed");
            task.complete(TaskOutcome::Completed { attempts });
            return;
        }
        Execution::Failed(err) => {
            warn!(task = %task.id(), level, attempts, error = %err, "task failed");
            err.to_string()
        }
        Execution::Panicked => {
            bump(&shared.counters.panicked);
            error!(task = %task.id(), level, attempts, "task panicked");
            "task panicked".to_owned()
        }
        Execution::TimedOut => {
            warn!(
                task = %task.id(),
                level,
                attempts,
                settings = %shared.priorities[level].debug(),
                "task killed after timeout"
            );
            "task timed out".to_owned()
        }
    };

    let retries_used = attempts.saturating_sub(1);
    if retries_used < shared.policies.retry.max_retries(level)
        && !shared.stopped.load(Ordering::Acquire)
    {
        bump(&shared.counters.retried);
        let delay = shared.policies.retry.delay(level, attempts);
        debug!(
            task = %task.id(),
            level,
            attempts,
            delay_ms = clock::duration_to_ms(delay),
            "task retry scheduled"
        );
        let shared = Arc::clone(shared);
        spawner.spawn(async move {
            tokio::time::sleep(delay).await;
            if shared.stopped.load(Ordering::Acquire) {
                bump(&shared.counters.dropped);
                task.complete(TaskOutcome::Dropped {
                    reason: "task manager stopped".into(),
                });
                return;
            }
            shared.queues.enqueue(task);
            shared.wake.notify_one();
        });
        return;
    }

    if forced {
        bump(&shared.counters.timed_out);
        task.complete(TaskOutcome::TimedOut { attempts });
    } else {
        bump(&shared.counters.failed);
        task.complete(TaskOutcome::Failed { reason, attempts });
    }
}
