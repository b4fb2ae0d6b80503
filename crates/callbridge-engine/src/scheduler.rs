//! Cooperative task scheduling
//!
//! The host scheduler asks a [`ScheduleSupplier`] for the next schedule each
//! time a task comes due. [`TaskScheduleSupplier`] runs the native task body
//! and answers with one of three decisions: run again after a delay, run
//! again at an interval, or stop.
//!
//! [`TickScheduler`] is a host-side tick loop that drives suppliers, and
//! [`Scheduler`] is the native-side builder that wires a task body into it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use callbridge_sdk::{BridgeResult, Handle};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::config::SchedulerConfig;
use crate::dispatch::guarded;
use crate::registry::{self, CallbackRegistry};

// ============================================================================
// Supplier protocol
// ============================================================================

/// Scheduling decision returned to the host after each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSchedule {
    /// Run again once, after this many ticks
    Delay(u64),
    /// Run again every this many ticks
    Interval(u64),
    /// Do not run again
    Stop,
}

impl TaskSchedule {
    /// Ticks until the next run, `None` for `Stop`
    pub fn ticks(&self) -> Option<u64> {
        match self {
            TaskSchedule::Delay(n) | TaskSchedule::Interval(n) => Some(*n),
            TaskSchedule::Stop => None,
        }
    }
}

/// Something the scheduler can run.
pub trait Runnable: Send + Sync {
    /// Run once
    fn run(&self) -> BridgeResult<()>;
}

impl<F> Runnable for F
where
    F: Fn() -> BridgeResult<()> + Send + Sync,
{
    fn run(&self) -> BridgeResult<()> {
        self()
    }
}

/// Source of scheduling decisions, queried each time a task comes due.
pub trait ScheduleSupplier: Send + Sync {
    /// Run the task and decide when to run it next
    fn get(&self) -> TaskSchedule;
}

/// What a supplier does after its task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Log the fault and keep the configured schedule
    #[default]
    Continue,
    /// Log the fault and stop the task
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduleState {
    /// Not run yet; `delay` applies to the first decision only
    Delayed { delay: u64, repeat: Option<u64> },
    Repeating { interval: u64 },
    /// The delay was consumed without a repeat; next decision stops
    Finishing,
    Stopped,
}

impl ScheduleState {
    fn advance(&mut self) -> TaskSchedule {
        match *self {
            ScheduleState::Delayed { delay, repeat } if delay > 0 => {
                *self = match repeat {
                    Some(interval) => ScheduleState::Repeating { interval },
                    None => ScheduleState::Finishing,
                };
                TaskSchedule::Delay(delay)
            }
            ScheduleState::Delayed {
                repeat: Some(interval),
                ..
            }
            | ScheduleState::Repeating { interval } => {
                *self = ScheduleState::Repeating { interval };
                TaskSchedule::Interval(interval)
            }
            ScheduleState::Delayed { repeat: None, .. }
            | ScheduleState::Finishing
            | ScheduleState::Stopped => {
                *self = ScheduleState::Stopped;
                TaskSchedule::Stop
            }
        }
    }
}

/// Supplier wrapping one native task body.
///
/// Starts with no delay and no repeat: the task runs once and stops.
pub struct TaskScheduleSupplier {
    runnable: Box<dyn Runnable>,
    state: Mutex<ScheduleState>,
    fault_policy: FaultPolicy,
}

impl TaskScheduleSupplier {
    /// Wrap a task body with the default fault policy
    pub fn new(runnable: impl Runnable + 'static) -> Self {
        Self::with_fault_policy(runnable, FaultPolicy::default())
    }

    /// Wrap a task body with an explicit fault policy
    pub fn with_fault_policy(runnable: impl Runnable + 'static, fault_policy: FaultPolicy) -> Self {
        Self {
            runnable: Box::new(runnable),
            state: Mutex::new(ScheduleState::Delayed {
                delay: 0,
                repeat: None,
            }),
            fault_policy,
        }
    }

    /// Set the one-shot delay.
    ///
    /// Returns `false` once the first decision has been made.
    pub fn set_delay(&self, delay: u64) -> bool {
        let mut state = self.state.lock();
        match &mut *state {
            ScheduleState::Delayed { delay: d, .. } => {
                *d = delay;
                true
            }
            _ => false,
        }
    }

    /// Repeat every `interval` ticks. `0` reruns on every tick.
    ///
    /// Returns `false` if the supplier already stopped.
    pub fn set_repeat(&self, interval: u64) -> bool {
        let mut state = self.state.lock();
        *state = match *state {
            ScheduleState::Delayed { delay, .. } => ScheduleState::Delayed {
                delay,
                repeat: Some(interval),
            },
            ScheduleState::Repeating { .. } | ScheduleState::Finishing => {
                ScheduleState::Repeating { interval }
            }
            ScheduleState::Stopped => return false,
        };
        true
    }

    /// Check whether the supplier has returned `Stop`
    pub fn is_stopped(&self) -> bool {
        *self.state.lock() == ScheduleState::Stopped
    }
}

impl ScheduleSupplier for TaskScheduleSupplier {
    fn get(&self) -> TaskSchedule {
        if self.is_stopped() {
            return TaskSchedule::Stop;
        }

        // The state lock is not held while the body runs; it may call
        // set_repeat on its own supplier.
        if let Err(e) = guarded(|| self.runnable.run()) {
            error!(error = %e, policy = ?self.fault_policy, "scheduled task failed");
            if self.fault_policy == FaultPolicy::Stop {
                *self.state.lock() = ScheduleState::Stopped;
                return TaskSchedule::Stop;
            }
        }

        let decision = self.state.lock().advance();
        trace!(?decision, "task schedule decided");
        decision
    }
}

impl fmt::Debug for TaskScheduleSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduleSupplier")
            .field("state", &*self.state.lock())
            .field("fault_policy", &self.fault_policy)
            .finish()
    }
}

// ============================================================================
// Task executor adapter
// ============================================================================

/// Run the task body stored under `handle`.
pub fn task_run(registry: &CallbackRegistry, handle: Handle) -> BridgeResult<()> {
    let task = registry.task(handle)?;
    guarded(|| task())
}

native_adapter!(
    /// Runnable backed by a native task body.
    TaskExecutor
);

impl Runnable for TaskExecutor {
    fn run(&self) -> BridgeResult<()> {
        task_run(self.registry, self.handle)
    }
}

// ============================================================================
// Tick scheduler
// ============================================================================

/// Id of a task submitted to a [`TickScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Entry in the due queue
struct DueEntry {
    due: u64,
    /// Tie-breaker: earlier submission runs first
    seq: u64,
    id: TaskId,
}

// Reverse ordering for min-heap (earliest due tick first)
impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for DueEntry {}

/// Single-threaded tick loop driving schedule suppliers.
///
/// `tick()` is expected to be called from one thread (the server tick
/// thread); `submit` and `cancel` may be called from anywhere.
pub struct TickScheduler {
    tasks: DashMap<TaskId, Arc<dyn ScheduleSupplier>>,
    queue: Mutex<BinaryHeap<DueEntry>>,
    current: AtomicU64,
    next_id: AtomicU64,
    next_seq: AtomicU64,
    /// 0 = unlimited
    max_tasks_per_tick: usize,
}

impl TickScheduler {
    /// Create a scheduler at tick 0 with no per-tick limit
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            queue: Mutex::new(BinaryHeap::new()),
            current: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(0),
            max_tasks_per_tick: 0,
        }
    }

    /// Create a scheduler honoring `config`
    pub fn with_config(config: &SchedulerConfig) -> Self {
        Self {
            max_tasks_per_tick: config.max_tasks_per_tick,
            ..Self::new()
        }
    }

    /// Current tick number
    pub fn current_tick(&self) -> u64 {
        self.current.load(AtomicOrdering::Acquire)
    }

    /// Number of scheduled tasks
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Check whether a task is still scheduled
    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Schedule a supplier; its first run happens on the next tick
    pub fn submit(&self, supplier: Arc<dyn ScheduleSupplier>) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, AtomicOrdering::Relaxed));
        self.tasks.insert(id, supplier);
        self.enqueue(id, self.current_tick().saturating_add(1));
        debug!(%id, "task submitted");
        id
    }

    /// Cancel a task. Returns `false` if it was not scheduled.
    ///
    /// A run already in progress completes; no further run happens.
    pub fn cancel(&self, id: TaskId) -> bool {
        let cancelled = self.tasks.remove(&id).is_some();
        if cancelled {
            debug!(%id, "task cancelled");
        }
        cancelled
    }

    fn enqueue(&self, id: TaskId, due: u64) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.queue.lock().push(DueEntry { due, seq, id });
    }

    fn take_due(&self, now: u64) -> Vec<TaskId> {
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        while let Some(entry) = queue.peek() {
            if entry.due > now {
                break;
            }
            if self.max_tasks_per_tick != 0 && due.len() >= self.max_tasks_per_tick {
                break;
            }
            if let Some(entry) = queue.pop() {
                if self.tasks.contains_key(&entry.id) {
                    due.push(entry.id);
                }
            }
        }
        due
    }

    /// Advance one tick and run every task due in it.
    ///
    /// Returns the number of tasks run. Tasks beyond the per-tick limit stay
    /// due and run on a later tick.
    pub fn tick(&self) -> usize {
        let now = self.current.fetch_add(1, AtomicOrdering::AcqRel) + 1;
        let due = self.take_due(now);

        let mut ran = 0;
        for id in &due {
            // Clone the supplier out so no map shard is locked while it runs.
            let Some(supplier) = self.tasks.get(id).map(|entry| Arc::clone(entry.value())) else {
                continue;
            };
            let decision = supplier.get();
            ran += 1;
            match decision.ticks() {
                None => {
                    self.tasks.remove(id);
                    debug!(%id, tick = now, "task finished");
                }
                Some(n) => {
                    if self.tasks.contains_key(id) {
                        self.enqueue(*id, now.saturating_add(n.max(1)));
                        trace!(%id, tick = now, ?decision, "task rescheduled");
                    }
                }
            }
        }
        ran
    }

    /// Run `count` ticks
    pub fn run_ticks(&self, count: u64) -> usize {
        (0..count).map(|_| self.tick()).sum()
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Native-side task builder
// ============================================================================

/// Builds native tasks and submits them to a [`TickScheduler`].
pub struct Scheduler {
    host: Arc<TickScheduler>,
    registry: &'static CallbackRegistry,
    fault_policy: FaultPolicy,
}

impl Scheduler {
    /// Scheduler registering task bodies in the global registry
    pub fn new(host: Arc<TickScheduler>) -> Self {
        Self::with_registry(host, registry::global())
    }

    /// Scheduler registering task bodies in `registry`
    pub fn with_registry(host: Arc<TickScheduler>, registry: &'static CallbackRegistry) -> Self {
        Self {
            host,
            registry,
            fault_policy: FaultPolicy::default(),
        }
    }

    /// Set the fault policy of tasks built from now on
    pub fn with_fault_policy(mut self, fault_policy: FaultPolicy) -> Self {
        self.fault_policy = fault_policy;
        self
    }

    /// Start building a task around `task`
    pub fn build_task<F>(&self, task: F) -> TaskBuilder<'_>
    where
        F: Fn() -> BridgeResult<()> + Send + Sync + 'static,
    {
        TaskBuilder {
            scheduler: self,
            executor: self.registry.register_task(task),
            delay: 0,
            repeat: None,
        }
    }
}

/// Pending task configuration.
pub struct TaskBuilder<'a> {
    scheduler: &'a Scheduler,
    executor: TaskExecutor,
    delay: u64,
    repeat: Option<u64>,
}

impl TaskBuilder<'_> {
    /// Delay the first follow-up run by `ticks`
    pub fn delay(mut self, ticks: u64) -> Self {
        self.delay = ticks;
        self
    }

    /// Repeat every `ticks`
    pub fn repeat(mut self, ticks: u64) -> Self {
        self.repeat = Some(ticks);
        self
    }

    /// Submit the task; the body first runs on the next tick
    pub fn schedule(self) -> ScheduledTask {
        let supplier = Arc::new(TaskScheduleSupplier::with_fault_policy(
            self.executor,
            self.scheduler.fault_policy,
        ));
        supplier.set_delay(self.delay);
        if let Some(interval) = self.repeat {
            supplier.set_repeat(interval);
        }
        let id = self.scheduler.host.submit(supplier.clone());
        ScheduledTask {
            id,
            supplier,
            host: Arc::clone(&self.scheduler.host),
        }
    }
}

/// Handle to a submitted task.
pub struct ScheduledTask {
    id: TaskId,
    supplier: Arc<TaskScheduleSupplier>,
    host: Arc<TickScheduler>,
}

impl ScheduledTask {
    /// Id in the host scheduler
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Cancel future runs
    pub fn cancel(&self) -> bool {
        self.host.cancel(self.id)
    }

    /// Check whether the task will run again
    pub fn is_scheduled(&self) -> bool {
        self.host.is_scheduled(self.id)
    }

    /// Change the repeat interval of a running task
    pub fn set_repeat(&self, ticks: u64) -> bool {
        self.supplier.set_repeat(ticks)
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("supplier", &self.supplier)
            .finish()
    }
}
