//! Callback registry
//!
//! Process-wide table of native callbacks. Every callback sits behind a
//! [`Handle`]; the host only ever stores and forwards that handle. The
//! `register_*` methods mint the handle and return the typed adapter the
//! host subsystem takes ownership of.

use std::sync::Arc;

use callbridge_sdk::{
    BridgeResult, CallbackKind, CommandContext, CommandSender, Event, Handle, HandleTable,
    NativeError, Player, SuggestionSink,
};
use once_cell::sync::Lazy;
use tracing::{debug, trace, warn};

use crate::dispatch::{
    ConditionCallback, ConsumerCallback, ExecutorCallback, PredicateCallback, SuggestionCallback,
};
use crate::entity::{CreatureBehavior, EntityLifecycleDelegate};
use crate::scheduler::TaskExecutor;

// ============================================================================
// Callback shapes
// ============================================================================

/// Command condition body
pub type ConditionFn = Arc<dyn Fn(&dyn CommandSender, &str) -> BridgeResult<bool> + Send + Sync>;

/// Command executor body
pub type ExecutorFn =
    Arc<dyn Fn(&dyn CommandSender, &dyn CommandContext) -> BridgeResult<()> + Send + Sync>;

/// Suggestion provider body
pub type SuggestionFn = Arc<
    dyn Fn(&dyn CommandSender, &dyn CommandContext, &mut dyn SuggestionSink) -> BridgeResult<()>
        + Send
        + Sync,
>;

/// Player predicate body
pub type PredicateFn = Arc<dyn Fn(&dyn Player) -> BridgeResult<bool> + Send + Sync>;

/// Event consumer body
pub type EventFn = Arc<dyn Fn(&dyn Event) -> BridgeResult<()> + Send + Sync>;

/// Scheduled task body
pub type TaskFn = Arc<dyn Fn() -> BridgeResult<()> + Send + Sync>;

/// A native callback, tagged by kind.
#[derive(Clone)]
pub enum Callback {
    /// Command condition
    Condition(ConditionFn),
    /// Command executor
    Executor(ExecutorFn),
    /// Argument suggestion provider
    Suggestion(SuggestionFn),
    /// Player predicate
    Predicate(PredicateFn),
    /// Event consumer
    EventConsumer(EventFn),
    /// Entity lifecycle behavior
    Lifecycle(Arc<dyn CreatureBehavior>),
    /// Scheduled task body
    Task(TaskFn),
}

impl Callback {
    /// Kind of this callback
    pub fn kind(&self) -> CallbackKind {
        match self {
            Callback::Condition(_) => CallbackKind::Condition,
            Callback::Executor(_) => CallbackKind::Executor,
            Callback::Suggestion(_) => CallbackKind::Suggestion,
            Callback::Predicate(_) => CallbackKind::Predicate,
            Callback::EventConsumer(_) => CallbackKind::EventConsumer,
            Callback::Lifecycle(_) => CallbackKind::Lifecycle,
            Callback::Task(_) => CallbackKind::Task,
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Callback::{}", self.kind())
    }
}

// ============================================================================
// Registry
// ============================================================================

static GLOBAL: Lazy<CallbackRegistry> = Lazy::new(CallbackRegistry::new);

/// Registry shared by every adapter built with `new(handle)`.
pub fn global() -> &'static CallbackRegistry {
    &GLOBAL
}

/// Handle table of native callbacks.
///
/// Lookups clone the callback's `Arc` out of the table, so no lock is held
/// while native code runs. Concurrent invocation of the same handle is
/// allowed; callbacks must tolerate it.
pub struct CallbackRegistry {
    table: HandleTable<Callback>,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            table: HandleTable::new(),
        }
    }

    /// Store a callback and mint its handle
    pub fn insert(&self, callback: Callback) -> Handle {
        let kind = callback.kind();
        let handle = self.table.insert(callback);
        debug!(%handle, %kind, "registered native callback");
        handle
    }

    /// Resolve a handle, checking it names a callback of `expected` kind
    pub fn lookup(&self, handle: Handle, expected: CallbackKind) -> BridgeResult<Callback> {
        let callback = self.fetch(handle)?;
        if callback.kind() != expected {
            return Err(NativeError::KindMismatch {
                expected,
                got: callback.kind(),
            });
        }
        Ok(callback)
    }

    fn fetch(&self, handle: Handle) -> BridgeResult<Callback> {
        if handle.is_null() {
            return Err(NativeError::NullHandle);
        }
        self.table.get(handle).ok_or_else(|| {
            warn!(%handle, "lookup of stale handle");
            NativeError::StaleHandle(handle)
        })
    }

    /// Free the native state behind `handle`.
    ///
    /// Returns `false` if the handle was already released.
    pub fn release(&self, handle: Handle) -> bool {
        match self.table.remove(handle) {
            Some(callback) => {
                debug!(%handle, kind = %callback.kind(), "released native callback");
                true
            }
            None => {
                trace!(%handle, "release of unknown handle");
                false
            }
        }
    }

    /// Check whether `handle` is live
    pub fn contains(&self, handle: Handle) -> bool {
        self.table.contains(handle)
    }

    /// Number of live callbacks
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    // ========================================================================
    // Typed lookups
    // ========================================================================

    pub(crate) fn condition(&self, handle: Handle) -> BridgeResult<ConditionFn> {
        match self.fetch(handle)? {
            Callback::Condition(f) => Ok(f),
            other => Err(mismatch(CallbackKind::Condition, &other)),
        }
    }

    pub(crate) fn executor(&self, handle: Handle) -> BridgeResult<ExecutorFn> {
        match self.fetch(handle)? {
            Callback::Executor(f) => Ok(f),
            other => Err(mismatch(CallbackKind::Executor, &other)),
        }
    }

    pub(crate) fn suggestion(&self, handle: Handle) -> BridgeResult<SuggestionFn> {
        match self.fetch(handle)? {
            Callback::Suggestion(f) => Ok(f),
            other => Err(mismatch(CallbackKind::Suggestion, &other)),
        }
    }

    pub(crate) fn predicate(&self, handle: Handle) -> BridgeResult<PredicateFn> {
        match self.fetch(handle)? {
            Callback::Predicate(f) => Ok(f),
            other => Err(mismatch(CallbackKind::Predicate, &other)),
        }
    }

    pub(crate) fn event_consumer(&self, handle: Handle) -> BridgeResult<EventFn> {
        match self.fetch(handle)? {
            Callback::EventConsumer(f) => Ok(f),
            other => Err(mismatch(CallbackKind::EventConsumer, &other)),
        }
    }

    pub(crate) fn lifecycle(&self, handle: Handle) -> BridgeResult<Arc<dyn CreatureBehavior>> {
        match self.fetch(handle)? {
            Callback::Lifecycle(b) => Ok(b),
            other => Err(mismatch(CallbackKind::Lifecycle, &other)),
        }
    }

    pub(crate) fn task(&self, handle: Handle) -> BridgeResult<TaskFn> {
        match self.fetch(handle)? {
            Callback::Task(f) => Ok(f),
            other => Err(mismatch(CallbackKind::Task, &other)),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a command condition
    pub fn register_condition<F>(&'static self, condition: F) -> ConditionCallback
    where
        F: Fn(&dyn CommandSender, &str) -> BridgeResult<bool> + Send + Sync + 'static,
    {
        let handle = self.insert(Callback::Condition(Arc::new(condition)));
        ConditionCallback::bind(self, handle)
    }

    /// Register a command executor
    pub fn register_executor<F>(&'static self, executor: F) -> ExecutorCallback
    where
        F: Fn(&dyn CommandSender, &dyn CommandContext) -> BridgeResult<()> + Send + Sync + 'static,
    {
        let handle = self.insert(Callback::Executor(Arc::new(executor)));
        ExecutorCallback::bind(self, handle)
    }

    /// Register an argument suggestion provider
    pub fn register_suggestion<F>(&'static self, provider: F) -> SuggestionCallback
    where
        F: Fn(&dyn CommandSender, &dyn CommandContext, &mut dyn SuggestionSink) -> BridgeResult<()>
            + Send
            + Sync
            + 'static,
    {
        let handle = self.insert(Callback::Suggestion(Arc::new(provider)));
        SuggestionCallback::bind(self, handle)
    }

    /// Register a player predicate
    pub fn register_predicate<F>(&'static self, predicate: F) -> PredicateCallback
    where
        F: Fn(&dyn Player) -> BridgeResult<bool> + Send + Sync + 'static,
    {
        let handle = self.insert(Callback::Predicate(Arc::new(predicate)));
        PredicateCallback::bind(self, handle)
    }

    /// Register a consumer that sees every event it is subscribed to
    pub fn register_event_consumer<F>(&'static self, consumer: F) -> ConsumerCallback
    where
        F: Fn(&dyn Event) -> BridgeResult<()> + Send + Sync + 'static,
    {
        let handle = self.insert(Callback::EventConsumer(Arc::new(consumer)));
        ConsumerCallback::bind(self, handle)
    }

    /// Register a listener for one concrete event type.
    ///
    /// Events that do not downcast to `E` are ignored.
    pub fn register_event_listener<E, F>(&'static self, listener: F) -> ConsumerCallback
    where
        E: Event + 'static,
        F: Fn(&E) -> BridgeResult<()> + Send + Sync + 'static,
    {
        self.register_event_consumer(move |event: &dyn Event| {
            match event.as_any().downcast_ref::<E>() {
                Some(typed) => listener(typed),
                None => {
                    trace!(event_type = event.event_type(), "listener skipped event");
                    Ok(())
                }
            }
        })
    }

    /// Register an entity lifecycle behavior
    pub fn register_lifecycle(
        &'static self,
        behavior: Arc<dyn CreatureBehavior>,
    ) -> EntityLifecycleDelegate {
        let handle = self.insert(Callback::Lifecycle(behavior));
        EntityLifecycleDelegate::bind(self, handle)
    }

    /// Register a scheduled task body
    pub fn register_task<F>(&'static self, task: F) -> TaskExecutor
    where
        F: Fn() -> BridgeResult<()> + Send + Sync + 'static,
    {
        let handle = self.insert(Callback::Task(Arc::new(task)));
        TaskExecutor::bind(self, handle)
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch(expected: CallbackKind, got: &Callback) -> NativeError {
    NativeError::KindMismatch {
        expected,
        got: got.kind(),
    }
}

#[cfg(test)]
pub(crate) fn leaked() -> &'static CallbackRegistry {
    Box::leak(Box::new(CallbackRegistry::new()))
}
