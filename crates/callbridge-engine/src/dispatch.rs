//! Callback dispatch adapters
//!
//! One adapter per callback kind. Each adapter implements exactly one host
//! capability trait and forwards every call to the native callback stored
//! under its handle. Adapters hold nothing but the handle and are therefore
//! `Send + Sync`; serializing work for a given handle is the callback's job.
//!
//! The free functions (`condition_can_use`, `executor_apply`, ...) are the
//! forwarding operations themselves. Adapters call them, and so does the C
//! ABI, which receives bare handles from the host.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use callbridge_sdk::{
    BridgeResult, CommandContext, CommandSender, Event, Handle, NativeError, Player,
    SuggestionSink,
};
use tracing::{error, trace};

use crate::registry::CallbackRegistry;

// ============================================================================
// Host capability traits
// ============================================================================

/// Decides whether a sender may use a command.
pub trait CommandCondition: Send + Sync {
    /// `true` allows the command, `false` rejects it
    fn can_use(&self, sender: &dyn CommandSender, command: &str) -> bool;
}

/// Runs a command once its arguments are parsed.
pub trait CommandExecutor: Send + Sync {
    /// Execute the command; never fails towards the host
    fn apply(&self, sender: &dyn CommandSender, context: &dyn CommandContext);
}

/// Fills completions for a command argument.
pub trait SuggestionProvider: Send + Sync {
    /// Mutate `suggestion` in place
    fn apply(
        &self,
        sender: &dyn CommandSender,
        context: &dyn CommandContext,
        suggestion: &mut dyn SuggestionSink,
    ) -> BridgeResult<()>;
}

/// Filters players.
pub trait PlayerPredicate: Send + Sync {
    /// `true` keeps the player
    fn test(&self, player: &dyn Player) -> BridgeResult<bool>;
}

/// Receives events from the host event bus.
pub trait EventConsumer: Send + Sync {
    /// Handle one event
    fn accept(&self, event: &dyn Event) -> BridgeResult<()>;
}

/// Keep the players accepted by `predicate`, in order.
pub fn filter_players(
    predicate: &dyn PlayerPredicate,
    players: &[Arc<dyn Player>],
) -> BridgeResult<Vec<Arc<dyn Player>>> {
    let mut kept = Vec::new();
    for player in players {
        if predicate.test(player.as_ref())? {
            kept.push(Arc::clone(player));
        }
    }
    Ok(kept)
}

// ============================================================================
// Forwarding operations
// ============================================================================

/// Run native code, turning a panic into `NativeError::Panic`.
pub(crate) fn guarded<R>(f: impl FnOnce() -> BridgeResult<R>) -> BridgeResult<R> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(NativeError::from_panic(payload)))
}

/// Forward a command condition check.
///
/// Conditions have no error path towards the host: a stale handle or a
/// native fault is logged and rejects the command.
pub fn condition_can_use(
    registry: &CallbackRegistry,
    handle: Handle,
    sender: &dyn CommandSender,
    command: &str,
) -> bool {
    let result = registry
        .condition(handle)
        .and_then(|condition| guarded(|| condition(sender, command)));
    match result {
        Ok(allowed) => {
            trace!(%handle, command, allowed, "command condition");
            allowed
        }
        Err(e) => {
            error!(%handle, command, error = %e, "command condition failed, rejecting");
            false
        }
    }
}

/// Forward a command execution. Faults are contained and logged.
pub fn executor_apply(
    registry: &CallbackRegistry,
    handle: Handle,
    sender: &dyn CommandSender,
    context: &dyn CommandContext,
) {
    let result = registry
        .executor(handle)
        .and_then(|executor| guarded(|| executor(sender, context)));
    if let Err(e) = result {
        error!(%handle, input = context.input(), error = %e, "command executor failed");
    }
}

/// Forward a suggestion request; the sink is mutated in place.
pub fn suggestion_apply(
    registry: &CallbackRegistry,
    handle: Handle,
    sender: &dyn CommandSender,
    context: &dyn CommandContext,
    suggestion: &mut dyn SuggestionSink,
) -> BridgeResult<()> {
    let provider = registry.suggestion(handle)?;
    guarded(|| provider(sender, context, suggestion))
}

/// Forward a player predicate test.
pub fn predicate_test(
    registry: &CallbackRegistry,
    handle: Handle,
    player: &dyn Player,
) -> BridgeResult<bool> {
    let predicate = registry.predicate(handle)?;
    guarded(|| predicate(player))
}

/// Forward an event.
pub fn event_accept(
    registry: &CallbackRegistry,
    handle: Handle,
    event: &dyn Event,
) -> BridgeResult<()> {
    let consumer = registry.event_consumer(handle)?;
    guarded(|| consumer(event))
}

// ============================================================================
// Adapters
// ============================================================================

native_adapter!(
    /// Command condition backed by a native callback.
    ConditionCallback
);

impl CommandCondition for ConditionCallback {
    fn can_use(&self, sender: &dyn CommandSender, command: &str) -> bool {
        condition_can_use(self.registry, self.handle, sender, command)
    }
}

native_adapter!(
    /// Command executor backed by a native callback.
    ExecutorCallback
);

impl CommandExecutor for ExecutorCallback {
    fn apply(&self, sender: &dyn CommandSender, context: &dyn CommandContext) {
        executor_apply(self.registry, self.handle, sender, context)
    }
}

native_adapter!(
    /// Suggestion provider backed by a native callback.
    SuggestionCallback
);

impl SuggestionProvider for SuggestionCallback {
    fn apply(
        &self,
        sender: &dyn CommandSender,
        context: &dyn CommandContext,
        suggestion: &mut dyn SuggestionSink,
    ) -> BridgeResult<()> {
        suggestion_apply(self.registry, self.handle, sender, context, suggestion)
    }
}

native_adapter!(
    /// Player predicate backed by a native callback.
    PredicateCallback
);

impl PlayerPredicate for PredicateCallback {
    fn test(&self, player: &dyn Player) -> BridgeResult<bool> {
        predicate_test(self.registry, self.handle, player)
    }
}

native_adapter!(
    /// Event consumer backed by a native callback.
    ///
    /// One instance may be invoked from several event-bus threads at once.
    ConsumerCallback
);

impl EventConsumer for ConsumerCallback {
    fn accept(&self, event: &dyn Event) -> BridgeResult<()> {
        event_accept(self.registry, self.handle, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::leaked;
    use callbridge_sdk::{ArgumentMap, Suggestion, SuggestionEntry};
    use parking_lot::Mutex;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Console {
        messages: Mutex<Vec<String>>,
    }

    impl Console {
        fn new() -> Self {
            Self {
                messages: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandSender for Console {
        fn name(&self) -> String {
            "console".to_string()
        }

        fn send_message(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }

        fn has_permission(&self, permission: &str) -> bool {
            permission == "admin"
        }
    }

    struct TestPlayer(&'static str);

    impl Player for TestPlayer {
        fn uuid(&self) -> String {
            format!("uuid-{}", self.0)
        }

        fn username(&self) -> String {
            self.0.to_string()
        }

        fn send_message(&self, _message: &str) {}
    }

    struct JoinEvent {
        name: String,
    }

    impl Event for JoinEvent {
        fn event_type(&self) -> &str {
            "PlayerJoinEvent"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct TickEvent;

    impl Event for TickEvent {
        fn event_type(&self) -> &str {
            "ServerTickEvent"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_condition_forwards_sender_and_command() {
        let registry = leaked();
        let condition = registry
            .register_condition(|sender, command| Ok(sender.has_permission("admin") && command == "/stop"));

        let console = Console::new();
        assert!(condition.can_use(&console, "/stop"));
        assert!(!condition.can_use(&console, "/start"));
    }

    #[test]
    fn test_condition_fault_rejects() {
        let registry = leaked();
        let failing = registry.register_condition(|_, _| Err("no database".into()));
        let panicking = registry.register_condition(|_, _| panic!("boom"));

        let console = Console::new();
        assert!(!failing.can_use(&console, "/stop"));
        assert!(!panicking.can_use(&console, "/stop"));
    }

    #[test]
    fn test_executor_receives_context_and_contains_faults() {
        let registry = leaked();
        let executor = registry.register_executor(|sender, context| {
            let target = context.get_string("target")?;
            sender.send_message(&format!("teleported to {}", target));
            Ok(())
        });

        let console = Console::new();
        executor.apply(&console, &ArgumentMap::new("/tp alice").with("target", "alice"));
        // Missing argument: error is logged, not propagated.
        executor.apply(&console, &ArgumentMap::new("/tp"));

        assert_eq!(*console.messages.lock(), vec!["teleported to alice".to_string()]);
    }

    #[test]
    fn test_suggestion_mutates_sink() {
        let registry = leaked();
        let provider = registry.register_suggestion(|_, context, sink| {
            sink.set_start(context.input().len());
            sink.add_entry(SuggestionEntry::new("alice"));
            sink.add_entry(SuggestionEntry::new("bob"));
            Ok(())
        });

        let mut suggestion = Suggestion::default();
        provider
            .apply(&Console::new(), &ArgumentMap::new("/msg "), &mut suggestion)
            .unwrap();
        assert_eq!(suggestion.start, 5);
        assert_eq!(suggestion.texts(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_predicate_filters_players() {
        let registry = leaked();
        let predicate = registry.register_predicate(|player| Ok(player.username().starts_with('a')));

        let players: Vec<Arc<dyn Player>> = vec![
            Arc::new(TestPlayer("alice")),
            Arc::new(TestPlayer("bob")),
            Arc::new(TestPlayer("anna")),
        ];
        let kept = filter_players(&predicate, &players).unwrap();
        let names: Vec<String> = kept.iter().map(|p| p.username()).collect();
        assert_eq!(names, vec!["alice", "anna"]);
    }

    #[test]
    fn test_predicate_panic_surfaces_as_error() {
        let registry = leaked();
        let predicate = registry.register_predicate(|_| panic!("bad player"));
        assert!(matches!(
            predicate.test(&TestPlayer("alice")),
            Err(NativeError::Panic(msg)) if msg == "bad player"
        ));
    }

    #[test]
    fn test_typed_event_listener_ignores_other_events() {
        let registry = leaked();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let consumer = registry.register_event_listener(move |event: &JoinEvent| {
            sink.lock().push(event.name.clone());
            Ok(())
        });

        consumer
            .accept(&JoinEvent {
                name: "alice".to_string(),
            })
            .unwrap();
        consumer.accept(&TickEvent).unwrap();
        assert_eq!(*seen.lock(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_consumer_concurrent_invocation() {
        let registry = leaked();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let consumer = Arc::new(registry.register_event_consumer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let consumer = Arc::clone(&consumer);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        consumer.accept(&TickEvent).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn test_handle_isolation() {
        let registry = leaked();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let (a_hits, b_hits) = (Arc::clone(&hits), Arc::clone(&hits));
        let a = registry.register_predicate(move |_| {
            a_hits.lock().push("a");
            Ok(true)
        });
        let b = registry.register_predicate(move |_| {
            b_hits.lock().push("b");
            Ok(false)
        });

        assert!(a.test(&TestPlayer("x")).unwrap());
        assert!(!b.test(&TestPlayer("x")).unwrap());
        assert!(a.test(&TestPlayer("y")).unwrap());
        assert_eq!(*hits.lock(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_drop_releases_handle() {
        let registry = leaked();
        let predicate = registry.register_predicate(|_| Ok(true));
        let handle = predicate.handle();
        assert!(registry.contains(handle));

        drop(predicate);
        assert!(!registry.contains(handle));
        assert!(matches!(
            predicate_test(registry, handle, &TestPlayer("x")),
            Err(NativeError::StaleHandle(_))
        ));
    }

    #[test]
    fn test_into_raw_keeps_handle_alive() {
        let registry = leaked();
        let handle = registry.register_predicate(|_| Ok(true)).into_raw();
        assert!(registry.contains(handle));
        assert!(predicate_test(registry, handle, &TestPlayer("x")).unwrap());
        assert!(registry.release(handle));
    }

    #[test]
    fn test_adapter_rejects_null_handle() {
        assert!(matches!(
            ConditionCallback::new(Handle::NULL),
            Err(NativeError::NullHandle)
        ));
    }

    #[test]
    fn test_adapter_over_wrong_kind() {
        let registry = leaked();
        let handle = registry.register_predicate(|_| Ok(true)).into_raw();
        let condition = ConditionCallback::with_registry(registry, handle).unwrap();
        assert!(!condition.can_use(&Console::new(), "/stop"));
        assert!(matches!(
            predicate_test(registry, handle, &TestPlayer("x")),
            Ok(true)
        ));
    }
}
