//! Callbridge engine - handle-based callback dispatch
//!
//! The host runtime owns commands, entities and scheduled tasks; at fixed
//! lifecycle points they hand control to native code named only by a
//! [`Handle`](callbridge_sdk::Handle). This crate holds the pieces on the
//! native side of that boundary:
//!
//! - [`registry`]: process-wide table of native callbacks
//! - [`dispatch`]: command, suggestion, predicate and event adapters
//! - [`entity`]: entity lifecycle delegation
//! - [`scheduler`]: the task-schedule supplier and a tick scheduler
//! - [`config`] / [`logging`]: `callbridge.toml` and tracing setup
//!
//! # Example
//!
//! ```ignore
//! use callbridge_engine::{registry, CommandCondition};
//!
//! let condition = registry::global()
//!     .register_condition(|sender, _command| Ok(sender.has_permission("admin")));
//! // Hand the adapter to the command framework:
//! command.set_condition(Box::new(condition));
//! ```

#![warn(missing_docs)]

/// Defines a callback adapter: a handle plus the registry that minted it.
///
/// Dropping the adapter releases the handle.
macro_rules! native_adapter {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name {
            handle: ::callbridge_sdk::Handle,
            registry: &'static crate::registry::CallbackRegistry,
        }

        impl $name {
            pub(crate) fn bind(
                registry: &'static crate::registry::CallbackRegistry,
                handle: ::callbridge_sdk::Handle,
            ) -> Self {
                Self { handle, registry }
            }

            /// Adopt a handle minted by the global registry
            pub fn new(handle: ::callbridge_sdk::Handle) -> ::callbridge_sdk::BridgeResult<Self> {
                Self::with_registry(crate::registry::global(), handle)
            }

            /// Adopt a handle minted by `registry`
            pub fn with_registry(
                registry: &'static crate::registry::CallbackRegistry,
                handle: ::callbridge_sdk::Handle,
            ) -> ::callbridge_sdk::BridgeResult<Self> {
                if handle.is_null() {
                    return Err(::callbridge_sdk::NativeError::NullHandle);
                }
                Ok(Self::bind(registry, handle))
            }

            /// Handle this adapter forwards to
            pub fn handle(&self) -> ::callbridge_sdk::Handle {
                self.handle
            }

            /// Give up the handle without releasing it
            pub fn into_raw(self) -> ::callbridge_sdk::Handle {
                let handle = self.handle;
                ::std::mem::forget(self);
                handle
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.registry.release(self.handle);
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("handle", &self.handle)
                    .finish()
            }
        }
    };
}

pub mod config;
pub mod dispatch;
pub mod entity;
pub mod logging;
pub mod registry;
pub mod scheduler;

pub use config::{BridgeConfig, ConfigError, LoggingConfig, SchedulerConfig};
pub use dispatch::{
    filter_players, CommandCondition, CommandExecutor, ConditionCallback, ConsumerCallback,
    EventConsumer, ExecutorCallback, PlayerPredicate, PredicateCallback, SuggestionCallback,
    SuggestionProvider,
};
pub use entity::{
    create_entity_creature, CreatureBehavior, DamageDecision, DamageType, Entity,
    EntityLifecycleDelegate, EntityType, LifecycleHooks,
};
pub use registry::{Callback, CallbackRegistry};
pub use scheduler::{
    FaultPolicy, Runnable, ScheduleSupplier, ScheduledTask, Scheduler, TaskBuilder, TaskExecutor,
    TaskId, TaskSchedule, TaskScheduleSupplier, TickScheduler,
};
