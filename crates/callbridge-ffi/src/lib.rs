//! C ABI for callbridge
//!
//! The host runtime links this library and calls into native callbacks by
//! handle. The API follows these principles:
//! - ABI-stable (uses only C-compatible types)
//! - Handles are plain `uint64_t`, 0 is never valid
//! - Host objects are opaque pointers, read back through the [`HostVTable`]
//!   installed with `callbridge_init`
//! - Error handling via out-parameters
//! - Manual memory management for errors and suppliers

mod host;

use std::ffi::{c_void, CStr, CString};
use std::fmt::Display;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr;

use callbridge_engine::entity::{
    lifecycle_damage, lifecycle_remove, lifecycle_tick, lifecycle_viewer_added,
    lifecycle_viewer_removed,
};
use callbridge_engine::scheduler::task_run;
use callbridge_engine::{
    dispatch, logging, registry, BridgeConfig, DamageDecision, DamageType, FaultPolicy,
    ScheduleSupplier, TaskExecutor, TaskSchedule, TaskScheduleSupplier,
};
use callbridge_sdk::{BridgeResult, CallbackKind, Handle, NativeError};
use tracing::warn;

use crate::host::{ForeignContext, ForeignPlayer, ForeignSender, ForeignSuggestion};

pub use crate::host::{
    ForeignEvent, HostQuery, HostVTable, RawArg, ARG_BOOL, ARG_DOUBLE, ARG_INTEGER, ARG_NONE,
    ARG_STRING, ARG_STRING_ARRAY,
};

/// `callbridge_supplier_get`: do not run again
pub const CALLBRIDGE_SCHEDULE_STOP: c_int = 0;
/// `callbridge_supplier_get`: run once more after `out_ticks`
pub const CALLBRIDGE_SCHEDULE_DELAY: c_int = 1;
/// `callbridge_supplier_get`: run every `out_ticks`
pub const CALLBRIDGE_SCHEDULE_INTERVAL: c_int = 2;

/// Keep a faulting task on its schedule
pub const CALLBRIDGE_FAULT_CONTINUE: c_int = 0;
/// Stop a faulting task
pub const CALLBRIDGE_FAULT_STOP: c_int = 1;

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque handle to a task schedule supplier
#[repr(C)]
pub struct CallbridgeSupplier {
    _private: [u8; 0],
}

/// Error information
#[repr(C)]
pub struct CallbridgeError {
    message: *mut c_char,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert Rust string to C string (caller must free)
fn rust_to_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Set error out-parameter
unsafe fn set_error(error_out: *mut *mut CallbridgeError, error: impl Display) {
    if !error_out.is_null() {
        let message = rust_to_c_string(&error.to_string());
        *error_out = Box::into_raw(Box::new(CallbridgeError { message }));
    }
}

/// 0 on success, -1 with the error reported otherwise
unsafe fn report(result: BridgeResult<()>, error: *mut *mut CallbridgeError) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_error(error, e);
            -1
        }
    }
}

fn non_null<T>(object: *const T, what: &str) -> BridgeResult<()> {
    if object.is_null() {
        return Err(NativeError::Host(format!("{} pointer is NULL", what)));
    }
    Ok(())
}

unsafe fn c_str<'a>(s: *const c_char, what: &str) -> BridgeResult<&'a str> {
    non_null(s, what)?;
    CStr::from_ptr(s)
        .to_str()
        .map_err(|_| NativeError::Host(format!("Invalid UTF-8 in {}", what)))
}

// ============================================================================
// Initialization
// ============================================================================

/// Install the host vtable
///
/// Calling it again replaces the previous vtable.
///
/// # Returns
/// * 0 on success
/// * -1 on failure (check error parameter)
///
/// # Safety
/// - `vtable` must point to a valid `HostVTable`; it is copied
/// - Every non-NULL entry must stay callable for the life of the process
#[no_mangle]
pub unsafe extern "C" fn callbridge_init(
    vtable: *const HostVTable,
    error: *mut *mut CallbridgeError,
) -> c_int {
    if vtable.is_null() {
        set_error(error, NativeError::Host("vtable pointer is NULL".to_string()));
        return -1;
    }
    host::install(*vtable);
    0
}

/// Install the tracing subscriber
///
/// # Arguments
/// * `config_path` - Path to `callbridge.toml`, or NULL for defaults
/// * `error` - Optional pointer to receive error information
///
/// # Returns
/// * 0 on success, including when logging was already initialized
/// * -1 if the config could not be read or is invalid
///
/// # Safety
/// `config_path` must be NULL or a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn callbridge_init_logging(
    config_path: *const c_char,
    error: *mut *mut CallbridgeError,
) -> c_int {
    let config = if config_path.is_null() {
        BridgeConfig::default()
    } else {
        let loaded = c_str(config_path, "config path")
            .map_err(|e| e.to_string())
            .and_then(|path| BridgeConfig::load(Path::new(path)).map_err(|e| e.to_string()));
        match loaded {
            Ok(config) => config,
            Err(e) => {
                set_error(error, e);
                return -1;
            }
        }
    };
    logging::init(&config.logging);
    0
}

// ============================================================================
// Command Callbacks
// ============================================================================

/// Ask the condition under `handle` whether `sender` may run `command`
///
/// # Returns
/// * 1 if the command is allowed
/// * 0 if it is rejected, including every failure
///
/// # Safety
/// - `sender` must be a host sender pointer valid for this call
/// - `command` must be a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn callbridge_condition_can_use(
    handle: u64,
    sender: *const c_void,
    command: *const c_char,
) -> c_int {
    let command = match non_null(sender, "sender").and_then(|()| c_str(command, "command")) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "rejecting command with invalid arguments");
            return 0;
        }
    };
    let sender = ForeignSender::new(sender);
    dispatch::condition_can_use(registry::global(), Handle::from_raw(handle), &sender, command)
        as c_int
}

/// Run the executor under `handle`
///
/// Native failures are logged and never reported to the host.
///
/// # Safety
/// `sender` and `context` must be host pointers valid for this call
#[no_mangle]
pub unsafe extern "C" fn callbridge_executor_apply(
    handle: u64,
    sender: *const c_void,
    context: *const c_void,
) {
    if let Err(e) = non_null(sender, "sender").and_then(|()| non_null(context, "context")) {
        warn!(error = %e, "skipping command execution");
        return;
    }
    let sender = ForeignSender::new(sender);
    let context = ForeignContext::new(context);
    dispatch::executor_apply(registry::global(), Handle::from_raw(handle), &sender, &context);
}

/// Let the suggestion provider under `handle` fill `suggestion`
///
/// # Returns
/// * 0 on success
/// * -1 on failure (check error parameter)
///
/// # Safety
/// `sender`, `context` and `suggestion` must be host pointers valid for
/// this call
#[no_mangle]
pub unsafe extern "C" fn callbridge_suggestion_apply(
    handle: u64,
    sender: *const c_void,
    context: *const c_void,
    suggestion: *mut c_void,
    error: *mut *mut CallbridgeError,
) -> c_int {
    let checked = non_null(sender, "sender")
        .and_then(|()| non_null(context, "context"))
        .and_then(|()| non_null(suggestion, "suggestion"));
    if let Err(e) = checked {
        set_error(error, e);
        return -1;
    }
    let sender = ForeignSender::new(sender);
    let context = ForeignContext::new(context);
    let mut sink = ForeignSuggestion::new(suggestion);
    report(
        dispatch::suggestion_apply(
            registry::global(),
            Handle::from_raw(handle),
            &sender,
            &context,
            &mut sink,
        ),
        error,
    )
}

// ============================================================================
// Predicates and Events
// ============================================================================

/// Test `player` against the predicate under `handle`
///
/// # Returns
/// * 1 if the player is accepted, 0 if not
/// * -1 on failure (check error parameter)
///
/// # Safety
/// `player` must be a host pointer valid for this call
#[no_mangle]
pub unsafe extern "C" fn callbridge_predicate_test(
    handle: u64,
    player: *const c_void,
    error: *mut *mut CallbridgeError,
) -> c_int {
    let result = non_null(player, "player").and_then(|()| {
        dispatch::predicate_test(
            registry::global(),
            Handle::from_raw(handle),
            &ForeignPlayer::new(player),
        )
    });
    match result {
        Ok(accepted) => accepted as c_int,
        Err(e) => {
            set_error(error, e);
            -1
        }
    }
}

/// Deliver `event` to the consumer under `handle`
///
/// May be called from several threads at once.
///
/// # Returns
/// * 0 on success
/// * -1 on failure (check error parameter)
///
/// # Safety
/// `event` must be a host pointer valid for this call
#[no_mangle]
pub unsafe extern "C" fn callbridge_event_accept(
    handle: u64,
    event: *const c_void,
    error: *mut *mut CallbridgeError,
) -> c_int {
    let result = non_null(event, "event").and_then(|()| {
        dispatch::event_accept(
            registry::global(),
            Handle::from_raw(handle),
            &ForeignEvent::new(event),
        )
    });
    report(result, error)
}

// ============================================================================
// Entity Lifecycle
// ============================================================================

/// Forward a new viewer to the creature under `handle`
///
/// The host runs its default behavior after this returns, whatever the
/// result.
///
/// # Returns
/// * 0 on success
/// * -1 on failure (check error parameter)
///
/// # Safety
/// `player` must be a host pointer valid for this call
#[no_mangle]
pub unsafe extern "C" fn callbridge_entity_viewer_added(
    handle: u64,
    player: *const c_void,
    error: *mut *mut CallbridgeError,
) -> c_int {
    let result = non_null(player, "player").and_then(|()| {
        lifecycle_viewer_added(
            registry::global(),
            Handle::from_raw(handle),
            &ForeignPlayer::new(player),
        )
    });
    report(result, error)
}

/// Forward a departing viewer to the creature under `handle`
///
/// # Safety
/// `player` must be a host pointer valid for this call
#[no_mangle]
pub unsafe extern "C" fn callbridge_entity_viewer_removed(
    handle: u64,
    player: *const c_void,
    error: *mut *mut CallbridgeError,
) -> c_int {
    let result = non_null(player, "player").and_then(|()| {
        lifecycle_viewer_removed(
            registry::global(),
            Handle::from_raw(handle),
            &ForeignPlayer::new(player),
        )
    });
    report(result, error)
}

/// Forward a tick to the creature under `handle`
///
/// # Safety
/// `error` must be NULL or a valid out-pointer
#[no_mangle]
pub unsafe extern "C" fn callbridge_entity_tick(
    handle: u64,
    time: i64,
    error: *mut *mut CallbridgeError,
) -> c_int {
    report(
        lifecycle_tick(registry::global(), Handle::from_raw(handle), time),
        error,
    )
}

/// Forward removal to the creature under `handle`
///
/// # Safety
/// `error` must be NULL or a valid out-pointer
#[no_mangle]
pub unsafe extern "C" fn callbridge_entity_remove(
    handle: u64,
    error: *mut *mut CallbridgeError,
) -> c_int {
    report(
        lifecycle_remove(registry::global(), Handle::from_raw(handle)),
        error,
    )
}

/// Ask the creature under `handle` whether damage may proceed
///
/// # Returns
/// * 1 to apply the damage
/// * 0 if the creature vetoes it
/// * -1 on failure (check error parameter); hosts should apply the damage
///
/// # Safety
/// `damage_type` must be a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn callbridge_entity_damage(
    handle: u64,
    damage_type: *const c_char,
    amount: f32,
    error: *mut *mut CallbridgeError,
) -> c_int {
    let result = c_str(damage_type, "damage type").and_then(|damage_type| {
        lifecycle_damage(
            registry::global(),
            Handle::from_raw(handle),
            &DamageType::new(damage_type),
            amount,
        )
    });
    match result {
        Ok(DamageDecision::Proceed) => 1,
        Ok(DamageDecision::Veto) => 0,
        Err(e) => {
            set_error(error, e);
            -1
        }
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Run the task body under `handle` once
///
/// # Safety
/// `error` must be NULL or a valid out-pointer
#[no_mangle]
pub unsafe extern "C" fn callbridge_task_run(
    handle: u64,
    error: *mut *mut CallbridgeError,
) -> c_int {
    report(task_run(registry::global(), Handle::from_raw(handle)), error)
}

/// Create a schedule supplier around the task under `task_handle`
///
/// The supplier takes ownership of the handle: destroying the supplier
/// releases it.
///
/// # Arguments
/// * `task_handle` - Handle of a registered task body
/// * `fault_policy` - `CALLBRIDGE_FAULT_CONTINUE` or `CALLBRIDGE_FAULT_STOP`
/// * `error` - Optional pointer to receive error information
///
/// # Returns
/// * Non-null supplier on success
/// * NULL on failure (check error parameter)
///
/// # Safety
/// The returned supplier must be freed with `callbridge_supplier_destroy()`
#[no_mangle]
pub unsafe extern "C" fn callbridge_supplier_new(
    task_handle: u64,
    fault_policy: c_int,
    error: *mut *mut CallbridgeError,
) -> *mut CallbridgeSupplier {
    let fault_policy = match fault_policy {
        CALLBRIDGE_FAULT_CONTINUE => FaultPolicy::Continue,
        CALLBRIDGE_FAULT_STOP => FaultPolicy::Stop,
        other => {
            set_error(
                error,
                NativeError::Host(format!("Unknown fault policy: {}", other)),
            );
            return ptr::null_mut();
        }
    };
    let handle = Handle::from_raw(task_handle);
    let executor = registry::global()
        .lookup(handle, CallbackKind::Task)
        .and_then(|_| TaskExecutor::new(handle));
    match executor {
        Ok(executor) => {
            let supplier = TaskScheduleSupplier::with_fault_policy(executor, fault_policy);
            Box::into_raw(Box::new(supplier)) as *mut CallbridgeSupplier
        }
        Err(e) => {
            set_error(error, e);
            ptr::null_mut()
        }
    }
}

/// Set the one-shot delay of a supplier
///
/// # Returns
/// * 1 if applied
/// * 0 if the supplier already made its first decision or is NULL
///
/// # Safety
/// `supplier` must be NULL or created by `callbridge_supplier_new()`
#[no_mangle]
pub unsafe extern "C" fn callbridge_supplier_set_delay(
    supplier: *mut CallbridgeSupplier,
    ticks: u64,
) -> c_int {
    if supplier.is_null() {
        return 0;
    }
    let supplier = &*(supplier as *const TaskScheduleSupplier);
    supplier.set_delay(ticks) as c_int
}

/// Make a supplier repeat every `ticks` (0 = every tick)
///
/// # Returns
/// * 1 if applied
/// * 0 if the supplier already stopped or is NULL
///
/// # Safety
/// `supplier` must be NULL or created by `callbridge_supplier_new()`
#[no_mangle]
pub unsafe extern "C" fn callbridge_supplier_set_repeat(
    supplier: *mut CallbridgeSupplier,
    ticks: u64,
) -> c_int {
    if supplier.is_null() {
        return 0;
    }
    let supplier = &*(supplier as *const TaskScheduleSupplier);
    supplier.set_repeat(ticks) as c_int
}

/// Run the task and get the next schedule
///
/// Task failures never surface here; they are logged and handled by the
/// supplier's fault policy.
///
/// # Arguments
/// * `supplier` - Supplier to query
/// * `out_ticks` - Receives the delay or interval; untouched for stop
///
/// # Returns
/// * `CALLBRIDGE_SCHEDULE_STOP`, `CALLBRIDGE_SCHEDULE_DELAY` or
///   `CALLBRIDGE_SCHEDULE_INTERVAL`
/// * -1 if `supplier` is NULL
///
/// # Safety
/// - `supplier` must be NULL or created by `callbridge_supplier_new()`
/// - `out_ticks` must be NULL or valid for writes
#[no_mangle]
pub unsafe extern "C" fn callbridge_supplier_get(
    supplier: *mut CallbridgeSupplier,
    out_ticks: *mut u64,
) -> c_int {
    if supplier.is_null() {
        return -1;
    }
    let supplier = &*(supplier as *const TaskScheduleSupplier);
    let (code, ticks) = match supplier.get() {
        TaskSchedule::Stop => return CALLBRIDGE_SCHEDULE_STOP,
        TaskSchedule::Delay(n) => (CALLBRIDGE_SCHEDULE_DELAY, n),
        TaskSchedule::Interval(n) => (CALLBRIDGE_SCHEDULE_INTERVAL, n),
    };
    if !out_ticks.is_null() {
        *out_ticks = ticks;
    }
    code
}

/// Destroy a supplier and release its task handle
///
/// # Safety
/// - `supplier` must be NULL or created by `callbridge_supplier_new()`
/// - The supplier must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn callbridge_supplier_destroy(supplier: *mut CallbridgeSupplier) {
    if supplier.is_null() {
        return;
    }
    drop(Box::from_raw(supplier as *mut TaskScheduleSupplier));
}

// ============================================================================
// Handles and Errors
// ============================================================================

/// Free the native state behind `handle`
///
/// Hosts call this when the object owning an adapter is destroyed.
///
/// # Returns
/// * 1 if the handle was live
/// * 0 if it was unknown or already released
#[no_mangle]
pub extern "C" fn callbridge_handle_release(handle: u64) -> c_int {
    registry::global().release(Handle::from_raw(handle)) as c_int
}

/// Get error message
///
/// # Returns
/// * Null-terminated error message string
/// * NULL if error is NULL
///
/// # Safety
/// - Error pointer must be valid
/// - Returned string is valid until `callbridge_error_free()` is called
/// - Do not free the returned string directly
#[no_mangle]
pub unsafe extern "C" fn callbridge_error_message(error: *const CallbridgeError) -> *const c_char {
    if error.is_null() {
        return ptr::null();
    }

    (*error).message
}

/// Free an error
///
/// # Safety
/// - Error pointer must be valid (created by this library)
/// - Error must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn callbridge_error_free(error: *mut CallbridgeError) {
    if error.is_null() {
        return;
    }

    if !(*error).message.is_null() {
        let _ = CString::from_raw((*error).message);
    }

    let _ = Box::from_raw(error);
}

/// Get library version string
///
/// # Safety
/// Returned string is statically allocated and must not be freed
#[no_mangle]
pub unsafe extern "C" fn callbridge_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Tests
// ============================================================================
