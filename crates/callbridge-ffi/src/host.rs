//! Host objects seen through the host vtable
//!
//! Host objects cross the C ABI as opaque pointers. Native code reaches
//! them through the function table the host installs with
//! `callbridge_init`; the wrappers here present those pointers as the sdk
//! traits the engine dispatches with.

use std::any::Any;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use callbridge_sdk::{
    ArgValue, CommandContext, CommandSender, Event, Player, SuggestionEntry, SuggestionSink,
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::warn;

// ============================================================================
// Host vtable
// ============================================================================

/// String properties a host object can be asked for
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostQuery {
    /// Display name of a command sender
    SenderName = 0,
    /// UUID of a player
    PlayerUuid = 1,
    /// Username of a player
    PlayerUsername = 2,
    /// Raw input of a command context
    ContextInput = 3,
    /// Type name of an event
    EventType = 4,
}

/// No argument with that name
pub const ARG_NONE: c_int = 0;
/// `RawArg::string` is set
pub const ARG_STRING: c_int = 1;
/// `RawArg::integer` is set
pub const ARG_INTEGER: c_int = 2;
/// `RawArg::double` is set
pub const ARG_DOUBLE: c_int = 3;
/// `RawArg::boolean` is set
pub const ARG_BOOL: c_int = 4;
/// `RawArg::string` holds the words of a greedy argument, separated by `\n`
pub const ARG_STRING_ARRAY: c_int = 5;

/// A command argument as written by the host
#[repr(C)]
#[derive(Debug)]
pub struct RawArg {
    /// One of the `ARG_*` tags
    pub tag: c_int,
    /// Host-allocated string, released with `free_string` whatever the tag
    pub string: *mut c_char,
    /// Integer value
    pub integer: i64,
    /// Floating point value
    pub double: f64,
    /// Boolean value (non-zero is true)
    pub boolean: c_int,
}

impl Default for RawArg {
    fn default() -> Self {
        Self {
            tag: ARG_NONE,
            string: ptr::null_mut(),
            integer: 0,
            double: 0.0,
            boolean: 0,
        }
    }
}

/// Functions through which native code calls back into the host.
///
/// Every entry may be NULL; the matching operation then degrades to a
/// no-op or an empty answer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct HostVTable {
    /// Read a string property; the result is released with `free_string`
    pub object_string:
        Option<unsafe extern "C" fn(object: *const c_void, query: HostQuery) -> *mut c_char>,
    /// Release a string returned by the host
    pub free_string: Option<unsafe extern "C" fn(string: *mut c_char)>,
    /// Send a message to a sender or player
    pub send_message: Option<unsafe extern "C" fn(object: *const c_void, message: *const c_char)>,
    /// Check a sender permission; non-zero grants it
    pub has_permission:
        Option<unsafe extern "C" fn(sender: *const c_void, permission: *const c_char) -> c_int>,
    /// The player behind a sender, or NULL
    pub sender_player: Option<unsafe extern "C" fn(sender: *const c_void) -> *const c_void>,
    /// Look up a context argument; returns non-zero if `out` was filled
    pub context_argument: Option<
        unsafe extern "C" fn(context: *const c_void, name: *const c_char, out: *mut RawArg) -> c_int,
    >,
    /// Set the replaced range of a suggestion
    pub suggestion_set_range:
        Option<unsafe extern "C" fn(sink: *mut c_void, start: usize, length: usize)>,
    /// Add a suggestion entry; `tooltip` may be NULL
    pub suggestion_add_entry:
        Option<unsafe extern "C" fn(sink: *mut c_void, text: *const c_char, tooltip: *const c_char)>,
}

static HOST: Lazy<RwLock<Option<HostVTable>>> = Lazy::new(|| RwLock::new(None));

/// Install or replace the host vtable
pub(crate) fn install(vtable: HostVTable) {
    *HOST.write() = Some(vtable);
}

/// Copy of the installed vtable
pub(crate) fn vtable() -> Option<HostVTable> {
    let host = *HOST.read();
    if host.is_none() {
        warn!("host vtable not installed, call callbridge_init first");
    }
    host
}

/// Take ownership of a host string
unsafe fn take_host_string(host: &HostVTable, raw: *mut c_char) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    let value = CStr::from_ptr(raw).to_string_lossy().into_owned();
    if let Some(free) = host.free_string {
        free(raw);
    }
    Some(value)
}

fn query_string(object: *const c_void, query: HostQuery) -> String {
    let Some(host) = vtable() else {
        return String::new();
    };
    let Some(object_string) = host.object_string else {
        return String::new();
    };
    // SAFETY: the host guarantees `object` stays valid for the current call.
    unsafe { take_host_string(&host, object_string(object, query)) }.unwrap_or_default()
}

/// Convert to a C string, dropping interior NULs
fn to_c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

fn send_message(object: *const c_void, message: &str) {
    if let Some(send) = vtable().and_then(|host| host.send_message) {
        let message = to_c_string(message);
        // SAFETY: see `query_string`.
        unsafe { send(object, message.as_ptr()) }
    }
}

// ============================================================================
// Foreign objects
// ============================================================================

/// A host player
pub(crate) struct ForeignPlayer(*const c_void);

// SAFETY: the host promises its objects may be used from the calling thread
// for the duration of a call; wrappers never outlive that call.
unsafe impl Send for ForeignPlayer {}
unsafe impl Sync for ForeignPlayer {}

impl ForeignPlayer {
    pub(crate) fn new(object: *const c_void) -> Self {
        Self(object)
    }
}

impl Player for ForeignPlayer {
    fn uuid(&self) -> String {
        query_string(self.0, HostQuery::PlayerUuid)
    }

    fn username(&self) -> String {
        query_string(self.0, HostQuery::PlayerUsername)
    }

    fn send_message(&self, message: &str) {
        send_message(self.0, message)
    }
}

/// A host command sender
pub(crate) struct ForeignSender {
    object: *const c_void,
    player: Option<ForeignPlayer>,
}

// SAFETY: see `ForeignPlayer`.
unsafe impl Send for ForeignSender {}
unsafe impl Sync for ForeignSender {}

impl ForeignSender {
    pub(crate) fn new(object: *const c_void) -> Self {
        let player = vtable()
            .and_then(|host| host.sender_player)
            // SAFETY: see `query_string`.
            .map(|sender_player| unsafe { sender_player(object) })
            .filter(|player| !player.is_null())
            .map(ForeignPlayer::new);
        Self { object, player }
    }
}

impl CommandSender for ForeignSender {
    fn name(&self) -> String {
        query_string(self.object, HostQuery::SenderName)
    }

    fn send_message(&self, message: &str) {
        send_message(self.object, message)
    }

    fn has_permission(&self, permission: &str) -> bool {
        let Some(check) = vtable().and_then(|host| host.has_permission) else {
            return false;
        };
        let permission = to_c_string(permission);
        // SAFETY: see `query_string`.
        unsafe { check(self.object, permission.as_ptr()) != 0 }
    }

    fn as_player(&self) -> Option<&dyn Player> {
        self.player.as_ref().map(|p| p as &dyn Player)
    }
}

/// A parsed host command context
pub(crate) struct ForeignContext {
    object: *const c_void,
    input: String,
}

// SAFETY: see `ForeignPlayer`.
unsafe impl Send for ForeignContext {}
unsafe impl Sync for ForeignContext {}

impl ForeignContext {
    pub(crate) fn new(object: *const c_void) -> Self {
        Self {
            object,
            input: query_string(object, HostQuery::ContextInput),
        }
    }
}

impl CommandContext for ForeignContext {
    fn input(&self) -> &str {
        &self.input
    }

    fn argument(&self, name: &str) -> Option<ArgValue> {
        let host = vtable()?;
        let lookup = host.context_argument?;
        let name = to_c_string(name);
        let mut raw = RawArg::default();
        // SAFETY: see `query_string`; `raw` outlives the call.
        if unsafe { lookup(self.object, name.as_ptr(), &mut raw) } == 0 {
            return None;
        }
        // SAFETY: `string` is NULL or a host allocation handed over to us.
        let string = unsafe { take_host_string(&host, raw.string) };
        match raw.tag {
            ARG_STRING => string.map(ArgValue::String),
            ARG_STRING_ARRAY => string.map(|joined| {
                ArgValue::StringArray(
                    joined
                        .split('\n')
                        .filter(|word| !word.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            }),
            ARG_INTEGER => Some(ArgValue::Integer(raw.integer)),
            ARG_DOUBLE => Some(ArgValue::Double(raw.double)),
            ARG_BOOL => Some(ArgValue::Bool(raw.boolean != 0)),
            _ => None,
        }
    }
}

/// A host suggestion object, mutated in place
pub(crate) struct ForeignSuggestion {
    sink: *mut c_void,
    start: usize,
    length: usize,
}

impl ForeignSuggestion {
    pub(crate) fn new(sink: *mut c_void) -> Self {
        Self {
            sink,
            start: 0,
            length: 0,
        }
    }

    fn push_range(&self) {
        if let Some(set_range) = vtable().and_then(|host| host.suggestion_set_range) {
            // SAFETY: see `query_string`.
            unsafe { set_range(self.sink, self.start, self.length) }
        }
    }
}

impl SuggestionSink for ForeignSuggestion {
    fn set_start(&mut self, start: usize) {
        self.start = start;
        self.push_range();
    }

    fn set_length(&mut self, length: usize) {
        self.length = length;
        self.push_range();
    }

    fn add_entry(&mut self, entry: SuggestionEntry) {
        let Some(add) = vtable().and_then(|host| host.suggestion_add_entry) else {
            return;
        };
        let text = to_c_string(&entry.text);
        let tooltip = entry.tooltip.as_deref().map(to_c_string);
        let tooltip_ptr = tooltip.as_ref().map_or(ptr::null(), |t| t.as_ptr());
        // SAFETY: see `query_string`; both strings outlive the call.
        unsafe { add(self.sink, text.as_ptr(), tooltip_ptr) }
    }
}

/// A host event, as seen by native event consumers
pub struct ForeignEvent {
    object: *const c_void,
    event_type: String,
}

// SAFETY: see `ForeignPlayer`.
unsafe impl Send for ForeignEvent {}
unsafe impl Sync for ForeignEvent {}

impl ForeignEvent {
    pub(crate) fn new(object: *const c_void) -> Self {
        Self {
            object,
            event_type: query_string(object, HostQuery::EventType),
        }
    }

    /// Opaque host pointer of this event
    pub fn as_ptr(&self) -> *const c_void {
        self.object
    }
}

impl Event for ForeignEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
