//! Process-wide error handler registry
//!
//! Maps the identity of a VM (its main thread) to the host callback that
//! receives `(status, message)` for every load or runtime failure. One
//! entry per VM: registering again replaces the previous handler. Owning
//! `LuaState`s remove their entry when they close so the map does not grow
//! with every state a process creates.

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_int;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

use mlua_sys::{
    lua_State, lua_rawgeti, lua_tolstring, lua_tothread, lua_type, lua_typename, LUA_REGISTRYINDEX,
    LUA_RIDX_MAINTHREAD, LUA_TNUMBER, LUA_TSTRING,
};
use moonbridge_sdk::Status;
use parking_lot::Mutex;
use tracing::error;

use crate::stack::StackGuard;

/// Host error callback
pub type ErrorHandlerFn = Arc<dyn Fn(Status, &str) + Send + Sync>;

static ERROR_HANDLERS: LazyLock<ErrorHandlerRegistry> = LazyLock::new(ErrorHandlerRegistry::new);

/// Handler installed when a VM has none: prints the message to stderr.
pub fn default_handler(_status: Status, message: &str) {
    eprintln!("{}", message);
}

/// Registry of error handlers keyed by VM identity
pub struct ErrorHandlerRegistry {
    handlers: Mutex<HashMap<usize, ErrorHandlerFn>>,
}

impl ErrorHandlerRegistry {
    fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static ErrorHandlerRegistry {
        &ERROR_HANDLERS
    }

    /// Associate `handler` with the VM owning `state`, replacing any prior
    /// handler.
    ///
    /// # Safety
    /// `state` must be a valid Lua state.
    pub unsafe fn register(&self, state: *mut lua_State, handler: ErrorHandlerFn) {
        let _guard = StackGuard::from_raw(state);
        let key = main_thread(state) as usize;
        self.handlers.lock().insert(key, handler);
    }

    /// Handler registered for the VM owning `state`.
    ///
    /// # Safety
    /// `state` must be a valid Lua state.
    pub unsafe fn handler(&self, state: *mut lua_State) -> Option<ErrorHandlerFn> {
        let _guard = StackGuard::from_raw(state);
        let key = main_thread(state) as usize;
        self.handlers.lock().get(&key).cloned()
    }

    /// Whether the VM owning `state` has a handler.
    ///
    /// # Safety
    /// `state` must be a valid Lua state.
    pub unsafe fn has_handler(&self, state: *mut lua_State) -> bool {
        self.handler(state).is_some()
    }

    /// Drop the entry of a VM, given its main thread. Does not touch the VM,
    /// so it is safe to call right before `lua_close`.
    pub fn remove_main(&self, main: *mut lua_State) -> Option<ErrorHandlerFn> {
        self.handlers.lock().remove(&(main as usize))
    }

    /// Number of live entries
    pub fn count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Report a failure whose message sits on top of `state`'s stack.
    ///
    /// Terminal: never unwinds past this call, even if the handler panics.
    /// The message is left on the stack for the caller's guard to remove.
    ///
    /// # Safety
    /// `state` must be a valid Lua state.
    pub unsafe fn handle(&self, status: c_int, state: *mut lua_State) {
        let message = message_at_top(state);
        let main = {
            let _guard = StackGuard::from_raw(state);
            main_thread(state)
        };
        self.report(main, Status::from_code(status), &message);
    }

    /// Deliver `(status, message)` to the handler of the VM whose main
    /// thread is `main`, falling back to [`default_handler`].
    pub fn report(&self, main: *mut lua_State, status: Status, message: &str) {
        // Clone out of the lock so a handler may re-register
        let handler = self.handlers.lock().get(&(main as usize)).cloned();
        let outcome = catch_unwind(AssertUnwindSafe(|| match handler {
            Some(handler) => handler(status, message),
            None => default_handler(status, message),
        }));
        if outcome.is_err() {
            error!(%status, "error handler panicked");
        }
    }
}

/// Main thread of the VM that `state` belongs to. Pushes and pops one value.
///
/// # Safety
/// `state` must be a valid Lua state.
pub(crate) unsafe fn main_thread(state: *mut lua_State) -> *mut lua_State {
    lua_rawgeti(state, LUA_REGISTRYINDEX, LUA_RIDX_MAINTHREAD);
    let main = lua_tothread(state, -1);
    mlua_sys::lua_pop(state, 1);
    if main.is_null() {
        state
    } else {
        main
    }
}

/// Text of the error object on top of the stack, without invoking
/// metamethods.
///
/// # Safety
/// `state` must be a valid Lua state.
pub(crate) unsafe fn message_at_top(state: *mut lua_State) -> String {
    match lua_type(state, -1) {
        LUA_TSTRING | LUA_TNUMBER => {
            let _guard = StackGuard::from_raw(state);
            // Convert a copy so a number on the stack keeps its type
            mlua_sys::lua_pushvalue(state, -1);
            let mut len = 0usize;
            let ptr = lua_tolstring(state, -1, &mut len);
            if ptr.is_null() {
                return String::new();
            }
            let bytes = std::slice::from_raw_parts(ptr as *const u8, len);
            String::from_utf8_lossy(bytes).into_owned()
        }
        ty => {
            let name = CStr::from_ptr(lua_typename(state, ty)).to_string_lossy();
            format!("(error object is a {} value)", name)
        }
    }
}
