//! Coroutine handles
//!
//! A coroutine is a separate Lua thread with its own operand stack, sharing
//! the VM's global state. Resuming one is a synchronous call from the host's
//! point of view: it returns when the coroutine yields, finishes or fails.

use std::ops::Deref;

use mlua_sys::{
    lua_Debug, lua_State, lua_checkstack, lua_closethread, lua_getstack, lua_gettop, lua_resume,
    lua_settop, lua_status, lua_tothread, lua_xmove, LUA_OK, LUA_YIELD,
};
use moonbridge_sdk::Status;
use tracing::debug;

use crate::convert::{IntoLua, IntoLuaArgs};
use crate::error::{LuaError, LuaResult};
use crate::error_handler::{message_at_top, ErrorHandlerRegistry};
use crate::refs::{LuaFunction, LuaRef};

/// Execution state of a coroutine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Can be resumed: not started yet, or suspended at a yield
    Suspended,
    /// Returned normally; resuming does nothing
    Dead,
    /// Stopped by an error; resuming does nothing
    Error,
    /// Executing: the main thread, the thread the state is bound to, or a
    /// coroutine waiting on one it resumed. Cannot be resumed or reset.
    Running,
}

/// Handle to a Lua coroutine.
#[derive(Clone, PartialEq, Debug)]
pub struct LuaThread<'lua>(LuaRef<'lua>);

impl<'lua> LuaThread<'lua> {
    pub(crate) fn wrap(reference: LuaRef<'lua>) -> Self {
        LuaThread(reference)
    }

    /// Raw thread pointer. Valid while this handle keeps the thread alive.
    pub fn as_ptr(&self) -> *mut lua_State {
        let state = self.0.state();
        let _guard = state.stack_guard();
        if state.reserve(1).is_err() {
            return std::ptr::null_mut();
        }
        unsafe {
            self.0.push_raw(state.as_ptr());
            lua_tothread(state.as_ptr(), -1)
        }
    }

    pub fn status(&self) -> ThreadStatus {
        let co = self.as_ptr();
        if co.is_null() {
            return ThreadStatus::Error;
        }
        self.status_of(co)
    }

    fn status_of(&self, co: *mut lua_State) -> ThreadStatus {
        let state = self.0.state();
        if co == state.main_ptr() || co == state.as_ptr() {
            return ThreadStatus::Running;
        }
        unsafe { thread_status(co) }
    }

    /// Resume with `args`, returning what the coroutine yielded or returned.
    ///
    /// A coroutine that is no longer suspended returns no values; its state
    /// is left untouched. Errors are reported to the error handler and
    /// returned as `LuaError::Runtime`.
    pub fn resume<A: IntoLuaArgs>(&self, args: A) -> LuaResult<Vec<LuaRef<'lua>>> {
        let state = self.0.state();
        let co = self.as_ptr();
        if co.is_null() || self.status_of(co) != ThreadStatus::Suspended {
            return Ok(Vec::new());
        }

        let l = state.as_ptr();
        let _guard = state.stack_guard();
        let nargs = args.push_args(state)?;
        let mut nresults = 0;
        unsafe {
            if lua_checkstack(co, nargs) == 0 {
                return Err(LuaError::StackOverflow(nargs));
            }
            lua_xmove(l, co, nargs);

            let status = lua_resume(co, l, nargs, &mut nresults);
            if status != LUA_OK && status != LUA_YIELD {
                let status = Status::from_code(status);
                debug!(%status, "coroutine failed");
                let message = message_at_top(co);
                ErrorHandlerRegistry::global().report(state.main_ptr(), status, &message);
                return Err(LuaError::Runtime(status));
            }

            if lua_checkstack(l, nresults + 1) == 0 {
                // Results cannot be moved out; drop them so the thread stays usable
                lua_settop(co, lua_gettop(co) - nresults);
                return Err(LuaError::StackOverflow(nresults));
            }
            lua_xmove(co, l, nresults);
        }
        state.capture_top(nresults)
    }

    /// Reset the coroutine and make it run `function` on the next resume.
    ///
    /// Works on finished and failed coroutines as well as fresh ones. A
    /// running thread is refused with [`LuaError::ThreadRunning`].
    pub fn set_function(&self, function: &LuaFunction<'_>) -> LuaResult<()> {
        let state = self.0.state();
        let co = self.as_ptr();
        if co.is_null() {
            return Err(LuaError::TypeMismatch {
                expected: "thread",
                got: self.0.type_name().to_string(),
            });
        }
        if self.status_of(co) == ThreadStatus::Running {
            return Err(LuaError::ThreadRunning);
        }
        let _guard = state.stack_guard();
        IntoLua::push(function, state)?;
        unsafe {
            if lua_status(co) != LUA_OK || lua_gettop(co) > 0 {
                lua_closethread(co, state.as_ptr());
            }
            lua_settop(co, 0);
            if lua_checkstack(co, 1) == 0 {
                return Err(LuaError::StackOverflow(1));
            }
            lua_xmove(state.as_ptr(), co, 1);
        }
        Ok(())
    }
}

/// Status of a thread other than the one the host is on.
unsafe fn thread_status(co: *mut lua_State) -> ThreadStatus {
    let mut ar: lua_Debug = std::mem::zeroed();
    match lua_status(co) {
        LUA_YIELD => ThreadStatus::Suspended,
        // Active frames: it resumed the coroutine we are running in
        LUA_OK if lua_getstack(co, 0, &mut ar) != 0 => ThreadStatus::Running,
        // A body waiting to start sits alone on the stack
        LUA_OK if lua_gettop(co) > 0 => ThreadStatus::Suspended,
        LUA_OK => ThreadStatus::Dead,
        _ => ThreadStatus::Error,
    }
}

impl<'lua> Deref for LuaThread<'lua> {
    type Target = LuaRef<'lua>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'lua> AsRef<LuaRef<'lua>> for LuaThread<'lua> {
    fn as_ref(&self) -> &LuaRef<'lua> {
        &self.0
    }
}

impl<'lua> From<LuaThread<'lua>> for LuaRef<'lua> {
    fn from(thread: LuaThread<'lua>) -> Self {
        thread.0
    }
}
