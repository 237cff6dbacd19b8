//! Scoped stack guard
//!
//! The Lua operand stack is one shared, mutable resource with no cleanup of
//! its own. Every operation that crosses the host/VM boundary opens a
//! [`StackGuard`]; when the guard drops, the stack is truncated back to the
//! height recorded at acquisition, whatever path the operation took out.
//!
//! Guards nest freely. Each one only ever truncates down to its *own*
//! recorded height, so an inner guard can never disturb values that belong
//! to an outer scope.

use std::marker::PhantomData;
use std::os::raw::c_int;

use mlua_sys::{lua_State, lua_gettop, lua_rotate, lua_settop};
use tracing::warn;

use crate::state::LuaState;

/// Restores the operand stack to its recorded height on drop.
pub struct StackGuard<'a> {
    state: *mut lua_State,
    top: c_int,
    keep: c_int,
    _marker: PhantomData<&'a LuaState>,
}

impl<'a> StackGuard<'a> {
    /// Open a guard on `state`'s operand stack.
    pub fn new(state: &'a LuaState) -> Self {
        // SAFETY: the state is alive for 'a
        unsafe { Self::from_raw(state.as_ptr()) }
    }

    /// Open a guard on a raw VM handle.
    ///
    /// # Safety
    /// `state` must be a valid Lua state for as long as the guard lives.
    pub unsafe fn from_raw(state: *mut lua_State) -> Self {
        StackGuard {
            state,
            top: lua_gettop(state),
            keep: 0,
            _marker: PhantomData,
        }
    }

    /// Height recorded when the guard was opened.
    pub fn height(&self) -> c_int {
        self.top
    }

    /// Commit a net change: on exit, leave the `n` values currently on top
    /// of the stack in place of everything pushed since acquisition.
    pub fn keep(&mut self, n: c_int) {
        self.keep = n.max(0);
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            let current = lua_gettop(self.state);
            let target = self.top + self.keep;
            if current > target {
                if self.keep > 0 {
                    // Move the committed values down onto the recorded height
                    lua_rotate(self.state, self.top + 1, self.keep);
                }
                lua_settop(self.state, target);
            } else if current < target {
                warn!(
                    recorded = self.top,
                    keep = self.keep,
                    current,
                    "operand stack dropped below guarded height"
                );
            }
        }
    }
}
