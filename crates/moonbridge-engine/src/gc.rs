//! Garbage collector controls
//!
//! Direct pass-through to `lua_gc`. Memory counters are in the collector's
//! own units (kilobytes unless stated otherwise), and setters return the
//! previous value the way the collector reports it.

use std::os::raw::c_int;

use mlua_sys::{
    lua_gc, LUA_GCCOLLECT, LUA_GCCOUNT, LUA_GCCOUNTB, LUA_GCGEN, LUA_GCINC, LUA_GCISRUNNING,
    LUA_GCRESTART, LUA_GCSETPAUSE, LUA_GCSETSTEPMUL, LUA_GCSTEP, LUA_GCSTOP,
};

use crate::options::GcMode;
use crate::state::LuaState;

/// Collector handle for one state
pub struct Gc<'lua> {
    state: &'lua LuaState,
}

impl<'lua> Gc<'lua> {
    pub(crate) fn new(state: &'lua LuaState) -> Self {
        Self { state }
    }

    /// Run a full collection cycle.
    pub fn collect(&self) {
        unsafe { lua_gc(self.state.as_ptr(), LUA_GCCOLLECT) };
    }

    /// One basic step. Returns true when the step finished a cycle.
    pub fn step(&self) -> bool {
        self.step_by(0)
    }

    /// A step as if `kbytes` had been allocated. Returns true when the step
    /// finished a cycle.
    pub fn step_by(&self, kbytes: i32) -> bool {
        unsafe { lua_gc(self.state.as_ptr(), LUA_GCSTEP, kbytes as c_int) != 0 }
    }

    /// Restart a stopped collector.
    pub fn restart(&self) {
        unsafe { lua_gc(self.state.as_ptr(), LUA_GCRESTART) };
    }

    /// Stop automatic collection until [`restart`](Self::restart).
    pub fn stop(&self) {
        unsafe { lua_gc(self.state.as_ptr(), LUA_GCSTOP) };
    }

    /// Same as [`restart`](Self::restart)
    pub fn enable(&self) {
        self.restart();
    }

    /// Same as [`stop`](Self::stop). Not a toggle: disabling twice keeps
    /// the collector stopped.
    pub fn disable(&self) {
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        unsafe { lua_gc(self.state.as_ptr(), LUA_GCISRUNNING) != 0 }
    }

    /// Memory in use, in kilobytes
    pub fn count(&self) -> usize {
        unsafe { lua_gc(self.state.as_ptr(), LUA_GCCOUNT).max(0) as usize }
    }

    /// Memory in use, in bytes
    pub fn used_bytes(&self) -> usize {
        let (kb, rem) = unsafe {
            (
                lua_gc(self.state.as_ptr(), LUA_GCCOUNT),
                lua_gc(self.state.as_ptr(), LUA_GCCOUNTB),
            )
        };
        kb.max(0) as usize * 1024 + rem.max(0) as usize
    }

    /// Set the collector pause; returns the previous value.
    pub fn set_pause(&self, pause: i32) -> i32 {
        unsafe { lua_gc(self.state.as_ptr(), LUA_GCSETPAUSE, pause as c_int) }
    }

    /// Set the step multiplier; returns the previous value.
    pub fn set_step_mul(&self, step_mul: i32) -> i32 {
        unsafe { lua_gc(self.state.as_ptr(), LUA_GCSETSTEPMUL, step_mul as c_int) }
    }

    /// Switch to incremental mode. Zero leaves a parameter unchanged.
    /// Returns the previous mode.
    pub fn incremental(&self, pause: i32, step_mul: i32, step_size: i32) -> GcMode {
        let prev = unsafe {
            lua_gc(
                self.state.as_ptr(),
                LUA_GCINC,
                pause as c_int,
                step_mul as c_int,
                step_size as c_int,
            )
        };
        mode_from_code(prev)
    }

    /// Switch to generational mode. Zero leaves a parameter unchanged.
    /// Returns the previous mode.
    pub fn generational(&self, minor_mul: i32, major_mul: i32) -> GcMode {
        let prev = unsafe {
            lua_gc(
                self.state.as_ptr(),
                LUA_GCGEN,
                minor_mul as c_int,
                major_mul as c_int,
            )
        };
        mode_from_code(prev)
    }
}

fn mode_from_code(code: c_int) -> GcMode {
    if code == LUA_GCGEN {
        GcMode::Generational
    } else {
        GcMode::Incremental
    }
}
