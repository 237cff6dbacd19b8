//! C functions the engine hands to the VM
//!
//! Raising a Lua error unwinds with `longjmp`, so these bodies hold no
//! values with destructors while they call into the VM.

use std::os::raw::c_int;

use mlua_sys::{
    lua_Integer, lua_State, lua_createtable, lua_gettable, lua_settable, lua_tocfunction,
    lua_tointeger, lua_tostring, luaL_requiref, luaL_traceback,
};

use crate::error_handler::message_at_top;

/// `(table, key) -> table[key]`, honouring metamethods.
pub(crate) unsafe extern "C-unwind" fn protected_get(state: *mut lua_State) -> c_int {
    lua_gettable(state, 1);
    1
}

/// `(table, key, value)`: `table[key] = value`, honouring metamethods.
pub(crate) unsafe extern "C-unwind" fn protected_set(state: *mut lua_State) -> c_int {
    lua_settable(state, 1);
    0
}

/// `(narr, nrec) -> table` with preallocated parts. Oversized requests
/// raise `table overflow` instead of aborting.
pub(crate) unsafe extern "C-unwind" fn protected_new_table(state: *mut lua_State) -> c_int {
    let limit = c_int::MAX as lua_Integer;
    let narr = lua_tointeger(state, 1).clamp(0, limit) as c_int;
    let nrec = lua_tointeger(state, 2).clamp(0, limit) as c_int;
    lua_createtable(state, narr, nrec);
    1
}

/// `(name, openf)`: open a library module and bind it as a global.
pub(crate) unsafe extern "C-unwind" fn protected_require(state: *mut lua_State) -> c_int {
    let name = lua_tostring(state, 1);
    if let Some(open) = lua_tocfunction(state, 2) {
        luaL_requiref(state, name, open, 1);
    }
    0
}

/// Message handler appending a stack traceback to string errors.
pub(crate) unsafe extern "C-unwind" fn traceback_handler(state: *mut lua_State) -> c_int {
    let msg = lua_tostring(state, 1);
    if !msg.is_null() {
        luaL_traceback(state, state, msg, 1);
    }
    // Non-string error objects pass through untouched
    1
}

/// Last-resort report for errors raised outside any protected call.
pub(crate) unsafe extern "C-unwind" fn default_panic(state: *mut lua_State) -> c_int {
    let message = message_at_top(state);
    eprintln!("PANIC: unprotected error in call to Lua API ({})", message);
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LuaState;
    use mlua_sys::{lua_pcall, lua_pushcfunction, lua_settop, LUA_OK};

    #[test]
    fn test_traceback_handler_appends_trace() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let l = state.as_ptr();
        unsafe {
            lua_pushcfunction(l, traceback_handler);
            mlua_sys::lua_pushstring(l, c"oops".as_ptr());
            assert_eq!(lua_pcall(l, 1, 1, 0), LUA_OK);
            let text = message_at_top(l);
            assert!(text.starts_with("oops"));
            assert!(text.contains("stack traceback:"));
            lua_settop(l, 0);
        }
    }

    #[test]
    fn test_protected_get_reads_field() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let l = state.as_ptr();
        unsafe {
            lua_pushcfunction(l, protected_get);
            mlua_sys::lua_createtable(l, 0, 1);
            mlua_sys::lua_pushinteger(l, 42);
            mlua_sys::lua_setfield(l, -2, c"answer".as_ptr());
            mlua_sys::lua_pushstring(l, c"answer".as_ptr());
            assert_eq!(lua_pcall(l, 2, 1, 0), LUA_OK);
            assert_eq!(mlua_sys::lua_tointeger(l, -1), 42);
            lua_settop(l, 0);
        }
    }

    #[test]
    fn test_panic_function_leaves_message() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let l = state.as_ptr();
        unsafe {
            mlua_sys::lua_pushstring(l, c"unprotected".as_ptr());
            assert_eq!(default_panic(l), 0);
            assert_eq!(mlua_sys::lua_gettop(l), 1);
            assert_eq!(message_at_top(l), "unprotected");
            lua_settop(l, 0);
        }
    }
}
