//! Generic reference handle

use std::fmt;
use std::os::raw::c_int;

use mlua_sys::{
    lua_State, lua_pushnil, lua_rawequal, lua_rawgeti, lua_type, luaL_ref, luaL_unref,
    LUA_REGISTRYINDEX, LUA_REFNIL, LUA_TBOOLEAN, LUA_TFUNCTION, LUA_TLIGHTUSERDATA, LUA_TNIL,
    LUA_TNUMBER, LUA_TSTRING, LUA_TTABLE, LUA_TTHREAD, LUA_TUSERDATA,
};

use crate::convert::FromLua;
use crate::error::{LuaError, LuaResult};
use crate::refs::{LuaFunction, LuaTable, LuaThread};
use crate::state::LuaState;

/// Basic Lua value types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaType {
    Nil,
    Boolean,
    LightUserData,
    Number,
    String,
    Table,
    Function,
    UserData,
    Thread,
}

impl LuaType {
    pub(crate) fn from_code(code: c_int) -> Self {
        match code {
            LUA_TNIL => LuaType::Nil,
            LUA_TBOOLEAN => LuaType::Boolean,
            LUA_TLIGHTUSERDATA => LuaType::LightUserData,
            LUA_TNUMBER => LuaType::Number,
            LUA_TSTRING => LuaType::String,
            LUA_TTABLE => LuaType::Table,
            LUA_TFUNCTION => LuaType::Function,
            LUA_TUSERDATA => LuaType::UserData,
            LUA_TTHREAD => LuaType::Thread,
            _ => LuaType::Nil,
        }
    }

    /// Name as reported by Lua's `type()`
    pub fn name(self) -> &'static str {
        match self {
            LuaType::Nil => "nil",
            LuaType::Boolean => "boolean",
            LuaType::LightUserData | LuaType::UserData => "userdata",
            LuaType::Number => "number",
            LuaType::String => "string",
            LuaType::Table => "table",
            LuaType::Function => "function",
            LuaType::Thread => "thread",
        }
    }
}

/// Handle to any value held by a [`LuaState`].
///
/// Two handles are equal when they denote the same value (raw equality,
/// no `__eq`), not when their contents match.
pub struct LuaRef<'lua> {
    state: &'lua LuaState,
    reference: c_int,
}

impl<'lua> LuaRef<'lua> {
    /// Capture and pop the value on top of the stack.
    ///
    /// # Safety
    /// The stack must hold at least one value.
    pub(crate) unsafe fn pop_from(state: &'lua LuaState) -> Self {
        // luaL_ref pops the value; nil yields LUA_REFNIL without a slot
        let reference = luaL_ref(state.as_ptr(), LUA_REGISTRYINDEX);
        LuaRef { state, reference }
    }

    /// Handle denoting nil
    pub(crate) fn nil(state: &'lua LuaState) -> Self {
        LuaRef {
            state,
            reference: LUA_REFNIL,
        }
    }

    /// Push the value onto `l`, which must be a thread of the owning VM with
    /// one free slot.
    pub(crate) unsafe fn push_raw(&self, l: *mut lua_State) {
        if self.reference < 0 {
            lua_pushnil(l);
        } else {
            lua_rawgeti(l, LUA_REGISTRYINDEX, self.reference as _);
        }
    }

    /// Owning state
    pub fn state(&self) -> &'lua LuaState {
        self.state
    }

    /// Registry slot backing this handle (negative for nil)
    pub fn registry_index(&self) -> c_int {
        self.reference
    }

    pub fn is_nil(&self) -> bool {
        self.lua_type() == LuaType::Nil
    }

    pub fn lua_type(&self) -> LuaType {
        if self.reference < 0 {
            return LuaType::Nil;
        }
        let _guard = self.state.stack_guard();
        if self.state.reserve(1).is_err() {
            return LuaType::Nil;
        }
        unsafe {
            self.push_raw(self.state.as_ptr());
            LuaType::from_code(lua_type(self.state.as_ptr(), -1))
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.lua_type().name()
    }

    /// Convert the referenced value.
    pub fn get<T: FromLua<'lua>>(&self) -> LuaResult<T> {
        self.state.reserve(1)?;
        let _guard = self.state.stack_guard();
        unsafe { self.push_raw(self.state.as_ptr()) };
        T::from_lua(self.state, -1)
    }

    /// Narrow to a table handle.
    pub fn into_table(self) -> LuaResult<LuaTable<'lua>> {
        self.expect_type(LuaType::Table)?;
        Ok(LuaTable::wrap(self))
    }

    /// Narrow to a function handle. Nil is accepted and yields a nil
    /// function, the result of a failed load.
    pub fn into_function(self) -> LuaResult<LuaFunction<'lua>> {
        if !self.is_nil() {
            self.expect_type(LuaType::Function)?;
        }
        Ok(LuaFunction::wrap(self))
    }

    /// Narrow to a coroutine handle.
    pub fn into_thread(self) -> LuaResult<LuaThread<'lua>> {
        self.expect_type(LuaType::Thread)?;
        Ok(LuaThread::wrap(self))
    }

    fn expect_type(&self, expected: LuaType) -> LuaResult<()> {
        let actual = self.lua_type();
        if actual == expected {
            Ok(())
        } else {
            Err(LuaError::TypeMismatch {
                expected: expected.name(),
                got: actual.name().to_string(),
            })
        }
    }
}

impl Clone for LuaRef<'_> {
    fn clone(&self) -> Self {
        if self.reference < 0 || self.state.reserve(1).is_err() {
            return LuaRef::nil(self.state);
        }
        unsafe {
            self.push_raw(self.state.as_ptr());
            LuaRef::pop_from(self.state)
        }
    }
}

impl Drop for LuaRef<'_> {
    fn drop(&mut self) {
        if self.reference >= 0 {
            unsafe { luaL_unref(self.state.as_ptr(), LUA_REGISTRYINDEX, self.reference) };
        }
    }
}

impl PartialEq for LuaRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        if !self.state.same_vm(other.state) {
            return false;
        }
        if self.reference < 0 || other.reference < 0 {
            return self.is_nil() && other.is_nil();
        }
        if self.state.reserve(2).is_err() {
            return false;
        }
        let _guard = self.state.stack_guard();
        let l = self.state.as_ptr();
        unsafe {
            self.push_raw(l);
            other.push_raw(l);
            lua_rawequal(l, -1, -2) != 0
        }
    }
}

impl fmt::Debug for LuaRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaRef")
            .field("type", &self.type_name())
            .field("ref", &self.reference)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let a = state.new_table().unwrap();
        let b = state.new_table().unwrap();
        let a2 = a.clone();
        assert_ne!(a.registry_index(), a2.registry_index());
        assert_eq!(*a, *a2);
        // Equal contents, different values
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_nil_handles() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let nil = state.new_ref(crate::Nil).unwrap();
        assert!(nil.is_nil());
        assert_eq!(nil.type_name(), "nil");
        assert_eq!(nil, state.pop_ref());
    }

    #[test]
    fn test_drop_releases_slot() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let first = state.new_ref(1i64).unwrap();
        let slot = first.registry_index();
        drop(first);
        // luaL_ref reuses freed slots
        let second = state.new_ref(2i64).unwrap();
        assert_eq!(second.registry_index(), slot);
        assert_eq!(second.get::<i64>().unwrap(), 2);
    }

    #[test]
    fn test_narrowing() {
        let state = LuaState::with_libs(Vec::new()).unwrap();
        let number = state.new_ref(3.5f64).unwrap();
        assert_eq!(number.lua_type(), LuaType::Number);
        assert!(matches!(
            number.clone().into_table(),
            Err(LuaError::TypeMismatch { expected: "table", .. })
        ));
        let table = state.new_table().unwrap();
        assert!(table.as_ref().clone().into_table().is_ok());
    }
}
